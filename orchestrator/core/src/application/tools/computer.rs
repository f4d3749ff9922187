// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Computer tool server: shell commands and file access in the agent's sandbox.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::publications::tool;
use super::{parse_args, ToolError, ToolServer};
use crate::application::computer::AgentComputer;
use crate::domain::llm::ToolDefinition;
use crate::domain::sandbox::ExecOutput;

pub const SERVER_NAME: &str = "computer";

/// Output beyond this many characters per stream is cut
const MAX_STREAM_CHARS: usize = 16_384;

pub struct ComputerServer {
    computer: Arc<AgentComputer>,
}

#[derive(Deserialize)]
struct ExecuteArgs {
    cmd: String,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct FileReadArgs {
    path: String,
}

#[derive(Deserialize)]
struct FileWriteArgs {
    path: String,
    content: String,
}

impl ComputerServer {
    pub fn new(computer: Arc<AgentComputer>) -> Self {
        Self { computer }
    }
}

#[async_trait]
impl ToolServer for ComputerServer {
    fn name(&self) -> &'static str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            tool(
                "execute",
                "Execute a bash command in your computer. The working directory is /home/agent.",
                json!({
                    "type": "object",
                    "properties": {
                        "cmd": {"type": "string", "description": "The command to run."},
                        "timeout_ms": {"type": "number", "description": "Optional timeout in milliseconds."}
                    },
                    "required": ["cmd"]
                }),
            ),
            tool(
                "file_read",
                "Read a file from your computer.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Absolute path or path relative to /home/agent."}
                    },
                    "required": ["path"]
                }),
            ),
            tool(
                "file_write",
                "Write a file to your computer, replacing any existing content.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Absolute path or path relative to /home/agent."},
                        "content": {"type": "string", "description": "Content to write."}
                    },
                    "required": ["path", "content"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, input: &Value) -> Result<String, ToolError> {
        match tool {
            "execute" => {
                let args: ExecuteArgs = parse_args(input)?;
                let output = self
                    .computer
                    .execute(&args.cmd, args.timeout_ms.map(Duration::from_millis))
                    .await?;
                Ok(render_output(&output))
            }
            "file_read" => {
                let args: FileReadArgs = parse_args(input)?;
                Ok(self.computer.read_file(&args.path).await?)
            }
            "file_write" => {
                let args: FileWriteArgs = parse_args(input)?;
                self.computer.write_file(&args.path, &args.content).await?;
                Ok(format!("File written: {}", args.path))
            }
            other => Err(ToolError::invalid_parameters(format!("Unknown tool: {}", other))),
        }
    }
}

fn render_output(output: &ExecOutput) -> String {
    format!(
        "exit_code: {}\nstdout:\n{}\nstderr:\n{}",
        output.exit_code,
        truncate(&output.stdout),
        truncate(&output.stderr)
    )
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_STREAM_CHARS {
        return s.to_string();
    }
    let kept: String = s.chars().take(MAX_STREAM_CHARS).collect();
    format!("{}\n[... output truncated]", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_output() {
        let output = ExecOutput {
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert_eq!(render_output(&output), "exit_code: 0\nstdout:\nhello\n\nstderr:\n");
    }

    #[test]
    fn test_truncate_long_streams() {
        let long = "x".repeat(MAX_STREAM_CHARS + 10);
        let cut = truncate(&long);
        assert!(cut.ends_with("[... output truncated]"));
        assert_eq!(truncate("short"), "short");
    }
}
