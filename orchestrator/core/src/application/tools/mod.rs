// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Tool Surface
//!
//! Tool servers exposed to the model and the router the tick scheduler
//! dispatches tool calls through. Tools are advertised as `<server>-<tool>`.
//!
//! A tool failure never aborts a tick: it is rendered back to the model as an
//! `Error [<code>]: <message>` tool result flagged `is_error`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Tool server contract, routing and error rendering

pub mod computer;
pub mod goal_solution;
pub mod publications;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::error::{ErrorKind, LedgerError};
use crate::domain::llm::{Content, ToolDefinition};
use crate::domain::sandbox::SandboxError;

pub use computer::ComputerServer;
pub use goal_solution::GoalSolutionServer;
pub use publications::PublicationsServer;

/// Typed error payload returned to the calling agent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Error [{}]: {}", .kind.code(), .message)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, message)
    }
}

impl From<LedgerError> for ToolError {
    fn from(err: LedgerError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        let kind = match err {
            SandboxError::NotFound(_) => ErrorKind::NotFound,
            SandboxError::ImageBuildFailed(_) | SandboxError::CreateFailed(_) => ErrorKind::ResourceCreation,
            _ => ErrorKind::ResourceUpdate,
        };
        Self::new(kind, err.to_string())
    }
}

#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Server name used as the tool name prefix
    fn name(&self) -> &'static str;

    /// Tools offered by this server, unprefixed
    fn tools(&self) -> Vec<ToolDefinition>;

    async fn call(&self, tool: &str, input: &Value) -> Result<String, ToolError>;
}

/// Decode tool arguments, reporting schema mismatches as `invalid_parameters`
pub fn parse_args<T: DeserializeOwned>(input: &Value) -> Result<T, ToolError> {
    let input = if input.is_null() { Value::Object(Default::default()) } else { input.clone() };
    serde_json::from_value(input).map_err(|e| ToolError::invalid_parameters(format!("Invalid arguments: {}", e)))
}

/// The enabled tool servers of one agent
pub struct ToolRouter {
    servers: Vec<Box<dyn ToolServer>>,
}

impl ToolRouter {
    pub fn new(servers: Vec<Box<dyn ToolServer>>) -> Self {
        Self { servers }
    }

    /// Every tool of every server with its prefixed name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.servers
            .iter()
            .flat_map(|server| {
                server.tools().into_iter().map(move |tool| ToolDefinition {
                    name: format!("{}-{}", server.name(), tool.name),
                    ..tool
                })
            })
            .collect()
    }

    /// Run one tool call and wrap its outcome as a tool result turn
    pub async fn dispatch(&self, id: &str, name: &str, input: &Value) -> Content {
        let result = match self.resolve(name) {
            Some((server, tool)) => {
                metrics::counter!("agora_tool_calls_total", "server" => server.name()).increment(1);
                server.call(tool, input).await
            }
            None => {
                warn!(tool = %name, "Model called an unknown tool");
                Err(ToolError::invalid_parameters(format!("Unknown tool: {}", name)))
            }
        };

        match result {
            Ok(text) => Content::ToolResult {
                tool_use_id: id.to_string(),
                name: name.to_string(),
                content: text,
                is_error: false,
            },
            Err(e) => Content::ToolResult {
                tool_use_id: id.to_string(),
                name: name.to_string(),
                content: e.to_string(),
                is_error: true,
            },
        }
    }

    fn resolve<'a>(&self, name: &'a str) -> Option<(&dyn ToolServer, &'a str)> {
        let (server, tool) = name.split_once('-')?;
        self.servers
            .iter()
            .find(|s| s.name() == server)
            .filter(|s| s.tools().iter().any(|t| t.name == tool))
            .map(|s| (s.as_ref(), tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoServer;

    #[async_trait]
    impl ToolServer for EchoServer {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "say".to_string(),
                description: "Echo text".to_string(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call(&self, _tool: &str, input: &Value) -> Result<String, ToolError> {
            #[derive(serde::Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = parse_args(input)?;
            Ok(args.text)
        }
    }

    fn router() -> ToolRouter {
        ToolRouter::new(vec![Box::new(EchoServer)])
    }

    #[test]
    fn test_definitions_are_prefixed() {
        let names: Vec<String> = router().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo-say"]);
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let result = router().dispatch("t1", "echo-say", &json!({"text": "hi"})).await;
        assert_eq!(
            result,
            Content::ToolResult {
                tool_use_id: "t1".to_string(),
                name: "echo-say".to_string(),
                content: "hi".to_string(),
                is_error: false,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_args_are_error_results() {
        match router().dispatch("t2", "echo-shout", &json!({})).await {
            Content::ToolResult { content, is_error, .. } => {
                assert!(is_error);
                assert_eq!(content, "Error [invalid_parameters]: Unknown tool: echo-shout");
            }
            other => panic!("unexpected content {:?}", other),
        }

        match router().dispatch("t3", "echo-say", &json!({"text": 3})).await {
            Content::ToolResult { content, is_error, .. } => {
                assert!(is_error);
                assert!(content.starts_with("Error [invalid_parameters]: Invalid arguments"));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }
}
