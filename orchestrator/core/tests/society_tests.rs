// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests of a small agent society driven tick by tick: an agent
//! publishes, a peer reviews, the author votes, and histories survive reloads.

mod common;

use serde_json::json;
use std::sync::Arc;

use agora_orchestrator_core::domain::conversation::AgentMessage;
use agora_orchestrator_core::domain::experiment::{AgentIndex, Profile};
use agora_orchestrator_core::domain::llm::{Content, Message, Role};
use agora_orchestrator_core::domain::publication::PublicationStatus;

use common::{find_reference, harness, options, tool_call, tool_results, ScriptedProvider};

#[tokio::test]
async fn test_publish_review_and_vote() {
    let h = harness();
    let experiment = h
        .service
        .create("society", "Find the answer.", "default", 2, Profile::Research)
        .await
        .unwrap();
    let opts = options(false);

    // Agent 0 submits
    let author = Arc::new(ScriptedProvider::sequence(vec![tool_call(
        "call_1",
        "publications-submit_publication",
        json!({"title": "First result", "content": "The answer is 42."}),
    )]));
    h.factory.push(author.clone());
    let summary = h.service.tick(&experiment, AgentIndex(0), &opts).await.unwrap();
    assert_eq!(summary.tool_calls, 1);
    assert!((summary.cost - 1.0).abs() < 1e-9);

    let history = h
        .repos
        .messages
        .list_for_agent(experiment.id, AgentIndex(0))
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].message.role, Role::User);
    assert!(history[1].usage.is_some());
    assert_eq!(
        tool_results(&history[2].message),
        vec![("Publication submitted.".to_string(), false)]
    );

    let published = h
        .repos
        .publications
        .list_by_author(experiment.id, AgentIndex(0))
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].status, PublicationStatus::Submitted);
    let reference = published[0].reference.as_str().to_string();

    // Agent 1 lists its review requests, then grades from what it saw
    let reviewer = Arc::new(ScriptedProvider::sequence(vec![tool_call(
        "call_2",
        "publications-list_review_requests",
        json!({}),
    )]));
    h.factory.push(reviewer.clone());
    h.service.tick(&experiment, AgentIndex(1), &opts).await.unwrap();

    let grading = Arc::new(ScriptedProvider::new(|context: &[Message]| {
        let reference = find_reference(context).unwrap_or_default();
        Ok(tool_call(
            "call_3",
            "publications-submit_review",
            json!({"publication": reference, "grade": "ACCEPT", "content": "Checks out."}),
        ))
    }));
    h.factory.push(grading.clone());
    h.service.tick(&experiment, AgentIndex(1), &opts).await.unwrap();

    let context = grading.last_context();
    assert_eq!(find_reference(&context).as_deref(), Some(reference.as_str()));
    let publication = h
        .repos
        .publications
        .find_by_id(published[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(publication.status, PublicationStatus::Published);

    // Agent 0 endorses its published work
    let voter = Arc::new(ScriptedProvider::sequence(vec![tool_call(
        "call_4",
        "goal_solution-report",
        json!({"publication": reference}),
    )]));
    h.factory.push(voter.clone());
    h.service.tick(&experiment, AgentIndex(0), &opts).await.unwrap();

    let history = h
        .repos
        .messages
        .list_for_agent(experiment.id, AgentIndex(0))
        .await
        .unwrap();
    let positions: Vec<u64> = history.iter().map(|m| m.position).collect();
    assert_eq!(positions, (0..history.len() as u64).collect::<Vec<_>>());
    assert_eq!(
        tool_results(&history.last().unwrap().message),
        vec![("Successfully reported.".to_string(), false)]
    );

    let summary = h.service.summary(&experiment).await.unwrap();
    assert_eq!(summary.solutions.len(), 1);
    assert_eq!(summary.solutions[0].publication.id, publication.id);
    assert_eq!(summary.top_publications.len(), 1);
    assert!((summary.cost - 4.0).abs() < 1e-9);
    assert_eq!(summary.usage.total, 4 * common::USAGE.total);
}

#[tokio::test]
async fn test_tool_errors_do_not_abort_tick() {
    let h = harness();
    let experiment = h
        .service
        .create("errors", "p", "default", 2, Profile::Research)
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::sequence(vec![Message {
        role: Role::Assistant,
        content: vec![
            Content::ToolUse {
                id: "a".into(),
                name: "goal_solution-report".into(),
                input: json!({"publication": "zzzzzz"}),
            },
            Content::ToolUse {
                id: "b".into(),
                name: "web-search".into(),
                input: json!({"q": "x"}),
            },
        ],
    }]));
    h.factory.push(provider);
    let summary = h
        .service
        .tick(&experiment, AgentIndex(1), &options(false))
        .await
        .unwrap();
    assert_eq!(summary.tool_calls, 2);

    let history = h
        .repos
        .messages
        .list_for_agent(experiment.id, AgentIndex(1))
        .await
        .unwrap();
    let results = tool_results(&history.last().unwrap().message);
    assert_eq!(results.len(), 2);
    assert!(results[0].0.starts_with("Error [not_found]"));
    assert!(results.iter().all(|(_, is_error)| *is_error));
}

#[tokio::test]
async fn test_reload_closes_interrupted_tool_calls() {
    let h = harness();
    let experiment = h
        .service
        .create("reload", "p", "default", 1, Profile::Research)
        .await
        .unwrap();

    // A previous process stopped between the model turn and its tool results
    for (position, message) in [
        Message::user_text("opening"),
        tool_call("lost", "publications-list_publications", json!({})),
    ]
    .into_iter()
    .enumerate()
    {
        h.repos
            .messages
            .append(&AgentMessage::new(experiment.id, AgentIndex(0), position as u64, message))
            .await
            .unwrap();
    }

    let provider = Arc::new(ScriptedProvider::sequence(vec![]));
    h.factory.push(provider.clone());
    h.service
        .tick(&experiment, AgentIndex(0), &options(false))
        .await
        .unwrap();

    let context = provider.last_context();
    assert_eq!(context.len(), 3);
    let results = tool_results(&context[2]);
    assert_eq!(results.len(), 1);
    assert!(results[0].0.contains("interrupted"));
    assert!(results[0].1);
}

#[tokio::test]
async fn test_context_is_pruned_to_window() {
    let h = harness();
    let experiment = h
        .service
        .create("window", "p", "default", 1, Profile::Research)
        .await
        .unwrap();

    let filler = "x".repeat(400);
    for position in 0..6u64 {
        let message = if position % 2 == 0 {
            Message::user_text(format!("{} {}", position, filler))
        } else {
            Message::assistant_text(format!("{} {}", position, filler))
        };
        h.repos
            .messages
            .append(&AgentMessage::new(experiment.id, AgentIndex(0), position, message))
            .await
            .unwrap();
    }

    let provider = Arc::new(ScriptedProvider::sequence(vec![]).with_max_context(250));
    h.factory.push(provider.clone());
    h.service
        .tick(&experiment, AgentIndex(0), &options(false))
        .await
        .unwrap();

    // Opening turn kept, then the newest assistant turn and the continue prompt
    let context = provider.last_context();
    assert_eq!(context.len(), 3);
    assert_eq!(context[0].role, Role::User);
    assert!(matches!(&context[0].content[0], Content::Text { text } if text.starts_with("0 ")));
    assert!(matches!(&context[1].content[0], Content::Text { text } if text.starts_with("5 ")));

    // Pruning only affects what is sent; the stored history is complete
    let history = h
        .repos
        .messages
        .list_for_agent(experiment.id, AgentIndex(0))
        .await
        .unwrap();
    assert_eq!(history.len(), 8);
}

#[tokio::test]
async fn test_computer_tool_uses_agent_sandbox() {
    let h = harness();
    let experiment = h
        .service
        .create("lab", "p", "default", 2, Profile::FormalMath)
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::sequence(vec![tool_call(
        "c1",
        "computer-execute",
        json!({"cmd": "lake --version"}),
    )]));
    h.factory.push(provider);
    h.service
        .tick(&experiment, AgentIndex(1), &options(true))
        .await
        .unwrap();

    assert_eq!(*h.sandbox.created.lock(), vec!["lab-agent-1".to_string()]);
    assert!(h
        .sandbox
        .commands
        .lock()
        .iter()
        .any(|(id, cmd)| id == "lab-agent-1" && cmd.contains("lake --version")));
    assert_eq!(*h.sandbox.stopped.lock(), vec!["lab-agent-1".to_string()]);

    let history = h
        .repos
        .messages
        .list_for_agent(experiment.id, AgentIndex(1))
        .await
        .unwrap();
    let results = tool_results(&history.last().unwrap().message);
    assert!(results[0].0.starts_with("exit_code: 0"));
}
