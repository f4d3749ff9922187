// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Goal solution tool server: report the publication an agent believes is the
//! current best solution to the research goal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::publications::{parse_reference, tool};
use super::{parse_args, ToolError, ToolServer};
use crate::application::publication_ledger::PublicationLedger;
use crate::application::solution_ledger::SolutionLedger;
use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::llm::ToolDefinition;
use crate::domain::publication::PublicationStatus;

pub const SERVER_NAME: &str = "goal_solution";

pub struct GoalSolutionServer {
    experiment: ExperimentId,
    agent: AgentIndex,
    publications: Arc<PublicationLedger>,
    solutions: Arc<SolutionLedger>,
}

#[derive(Deserialize)]
struct ReportArgs {
    publication: String,
}

impl GoalSolutionServer {
    pub fn new(
        experiment: ExperimentId,
        agent: AgentIndex,
        publications: Arc<PublicationLedger>,
        solutions: Arc<SolutionLedger>,
    ) -> Self {
        Self {
            experiment,
            agent,
            publications,
            solutions,
        }
    }

    async fn report(&self, args: ReportArgs) -> Result<String, ToolError> {
        let reference = parse_reference(&args.publication)?;
        let publication = self.publications.find_by_reference(self.experiment, &reference).await?;
        if publication.status != PublicationStatus::Published {
            return Err(ToolError::invalid_parameters("Publication is not published"));
        }
        self.solutions.vote(self.experiment, self.agent, publication.id).await?;
        Ok("Successfully reported.".to_string())
    }
}

#[async_trait]
impl ToolServer for GoalSolutionServer {
    fn name(&self) -> &'static str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![tool(
            "report",
            "Report belief that a publication is the current best/valid solution towards the research goal.",
            json!({
                "type": "object",
                "properties": {
                    "publication": {"type": "string", "description": "The reference of the publication."}
                },
                "required": ["publication"]
            }),
        )]
    }

    async fn call(&self, tool: &str, input: &Value) -> Result<String, ToolError> {
        match tool {
            "report" => self.report(parse_args(input)?).await,
            other => Err(ToolError::invalid_parameters(format!("Unknown tool: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::advisory::AdvisoryMailbox;
    use crate::application::publication_ledger::Submission;
    use crate::domain::error::ErrorKind;
    use crate::domain::experiment::{Experiment, Profile};
    use crate::domain::publication::Grade;
    use crate::infrastructure::content_store::FsContentStore;
    use crate::infrastructure::repositories::{
        InMemoryPublicationRepository, InMemoryReviewRepository, InMemorySolutionRepository,
    };

    #[tokio::test]
    async fn test_report_requires_published() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = Experiment::new("exp", "problem", "default", 2, Profile::Research);
        let publications_repo = Arc::new(InMemoryPublicationRepository::new());
        let ledger = Arc::new(PublicationLedger::new(
            publications_repo.clone(),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(FsContentStore::new(dir.path())),
            Arc::new(AdvisoryMailbox::for_agents(&experiment.agent_indices())),
            1,
        ));
        let solutions = Arc::new(SolutionLedger::new(
            Arc::new(InMemorySolutionRepository::new()),
            publications_repo,
        ));
        let server = GoalSolutionServer::new(experiment.id, AgentIndex(0), ledger.clone(), solutions.clone());

        let err = server.call("report", &json!({"publication": "aaaaaa"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let p = ledger
            .submit(&experiment, AgentIndex(0), Submission::from_content("T", "body"))
            .await
            .unwrap();
        let err = server
            .call("report", &json!({"publication": p.reference.as_str()}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error [invalid_parameters]: Publication is not published");

        ledger
            .submit_review(experiment.id, &p.reference, AgentIndex(1), Grade::Accept, "ok")
            .await
            .unwrap();
        let out = server
            .call("report", &json!({"publication": p.reference.as_str()}))
            .await
            .unwrap();
        assert_eq!(out, "Successfully reported.");
        let vote = solutions.find_latest_by_agent(experiment.id, AgentIndex(0)).await.unwrap().unwrap();
        assert_eq!(vote.publication.id, p.id);
    }
}
