// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Solution Ledger
//!
//! One vote per (experiment, agent) naming the publication the agent currently
//! endorses as the best answer. Voting again replaces the target. The ledger
//! does not check the target is published; the goal_solution tool does.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Solution votes and their resolved projections

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::error::LedgerError;
use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::publication::{PublicationId, Publication};
use crate::domain::repository::{PublicationRepository, SolutionRepository};
use crate::domain::solution::{ResolvedSolution, Solution};

pub struct SolutionLedger {
    solutions: Arc<dyn SolutionRepository>,
    publications: Arc<dyn PublicationRepository>,
}

impl SolutionLedger {
    pub fn new(
        solutions: Arc<dyn SolutionRepository>,
        publications: Arc<dyn PublicationRepository>,
    ) -> Self {
        Self {
            solutions,
            publications,
        }
    }

    pub async fn vote(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
        publication: PublicationId,
    ) -> Result<(), LedgerError> {
        let solution = Solution::new(experiment, agent, publication);
        self.solutions
            .upsert(&solution)
            .await
            .map_err(|e| LedgerError::creation("Failed to record solution", e))?;
        info!(agent = agent.0, publication = %publication.0, "Solution reported");
        Ok(())
    }

    /// Every current vote of the experiment, most recently updated first
    pub async fn list_by_experiment(&self, experiment: ExperimentId) -> Result<Vec<ResolvedSolution>, LedgerError> {
        let solutions = self
            .solutions
            .list_by_experiment(experiment)
            .await
            .map_err(|e| LedgerError::update("Failed to list solutions", e))?;
        self.resolve(solutions).await
    }

    /// The vote of `agent`, as a list of zero or one entries
    pub async fn list_by_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Vec<ResolvedSolution>, LedgerError> {
        Ok(self
            .find_latest_by_agent(experiment, agent)
            .await?
            .into_iter()
            .collect())
    }

    pub async fn find_latest_by_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Option<ResolvedSolution>, LedgerError> {
        let solution = self
            .solutions
            .find_by_agent(experiment, agent)
            .await
            .map_err(|e| LedgerError::update("Failed to load solution", e))?;
        Ok(self.resolve(solution.into_iter().collect()).await?.pop())
    }

    async fn resolve(&self, solutions: Vec<Solution>) -> Result<Vec<ResolvedSolution>, LedgerError> {
        let ids: Vec<PublicationId> = solutions.iter().map(|s| s.publication_id).collect();
        let publications: HashMap<PublicationId, Publication> = self
            .publications
            .find_by_ids(&ids)
            .await
            .map_err(|e| LedgerError::update("Failed to load publications", e))?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(solutions
            .into_iter()
            .filter_map(|solution| {
                publications
                    .get(&solution.publication_id)
                    .cloned()
                    .map(|publication| ResolvedSolution {
                        solution,
                        publication,
                    })
            })
            .collect())
    }
}
