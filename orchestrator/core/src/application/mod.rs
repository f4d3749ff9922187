// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod advisory;
pub mod computer;
pub mod experiment_service;
pub mod prompt;
pub mod publication_ledger;
pub mod repository_factory;
pub mod reviewer_assignment;
pub mod run_controller;
pub mod runner;
pub mod solution_ledger;
pub mod tools;

// Re-export use cases for convenience
pub use experiment_service::{ExperimentError, ExperimentService, ExperimentSummary, RunOptions};
pub use repository_factory::Repositories;
pub use run_controller::{CostCheckPolicy, RunController, RunError, RunOutcome};
