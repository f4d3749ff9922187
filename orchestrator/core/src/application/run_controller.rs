// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Run Controller
//!
//! Runs one unbounded tick loop per agent until the run is interrupted, the
//! cost ceiling is reached or any tick fails.
//!
//! ## Cancellation
//!
//! All loops share a stop token derived from the caller's token. Each loop
//! checks it before every tick; a tick already in progress runs to
//! completion. A failing loop cancels the token before it returns, so
//! siblings observe the stop before their next tick. Once every loop has
//! exited, each agent's sandbox is stopped.
//!
//! ## Cost check
//!
//! Spend is read from the message store at a throttled cadence: every
//! `interval` ticks (counted across all agents) while the last reading is
//! below `ratio * max_cost`, and before every tick after that. A reading above
//! the ceiling stops the run; this is a normal outcome, not an error.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Multi-agent run lifecycle

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::advisory::AdvisoryMailbox;
use crate::application::computer::AgentComputer;
use crate::application::runner::{Runner, TickError, TickSummary};
use crate::domain::experiment::{AgentIndex, Experiment, ExperimentId};
use crate::domain::repository::{MessageRepository, RepositoryError};

/// How a run ended without failing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    Interrupted,
    CostCeilingReached { spent: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Agent {agent} failed: {source}")]
    Tick {
        agent: AgentIndex,
        #[source]
        source: TickError,
    },

    #[error("Failed to read experiment cost: {0}")]
    CostCheck(#[from] RepositoryError),

    #[error("Agent loop panicked: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostCheckPolicy {
    pub interval: u64,
    pub ratio: f64,
}

impl Default for CostCheckPolicy {
    fn default() -> Self {
        Self {
            interval: 20,
            ratio: 0.95,
        }
    }
}

impl CostCheckPolicy {
    /// Whether the tick numbered `ticks` should re-read spend
    pub fn should_check(&self, ticks: u64, last_cost: f64, max_cost: f64) -> bool {
        if last_cost / max_cost < self.ratio {
            ticks % self.interval.max(1) == 0
        } else {
            true
        }
    }
}

/// Throttled cost ceiling shared by every loop of a run
struct CostGuard {
    messages: Arc<dyn MessageRepository>,
    experiment: ExperimentId,
    max_cost: f64,
    policy: CostCheckPolicy,
    ticks: AtomicU64,
    last_cost: Mutex<f64>,
}

impl CostGuard {
    /// Returns the spend when it exceeds the ceiling
    async fn check(&self) -> Result<Option<f64>, RepositoryError> {
        let ticks = self.ticks.load(Ordering::SeqCst);
        let last = *self.last_cost.lock();
        if !self.policy.should_check(ticks, last, self.max_cost) {
            return Ok(None);
        }

        let spent = self.messages.total_cost(self.experiment).await?;
        *self.last_cost.lock() = spent;
        metrics::gauge!("agora_experiment_cost_dollars").set(spent);
        debug!(spent, max_cost = self.max_cost, "Cost checked");
        Ok((spent > self.max_cost).then_some(spent))
    }

    fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

enum LoopExit {
    Cancelled,
    CostCeiling(f64),
}

pub struct RunController {
    messages: Arc<dyn MessageRepository>,
    policy: CostCheckPolicy,
}

impl RunController {
    pub fn new(messages: Arc<dyn MessageRepository>, policy: CostCheckPolicy) -> Self {
        Self { messages, policy }
    }

    /// Run every runner until `cancel` fires, spend exceeds `max_cost` or a
    /// tick fails. The first stop reason wins.
    pub async fn run_all(
        &self,
        experiment: &Experiment,
        mailbox: &AdvisoryMailbox,
        runners: Vec<Runner>,
        max_cost: Option<f64>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        mailbox.init(&experiment.agent_indices());

        let stop = cancel.child_token();
        let computers: Vec<Arc<AgentComputer>> =
            runners.iter().filter_map(|r| r.computer().cloned()).collect();

        let guard = match max_cost {
            Some(max_cost) => {
                let spent = match self.messages.total_cost(experiment.id).await {
                    Ok(spent) => spent,
                    Err(e) => {
                        teardown(&computers).await;
                        return Err(RunError::CostCheck(e));
                    }
                };
                Some(Arc::new(CostGuard {
                    messages: self.messages.clone(),
                    experiment: experiment.id,
                    max_cost,
                    policy: self.policy,
                    ticks: AtomicU64::new(0),
                    last_cost: Mutex::new(spent),
                }))
            }
            None => None,
        };

        info!(
            experiment = %experiment.name,
            agents = runners.len(),
            max_cost = ?max_cost,
            "Starting run"
        );

        let mut loops = JoinSet::new();
        for runner in runners {
            loops.spawn(agent_loop(runner, guard.clone(), stop.clone()));
        }

        let mut result: Option<Result<RunOutcome, RunError>> = None;
        while let Some(joined) = loops.join_next().await {
            let exit = joined.unwrap_or_else(|e| Err(RunError::Join(e.to_string())));
            let reason = match exit {
                Ok(LoopExit::Cancelled) => None,
                Ok(LoopExit::CostCeiling(spent)) => Some(Ok(RunOutcome::CostCeilingReached { spent })),
                Err(e) => Some(Err(e)),
            };
            if let Some(reason) = reason {
                stop.cancel();
                result.get_or_insert(reason);
            }
        }

        teardown(&computers).await;

        let result = result.unwrap_or(Ok(RunOutcome::Interrupted));
        match &result {
            Ok(outcome) => info!(experiment = %experiment.name, outcome = ?outcome, "Run stopped"),
            Err(e) => warn!(experiment = %experiment.name, error = %e, "Run failed"),
        }
        result
    }

    /// Run exactly one tick of one agent, then stop its sandbox
    pub async fn tick_once(
        &self,
        experiment: &Experiment,
        mailbox: &AdvisoryMailbox,
        mut runner: Runner,
    ) -> Result<TickSummary, RunError> {
        mailbox.init(&experiment.agent_indices());
        let agent = runner.agent();
        let result = runner
            .tick()
            .await
            .map_err(|source| RunError::Tick { agent, source });
        teardown(&runner.computer().cloned().into_iter().collect::<Vec<_>>()).await;
        result
    }
}

async fn agent_loop(
    mut runner: Runner,
    guard: Option<Arc<CostGuard>>,
    stop: CancellationToken,
) -> Result<LoopExit, RunError> {
    let agent = runner.agent();
    loop {
        tokio::task::yield_now().await;
        if stop.is_cancelled() {
            runner.stop();
            debug!(agent = agent.0, "Agent loop observed stop");
            return Ok(LoopExit::Cancelled);
        }

        if let Some(guard) = &guard {
            match guard.check().await {
                Ok(Some(spent)) => {
                    info!(agent = agent.0, spent, "Cost ceiling reached");
                    stop.cancel();
                    runner.stop();
                    return Ok(LoopExit::CostCeiling(spent));
                }
                Ok(None) => {}
                Err(e) => {
                    stop.cancel();
                    runner.stop();
                    return Err(RunError::CostCheck(e));
                }
            }
        }

        let tick = runner.tick().await;
        if let Some(guard) = &guard {
            guard.record_tick();
        }
        if let Err(source) = tick {
            stop.cancel();
            return Err(RunError::Tick { agent, source });
        }
    }
}

/// Stop every sandbox that was started
pub(crate) async fn teardown(computers: &[Arc<AgentComputer>]) {
    for computer in computers.iter().filter(|c| c.is_started()) {
        match computer.stop().await {
            Ok(()) => debug!(sandbox = %computer.name(), "Sandbox stopped"),
            Err(e) => warn!(sandbox = %computer.name(), "Failed to stop sandbox: {}", e),
        }
    }
}
