// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Experiment Service
//!
//! Entry point the CLI drives: experiment lifecycle (create, list, clean),
//! usage reporting, and assembly of a run. Assembly wires one mailbox and one
//! pair of ledgers per experiment, then per agent a dedicated provider, an
//! optional computer and a tool router, before handing the runners to the
//! [`RunController`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Experiment management and run assembly

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::advisory::AdvisoryMailbox;
use crate::application::computer::AgentComputer;
use crate::application::publication_ledger::PublicationLedger;
use crate::application::repository_factory::Repositories;
use crate::application::run_controller::{
    teardown, CostCheckPolicy, RunController, RunError, RunOutcome,
};
use crate::application::runner::{Runner, TickError, TickSummary};
use crate::application::solution_ledger::SolutionLedger;
use crate::application::tools::computer::ComputerServer;
use crate::application::tools::goal_solution::GoalSolutionServer;
use crate::application::tools::publications::PublicationsServer;
use crate::application::tools::{ToolRouter, ToolServer};
use crate::domain::content::ContentError;
use crate::domain::error::{ErrorKind, LedgerError};
use crate::domain::experiment::{AgentIndex, Experiment, Profile};
use crate::domain::llm::{LLMError, LLMProviderFactory, TokenUsage};
use crate::domain::publication::{ListOrder, Publication};
use crate::domain::repository::RepositoryError;
use crate::domain::sandbox::{Sandbox, SandboxError, SandboxId, SANDBOX_HOME};
use crate::domain::solution::ResolvedSolution;

const SUMMARY_PUBLICATIONS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("Experiment '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to create provider: {0}")]
    Model(#[from] LLMError),

    #[error("Failed to load agent history: {0}")]
    Load(#[from] TickError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl ExperimentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExperimentError::NotFound(_) => ErrorKind::NotFound,
            ExperimentError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            ExperimentError::Validation(_) => ErrorKind::Validation,
            ExperimentError::Repository(_) | ExperimentError::Content(_) => ErrorKind::ResourceUpdate,
            ExperimentError::Ledger(e) => e.kind(),
            ExperimentError::Model(_) => ErrorKind::ModelError,
            ExperimentError::Load(e) => e.kind(),
            ExperimentError::Sandbox(_) => ErrorKind::ResourceCreation,
            ExperimentError::Run(_) => ErrorKind::FatalSchedulerError,
        }
    }
}

/// Knobs of a single `run` or `tick` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub thinking: bool,
    pub computer: bool,
    /// Reviewer count override; derived from the agent count when unset
    pub reviewers: Option<usize>,
    pub command_timeout: Duration,
    /// Seed for reviewer sampling and reference tokens
    pub seed: Option<u64>,
    /// Local files or directories copied into every agent's home directory
    pub paths: Vec<PathBuf>,
    pub cost_policy: CostCheckPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            thinking: true,
            computer: true,
            reviewers: None,
            command_timeout: Duration::from_secs(600),
            seed: None,
            paths: Vec::new(),
            cost_policy: CostCheckPolicy::default(),
        }
    }
}

/// Runners sharing one mailbox and one pair of ledgers
pub struct PreparedRun {
    pub mailbox: Arc<AdvisoryMailbox>,
    pub runners: Vec<Runner>,
}

/// Snapshot of an experiment for `experiment show`
#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    pub experiment: Experiment,
    pub usage: TokenUsage,
    pub cost: f64,
    /// Most cited publications with their citation counts
    pub top_publications: Vec<(Publication, u64)>,
    pub solutions: Vec<ResolvedSolution>,
}

pub struct ExperimentService {
    repos: Repositories,
    providers: Arc<dyn LLMProviderFactory>,
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl ExperimentService {
    pub fn new(
        repos: Repositories,
        providers: Arc<dyn LLMProviderFactory>,
        sandbox: Option<Arc<dyn Sandbox>>,
    ) -> Self {
        Self {
            repos,
            providers,
            sandbox,
        }
    }

    pub async fn create(
        &self,
        name: &str,
        problem: &str,
        model: &str,
        agent_count: u32,
        profile: Profile,
    ) -> Result<Experiment, ExperimentError> {
        validate_name(name)?;
        if agent_count == 0 {
            return Err(ExperimentError::Validation(
                "An experiment needs at least one agent".to_string(),
            ));
        }
        if !self.providers.has_model(model) {
            return Err(ExperimentError::InvalidParameters(format!(
                "Unknown model '{}'",
                model
            )));
        }
        if self.repos.experiments.find_by_name(name).await?.is_some() {
            return Err(ExperimentError::Validation(format!(
                "Experiment '{}' already exists",
                name
            )));
        }

        let experiment = Experiment::new(name, problem, model, agent_count, profile);
        match self.repos.experiments.create(&experiment).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                return Err(ExperimentError::Validation(format!(
                    "Experiment '{}' already exists",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            experiment = %experiment.name,
            model = %experiment.model,
            agents = agent_count,
            profile = %profile,
            "Experiment created"
        );
        Ok(experiment)
    }

    pub async fn list(&self) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.repos.experiments.list_all().await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Experiment, ExperimentError> {
        self.repos
            .experiments
            .find_by_name(name)
            .await?
            .ok_or_else(|| ExperimentError::NotFound(name.to_string()))
    }

    /// Remove an experiment and everything it produced, including sandboxes
    pub async fn clean(&self, name: &str) -> Result<Experiment, ExperimentError> {
        let experiment = self.find_by_name(name).await?;
        let id = experiment.id;

        self.repos.messages.delete_by_experiment(id).await?;
        self.repos.solutions.delete_by_experiment(id).await?;
        self.repos.reviews.delete_by_experiment(id).await?;
        self.repos.publications.delete_by_experiment(id).await?;
        self.repos.content.delete_experiment(id).await?;

        if let Some(sandbox) = &self.sandbox {
            for agent in experiment.agent_indices() {
                let handle = SandboxId::new(experiment.sandbox_name(agent));
                if let Err(e) = sandbox.terminate(&handle).await {
                    warn!(sandbox = handle.as_str(), error = %e, "Failed to remove agent sandbox");
                }
            }
        }

        self.repos.experiments.delete(id).await?;
        info!(experiment = %experiment.name, "Experiment cleaned");
        Ok(experiment)
    }

    pub async fn usage(
        &self,
        experiment: &Experiment,
        agent: Option<AgentIndex>,
    ) -> Result<TokenUsage, ExperimentError> {
        Ok(self.repos.messages.token_usage(experiment.id, agent).await?)
    }

    pub async fn cost(&self, experiment: &Experiment) -> Result<f64, ExperimentError> {
        Ok(self.repos.messages.total_cost(experiment.id).await?)
    }

    pub async fn summary(&self, experiment: &Experiment) -> Result<ExperimentSummary, ExperimentError> {
        let ledger = self.publication_ledger(experiment, Arc::new(AdvisoryMailbox::new()), &RunOptions::default());
        let mut top_publications = Vec::new();
        for publication in ledger
            .list_published(experiment.id, ListOrder::Citations, SUMMARY_PUBLICATIONS, 0)
            .await?
        {
            let citations = ledger.citation_count(publication.id).await?;
            top_publications.push((publication, citations));
        }

        let solutions = SolutionLedger::new(self.repos.solutions.clone(), self.repos.publications.clone())
            .list_by_experiment(experiment.id)
            .await?;

        Ok(ExperimentSummary {
            experiment: experiment.clone(),
            usage: self.usage(experiment, None).await?,
            cost: self.cost(experiment).await?,
            top_publications,
            solutions,
        })
    }

    fn publication_ledger(
        &self,
        experiment: &Experiment,
        mailbox: Arc<AdvisoryMailbox>,
        options: &RunOptions,
    ) -> PublicationLedger {
        let reviewers = options
            .reviewers
            .unwrap_or_else(|| experiment.default_reviewer_count());
        let ledger = PublicationLedger::new(
            self.repos.publications.clone(),
            self.repos.reviews.clone(),
            self.repos.content.clone(),
            mailbox,
            reviewers,
        );
        match options.seed {
            Some(seed) => ledger.with_seed(seed),
            None => ledger,
        }
    }

    /// Build runners for `agents`, reloading each agent's history
    pub async fn prepare_run(
        &self,
        experiment: &Experiment,
        options: &RunOptions,
        agents: &[AgentIndex],
    ) -> Result<PreparedRun, ExperimentError> {
        let sandbox = match (options.computer, &self.sandbox) {
            (false, _) => None,
            (true, Some(sandbox)) => Some(sandbox.clone()),
            (true, None) => {
                return Err(ExperimentError::InvalidParameters(
                    "The computer tool needs a sandbox backend".to_string(),
                ));
            }
        };
        for path in &options.paths {
            if !path.exists() {
                return Err(ExperimentError::InvalidParameters(format!(
                    "Path does not exist: {}",
                    path.display()
                )));
            }
        }
        if !options.paths.is_empty() && sandbox.is_none() {
            return Err(ExperimentError::InvalidParameters(
                "Copying paths requires the computer tool".to_string(),
            ));
        }

        let mailbox = Arc::new(AdvisoryMailbox::for_agents(&experiment.agent_indices()));
        let publications = Arc::new(self.publication_ledger(experiment, mailbox.clone(), options));
        let solutions = Arc::new(SolutionLedger::new(
            self.repos.solutions.clone(),
            self.repos.publications.clone(),
        ));

        // Sandboxes started so far are stopped if any agent fails to load
        let mut computers: Vec<Arc<AgentComputer>> = Vec::new();
        let built = async {
            let mut runners = Vec::with_capacity(agents.len());
            for &agent in agents {
                if !experiment.has_agent(agent) {
                    return Err(ExperimentError::InvalidParameters(format!(
                        "Agent {} is out of range (experiment has {} agents)",
                        agent, experiment.agent_count
                    )));
                }

                let computer = sandbox.as_ref().map(|sandbox| {
                    Arc::new(AgentComputer::new(
                        sandbox.clone(),
                        experiment.sandbox_name(agent),
                        experiment.profile,
                        options.command_timeout,
                    ))
                });
                if let Some(computer) = &computer {
                    computers.push(computer.clone());
                    for path in &options.paths {
                        computer.copy_in(path, SANDBOX_HOME).await?;
                        debug!(agent = agent.0, path = %path.display(), "Copied path into sandbox");
                    }
                }

                let mut servers: Vec<Box<dyn ToolServer>> = vec![
                    Box::new(PublicationsServer::new(
                        experiment.clone(),
                        agent,
                        publications.clone(),
                        computer.clone(),
                    )),
                    Box::new(GoalSolutionServer::new(
                        experiment.id,
                        agent,
                        publications.clone(),
                        solutions.clone(),
                    )),
                ];
                if let Some(computer) = &computer {
                    servers.push(Box::new(ComputerServer::new(computer.clone())));
                }

                let provider = self.providers.create(&experiment.model, options.thinking)?;
                let runner = Runner::load(
                    experiment.clone(),
                    agent,
                    provider,
                    ToolRouter::new(servers),
                    self.repos.messages.clone(),
                    mailbox.clone(),
                    computer,
                )
                .await?;
                runners.push(runner);
            }
            Ok::<_, ExperimentError>(runners)
        }
        .await;

        match built {
            Ok(runners) => Ok(PreparedRun { mailbox, runners }),
            Err(e) => {
                teardown(&computers).await;
                Err(e)
            }
        }
    }

    /// Run every agent until interrupted, the cost ceiling is reached or a
    /// tick fails
    pub async fn run(
        &self,
        experiment: &Experiment,
        options: &RunOptions,
        max_cost: Option<f64>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, ExperimentError> {
        let prepared = self
            .prepare_run(experiment, options, &experiment.agent_indices())
            .await?;
        let controller = RunController::new(self.repos.messages.clone(), options.cost_policy);
        Ok(controller
            .run_all(experiment, &prepared.mailbox, prepared.runners, max_cost, cancel)
            .await?)
    }

    /// Run exactly one tick of `agent`
    pub async fn tick(
        &self,
        experiment: &Experiment,
        agent: AgentIndex,
        options: &RunOptions,
    ) -> Result<TickSummary, ExperimentError> {
        let mut prepared = self.prepare_run(experiment, options, &[agent]).await?;
        let runner = prepared.runners.pop().ok_or_else(|| {
            ExperimentError::InvalidParameters(format!("No runner for agent {}", agent))
        })?;
        let controller = RunController::new(self.repos.messages.clone(), options.cost_policy);
        Ok(controller.tick_once(experiment, &prepared.mailbox, runner).await?)
    }
}

/// Names double as sandbox name prefixes, so they follow container naming rules
fn validate_name(name: &str) -> Result<(), ExperimentError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ExperimentError::Validation(format!(
            "Invalid experiment name '{}': use letters, digits, '_', '.' or '-'",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::AgentMessage;
    use crate::domain::llm::{LLMProvider, Message};
    use crate::domain::publication::{Reference, Review};
    use crate::domain::sandbox::{ExecOutput, ExecRequest};
    use crate::infrastructure::content_store::FsContentStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;

    struct KnownModels;

    impl LLMProviderFactory for KnownModels {
        fn has_model(&self, alias: &str) -> bool {
            alias == "default"
        }

        fn create(&self, alias: &str, _thinking: bool) -> Result<Arc<dyn LLMProvider>, LLMError> {
            Err(LLMError::ModelNotFound(alias.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSandbox {
        terminated: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sandbox for RecordingSandbox {
        async fn build_image(&self, profile: Profile) -> Result<String, SandboxError> {
            Ok(profile.image_name())
        }

        async fn create(&self, id: &str, _image: &str) -> Result<SandboxId, SandboxError> {
            Ok(SandboxId::new(id))
        }

        async fn execute(&self, _: &SandboxId, _: ExecRequest) -> Result<ExecOutput, SandboxError> {
            Ok(ExecOutput::default())
        }

        async fn copy_in(&self, _: &SandboxId, _: &Path, _: &str) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn copy_out(&self, _: &SandboxId, _: &str, _: &Path) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn stop(&self, _: &SandboxId) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn terminate(&self, handle: &SandboxId) -> Result<(), SandboxError> {
            self.terminated.lock().push(handle.as_str().to_string());
            Ok(())
        }
    }

    fn service(root: &Path, sandbox: Option<Arc<dyn Sandbox>>) -> ExperimentService {
        let repos = Repositories::in_memory(Arc::new(FsContentStore::new(root)));
        ExperimentService::new(repos, Arc::new(KnownModels), sandbox)
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), None);

        service
            .create("lemma", "prove it", "default", 3, Profile::Research)
            .await
            .unwrap();

        let taken = service.create("lemma", "again", "default", 3, Profile::Research).await;
        assert_eq!(taken.unwrap_err().kind(), ErrorKind::Validation);

        let empty = service.create("empty", "p", "default", 0, Profile::Research).await;
        assert_eq!(empty.unwrap_err().kind(), ErrorKind::Validation);

        let unknown = service.create("other", "p", "gpt-unknown", 2, Profile::Research).await;
        assert_eq!(unknown.unwrap_err().kind(), ErrorKind::InvalidParameters);

        let bad_name = service.create("has space", "p", "default", 2, Profile::Research).await;
        assert_eq!(bad_name.unwrap_err().kind(), ErrorKind::Validation);

        assert_eq!(service.list().await.unwrap().len(), 1);
        assert_eq!(
            service.find_by_name("missing").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_clean_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(RecordingSandbox::default());
        let service = service(dir.path(), Some(sandbox.clone()));
        let experiment = service
            .create("cascade", "p", "default", 2, Profile::Security)
            .await
            .unwrap();

        let reference = Reference::parse("abc123").unwrap();
        let publication = Publication::new(experiment.id, AgentIndex(0), "t", reference.clone(), vec![]);
        service.repos.publications.insert(&publication).await.unwrap();
        service
            .repos
            .reviews
            .create_requests(publication.id, &[Review::request(&publication, AgentIndex(1))])
            .await
            .unwrap();
        service
            .repos
            .content
            .write(experiment.id, &reference, "body")
            .await
            .unwrap();
        service
            .repos
            .messages
            .append(
                &AgentMessage::new(experiment.id, AgentIndex(0), 0, Message::user_text("go"))
                    .with_usage(TokenUsage { total: 10, input: 10, ..Default::default() }, 0.5),
            )
            .await
            .unwrap();
        assert!((service.cost(&experiment).await.unwrap() - 0.5).abs() < 1e-9);

        service.clean("cascade").await.unwrap();

        assert!(service.find_by_name("cascade").await.is_err());
        assert!(service.repos.publications.find_by_id(publication.id).await.unwrap().is_none());
        assert!(service.repos.reviews.find_by_publication(publication.id).await.unwrap().is_empty());
        assert!(service.repos.content.read(experiment.id, &reference).await.is_err());
        assert_eq!(service.repos.messages.total_cost(experiment.id).await.unwrap(), 0.0);
        assert_eq!(
            *sandbox.terminated.lock(),
            vec!["cascade-agent-0".to_string(), "cascade-agent-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_prepare_run_rejects_bad_options() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), None);
        let experiment = service
            .create("opts", "p", "default", 2, Profile::Research)
            .await
            .unwrap();

        let no_sandbox = service
            .prepare_run(&experiment, &RunOptions::default(), &[AgentIndex(0)])
            .await;
        assert_eq!(no_sandbox.err().map(|e| e.kind()), Some(ErrorKind::InvalidParameters));

        let options = RunOptions {
            computer: false,
            ..RunOptions::default()
        };
        let out_of_range = service.prepare_run(&experiment, &options, &[AgentIndex(5)]).await;
        assert_eq!(out_of_range.err().map(|e| e.kind()), Some(ErrorKind::InvalidParameters));

        let no_provider = service.prepare_run(&experiment, &options, &[AgentIndex(0)]).await;
        assert_eq!(no_provider.err().map(|e| e.kind()), Some(ErrorKind::ModelError));
    }
}
