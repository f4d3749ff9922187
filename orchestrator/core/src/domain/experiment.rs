// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Experiment aggregate
//!
//! A named research run: the problem statement every agent works on, the model
//! alias backing all agents, and a fixed population of agents addressed by a
//! dense index `0..agent_count`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Experiment identity, agent indices and sandbox profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(pub Uuid);

impl ExperimentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense agent index within an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentIndex(pub u32);

impl fmt::Display for AgentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Sandbox image profile an experiment's agents run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    #[default]
    Research,
    FormalMath,
    Security,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Research => "research",
            Profile::FormalMath => "formal-math",
            Profile::Security => "security",
        }
    }

    /// Docker image tag built for this profile.
    pub fn image_name(&self) -> String {
        format!("agent-computer:{}", self.as_str())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(Profile::Research),
            "formal-math" => Ok(Profile::FormalMath),
            "security" => Ok(Profile::Security),
            other => Err(format!(
                "Unknown profile '{}'. Supported: research, formal-math, security",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    pub problem: String,
    /// Model alias resolved through the provider registry
    pub model: String,
    pub agent_count: u32,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(
        name: impl Into<String>,
        problem: impl Into<String>,
        model: impl Into<String>,
        agent_count: u32,
        profile: Profile,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExperimentId::new(),
            name: name.into(),
            problem: problem.into(),
            model: model.into(),
            agent_count,
            profile,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn agent_indices(&self) -> Vec<AgentIndex> {
        (0..self.agent_count).map(AgentIndex).collect()
    }

    pub fn has_agent(&self, agent: AgentIndex) -> bool {
        agent.0 < self.agent_count
    }

    /// Reviewers requested per publication: four once the population allows
    /// it, otherwise everyone but the author.
    pub fn default_reviewer_count(&self) -> usize {
        if self.agent_count >= 5 {
            4
        } else {
            self.agent_count.saturating_sub(1) as usize
        }
    }

    /// Stable sandbox identifier for one agent of this experiment.
    pub fn sandbox_name(&self, agent: AgentIndex) -> String {
        format!("{}-agent-{}", self.name, agent.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_indices_are_dense() {
        let experiment = Experiment::new("e", "p", "default", 3, Profile::Research);
        assert_eq!(
            experiment.agent_indices(),
            vec![AgentIndex(0), AgentIndex(1), AgentIndex(2)]
        );
        assert!(experiment.has_agent(AgentIndex(2)));
        assert!(!experiment.has_agent(AgentIndex(3)));
    }

    #[test]
    fn test_default_reviewer_count() {
        let small = Experiment::new("a", "p", "m", 3, Profile::Research);
        assert_eq!(small.default_reviewer_count(), 2);

        let large = Experiment::new("b", "p", "m", 8, Profile::Research);
        assert_eq!(large.default_reviewer_count(), 4);

        let solo = Experiment::new("c", "p", "m", 1, Profile::Research);
        assert_eq!(solo.default_reviewer_count(), 0);
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("formal-math".parse::<Profile>(), Ok(Profile::FormalMath));
        assert!("gpu".parse::<Profile>().is_err());
        assert_eq!(Profile::Security.image_name(), "agent-computer:security");
    }
}
