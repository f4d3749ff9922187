// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Solution votes
//!
//! An agent's current endorsement of one publication as the best answer to the
//! experiment's problem. Unique per (experiment, agent); voting again replaces
//! the target.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Solution vote record and its resolved view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::publication::{Publication, PublicationId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub experiment_id: ExperimentId,
    pub agent: AgentIndex,
    pub publication_id: PublicationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Solution {
    pub fn new(experiment_id: ExperimentId, agent: AgentIndex, publication_id: PublicationId) -> Self {
        let now = Utc::now();
        Self {
            experiment_id,
            agent,
            publication_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A vote joined with the publication it endorses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedSolution {
    pub solution: Solution,
    pub publication: Publication,
}
