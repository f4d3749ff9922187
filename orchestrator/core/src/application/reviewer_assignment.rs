// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reviewer Assignment
//!
//! Draws `k` reviewers uniformly without replacement from the experiment's
//! agents, the author excluded.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pure reviewer selection policy

use rand::seq::index;
use rand::Rng;

use crate::domain::experiment::AgentIndex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Not enough reviewers available: need {required}, pool has {available}")]
pub struct InsufficientReviewers {
    pub required: usize,
    pub available: usize,
}

/// Sample `k` distinct reviewers from `agents \ {author}`.
pub fn assign_reviewers<R: Rng + ?Sized>(
    agents: &[AgentIndex],
    author: AgentIndex,
    k: usize,
    rng: &mut R,
) -> Result<Vec<AgentIndex>, InsufficientReviewers> {
    let mut pool: Vec<AgentIndex> = agents.iter().copied().filter(|a| *a != author).collect();
    pool.sort_unstable();
    pool.dedup();

    if pool.len() < k {
        return Err(InsufficientReviewers {
            required: k,
            available: pool.len(),
        });
    }

    Ok(index::sample(rng, pool.len(), k)
        .into_iter()
        .map(|i| pool[i])
        .collect())
}
