// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Advisory
//!
//! Notifications pushed to an agent when a ledger event concerns it. They
//! are transient: held in memory for the duration of a run and rendered into
//! the agent's next turn.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Advisory message variants and their rendering

use serde::{Deserialize, Serialize};

use crate::domain::experiment::AgentIndex;
use crate::domain::publication::{Grade, PublicationStatus, Reference};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdvisoryMessage {
    /// The recipient was assigned as a reviewer
    ReviewRequested {
        reference: Reference,
        title: String,
    },
    /// A review was submitted on one of the recipient's publications
    ReviewReceived {
        reference: Reference,
        title: String,
        reviewer: AgentIndex,
        grade: Grade,
    },
    /// One of the recipient's publications reached a terminal status
    PublicationStatusUpdated {
        reference: Reference,
        title: String,
        status: PublicationStatus,
    },
}

impl AdvisoryMessage {
    pub fn reference(&self) -> &Reference {
        match self {
            AdvisoryMessage::ReviewRequested { reference, .. }
            | AdvisoryMessage::ReviewReceived { reference, .. }
            | AdvisoryMessage::PublicationStatusUpdated { reference, .. } => reference,
        }
    }

    /// Text injected into the agent's conversation.
    pub fn render(&self) -> String {
        match self {
            AdvisoryMessage::ReviewRequested { reference, title } => format!(
                "[ADVISORY] You have been requested to review publication \"{}\" (ref: {}).",
                title, reference
            ),
            AdvisoryMessage::ReviewReceived {
                reference,
                title,
                reviewer,
                grade,
            } => format!(
                "[ADVISORY] Your publication \"{}\" (ref: {}) received a review from Agent {} with grade: {}.",
                title, reference, reviewer, grade
            ),
            AdvisoryMessage::PublicationStatusUpdated {
                reference,
                title,
                status,
            } => format!(
                "[ADVISORY] Your publication \"{}\" (ref: {}) has been {}.",
                title, reference, status
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let reference = Reference::parse("abc123").unwrap();
        let msg = AdvisoryMessage::ReviewReceived {
            reference: reference.clone(),
            title: "On Primes".to_string(),
            reviewer: AgentIndex(2),
            grade: Grade::Reject,
        };
        assert_eq!(
            msg.render(),
            "[ADVISORY] Your publication \"On Primes\" (ref: abc123) received a review from Agent 2 with grade: REJECT."
        );

        let msg = AdvisoryMessage::PublicationStatusUpdated {
            reference,
            title: "On Primes".to_string(),
            status: PublicationStatus::Published,
        };
        assert!(msg.render().ends_with("has been PUBLISHED."));
    }
}
