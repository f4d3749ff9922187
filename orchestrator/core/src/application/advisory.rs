// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Advisory Mailbox
//!
//! Per-agent FIFO queues of [`AdvisoryMessage`]s. Delivery is best effort and
//! at most once: `push` silently drops messages for unknown agents or before
//! `init`, and `drain` hands the queue over and leaves it empty.
//!
//! One mailbox is constructed per run by the run controller and shared by
//! handle with the ledgers (producers) and tick schedulers (consumers).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** In-memory notification queues between agents

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::advisory::AdvisoryMessage;
use crate::domain::experiment::AgentIndex;

#[derive(Default)]
pub struct AdvisoryMailbox {
    queues: Mutex<Option<HashMap<AgentIndex, Vec<AdvisoryMessage>>>>,
}

impl AdvisoryMailbox {
    /// An uninitialised mailbox; every push is dropped until `init`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailbox already initialised for `agents`.
    pub fn for_agents(agents: &[AgentIndex]) -> Self {
        let mailbox = Self::new();
        mailbox.init(agents);
        mailbox
    }

    /// Reset every queue to empty for exactly `agents`.
    pub fn init(&self, agents: &[AgentIndex]) {
        let queues = agents.iter().map(|a| (*a, Vec::new())).collect();
        *self.queues.lock() = Some(queues);
    }

    pub fn is_initialized(&self) -> bool {
        self.queues.lock().is_some()
    }

    pub fn push(&self, agent: AgentIndex, message: AdvisoryMessage) {
        let mut guard = self.queues.lock();
        match guard.as_mut().and_then(|queues| queues.get_mut(&agent)) {
            Some(queue) => queue.push(message),
            None => debug!(agent = agent.0, "Dropping advisory for unknown agent"),
        }
    }

    /// Take the queued messages of `agent` in push order.
    pub fn drain(&self, agent: AgentIndex) -> Vec<AdvisoryMessage> {
        let mut guard = self.queues.lock();
        guard
            .as_mut()
            .and_then(|queues| queues.get_mut(&agent))
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn pending(&self, agent: AgentIndex) -> usize {
        self.queues
            .lock()
            .as_ref()
            .and_then(|queues| queues.get(&agent))
            .map_or(0, Vec::len)
    }
}
