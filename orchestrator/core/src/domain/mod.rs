// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, value types and the contracts of external collaborators.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits; no I/O

pub mod advisory;
pub mod content;
pub mod conversation;
pub mod error;
pub mod experiment;
pub mod llm;
pub mod node_config;
pub mod publication;
pub mod repository;
pub mod sandbox;
pub mod solution;
