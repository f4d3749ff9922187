// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Research-agent society engine: agents publish, peer-review and cite each
//! other's work while voting on the best solution to a shared problem.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain, application and infrastructure layers of the engine

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
