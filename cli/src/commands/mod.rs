// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Agora CLI

pub mod config;
pub mod experiment;
pub mod models;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::experiment::ExperimentCommand;
pub use self::run::RunArgs;
