// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod content_store;
pub mod db;
pub mod llm;
pub mod repositories;
pub mod sandbox;

pub use content_store::FsContentStore;
pub use sandbox::DockerSandbox;
