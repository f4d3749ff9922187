// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Error Taxonomy
//!
//! Every failure that reaches an agent (as a tool result) or an operator (as a
//! CLI error line) is classified into one [`ErrorKind`]. Concern-specific
//! error enums (`LedgerError`, `TickError`, ...) expose `kind()` so the
//! classification stays in one place.
//!
//! | Kind | Code | Typical cause |
//! |------|------|---------------|
//! | `NotFound` | `not_found` | missing experiment, publication, review or reference |
//! | `InvalidParameters` | `invalid_parameters` | bad enum value, out-of-range index |
//! | `Validation` | `validation` | unresolved citation, reviewer pool too small, pending reviews |
//! | `ResourceCreation` | `resource_creation` | record store insert failed |
//! | `ResourceUpdate` | `resource_update` | record store update failed |
//! | `ModelError` | `model_error` | language-model provider failure |
//! | `FatalSchedulerError` | `fatal_scheduler_error` | tick could not complete |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidParameters,
    Validation,
    ResourceCreation,
    ResourceUpdate,
    ModelError,
    FatalSchedulerError,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::Validation => "validation",
            ErrorKind::ResourceCreation => "resource_creation",
            ErrorKind::ResourceUpdate => "resource_update",
            ErrorKind::ModelError => "model_error",
            ErrorKind::FatalSchedulerError => "fatal_scheduler_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by the publication and solution ledgers.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ResourceCreation(String),

    #[error("{0}")]
    ResourceUpdate(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::ResourceCreation(_) => ErrorKind::ResourceCreation,
            LedgerError::ResourceUpdate(_) => ErrorKind::ResourceUpdate,
        }
    }

    /// Wraps a record store failure raised while writing new rows.
    pub fn creation(context: &str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => LedgerError::NotFound(msg),
            other => LedgerError::ResourceCreation(format!("{}: {}", context, other)),
        }
    }

    /// Wraps a record store failure raised while reading or updating rows.
    pub fn update(context: &str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => LedgerError::NotFound(msg),
            other => LedgerError::ResourceUpdate(format!("{}: {}", context, other)),
        }
    }
}
