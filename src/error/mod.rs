//! Centralized error handling for the loan ledger
//!
//! This module provides the typed error taxonomy raised by the ledger core.
//! Calling layers (routes, agent) are responsible for translating these into
//! user-facing messages; the ledger never downgrades a failed state transition
//! to a silent no-op apart from the documented idempotency case.

use thiserror::Error;

/// Ledger error type
///
/// `NotFound` is surfaced identically whether the record is missing or owned
/// by another organization, so cross-tenant existence never leaks.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: cannot {operation} a loan in state '{current}'")]
    InvalidStateTransition {
        operation: &'static str,
        current: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Stable machine-readable code for the error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Database(_) => "DATABASE_ERROR",
        }
    }

    pub(crate) fn not_found(entity: &str) -> Self {
        LedgerError::NotFound(format!("{} not found", entity))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => LedgerError::NotFound("Resource not found".to_string()),
            _ => LedgerError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(err: validator::ValidationErrors) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

/// Result type alias using LedgerError
pub type LedgerResult<T> = Result<T, LedgerError>;
