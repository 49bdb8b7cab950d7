//! Error types for the persistence engine.
//!
//! This module defines all error types using `thiserror` for ergonomic error
//! handling. Each variant carries enough context for callers to decide whether
//! the failure is a caller mistake, an entity-state problem, or a driver fault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A required input was null or missing (key, instance, parameter).
    #[error("Invalid argument: {message}")]
    ArgumentInvalid { message: String },

    /// The entity or relation is in a state that forbids the operation:
    /// a required key is unset, a to-one relation has the wrong cardinality,
    /// or a required row does not exist.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The operation is structurally undefined for the entity's key strategy.
    #[error("Unsupported operation: {operation} is not defined for {entity}")]
    UnsupportedOperation { operation: String, entity: String },

    /// Rollback failed after a prior failure. Both causes are preserved.
    /// This is always fatal and must never be retried automatically: the
    /// transaction may have left partial writes behind.
    #[error("Transaction integrity at risk: rollback failed ({rollback}) after original failure ({original})")]
    TransactionIntegrityRisk {
        original: Box<EngineError>,
        rollback: Box<EngineError>,
    },

    /// A failure reported by the driver boundary.
    #[error("Driver error: {message}")]
    Driver {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    /// A row-source accessor produced a value the field mapping cannot accept.
    #[error("Type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl EngineError {
    /// Create an invalid-argument error.
    pub fn argument_invalid(message: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            message: message.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            entity: entity.into(),
        }
    }

    /// Create a composite integrity-risk error from an original failure and
    /// the rollback failure that followed it.
    pub fn integrity_risk(original: EngineError, rollback: EngineError) -> Self {
        Self::TransactionIntegrityRisk {
            original: Box::new(original),
            rollback: Box::new(rollback),
        }
    }

    /// Create a driver error with optional SQL state.
    pub fn driver(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a type-mismatch error for a column accessor.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            actual,
        }
    }

    /// Check whether this error signals possible data corruption after a
    /// failed rollback.
    pub fn is_integrity_risk(&self) -> bool {
        matches!(self, Self::TransactionIntegrityRisk { .. })
    }

    /// The original failure behind an integrity-risk error, if any.
    pub fn original_cause(&self) -> Option<&EngineError> {
        match self {
            Self::TransactionIntegrityRisk { original, .. } => Some(original),
            _ => None,
        }
    }

    /// The rollback failure behind an integrity-risk error, if any.
    pub fn rollback_cause(&self) -> Option<&EngineError> {
        match self {
            Self::TransactionIntegrityRisk { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
