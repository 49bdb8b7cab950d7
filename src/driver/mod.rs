//! The driver boundary.
//!
//! The engine never talks to a database directly. It hands statement text and
//! an ordered parameter list to a [`Driver`], which executes them however its
//! backend requires: natively bound parameters, rewritten placeholders, or
//! text substitution for parameters flagged `inline_text`.
//!
//! Concrete drivers live outside this crate. The contract here is the whole
//! of what the engine assumes about them.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::config::DriverOptions;
use crate::error::{EngineError, EngineResult};
use crate::models::{Parameter, Value};

/// Opaque token identifying one driver-level transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionToken(Uuid);

impl TransactionToken {
    /// Generate a fresh token. Drivers call this from `begin`.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TransactionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx_{}", self.0.simple())
    }
}

/// A forward-only row source.
///
/// `advance` must be called before the first row is readable. Accessors read
/// the current row by column name. `close` releases underlying resources and
/// must be invoked on every exit path; callers use [`close_quietly`] so a
/// close failure never masks a primary error.
#[async_trait]
pub trait RowSource: Send {
    /// Move to the next row. Returns false when no rows remain.
    async fn advance(&mut self) -> EngineResult<bool>;

    /// Read the named column of the current row.
    fn get(&self, column: &str) -> EngineResult<Value>;

    /// Release underlying resources. Idempotent.
    async fn close(&mut self) -> EngineResult<()>;

    /// Read the named column as an i64.
    fn get_i64(&self, column: &str) -> EngineResult<i64> {
        let value = self.get(column)?;
        value
            .as_i64()
            .ok_or_else(|| EngineError::type_mismatch(column, "int", value.type_name()))
    }

    /// Read the named column as an f64.
    fn get_f64(&self, column: &str) -> EngineResult<f64> {
        let value = self.get(column)?;
        value
            .as_f64()
            .ok_or_else(|| EngineError::type_mismatch(column, "float", value.type_name()))
    }

    /// Read the named column as text.
    fn get_text(&self, column: &str) -> EngineResult<String> {
        let value = self.get(column)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::type_mismatch(column, "text", value.type_name()))
    }

    /// Read the named column as a boolean, accepting 0/1 integers.
    fn get_bool(&self, column: &str) -> EngineResult<bool> {
        let value = self.get(column)?;
        value
            .as_bool()
            .ok_or_else(|| EngineError::type_mismatch(column, "bool", value.type_name()))
    }

    /// Read the named column as a UUID, accepting text and binary encodings.
    fn get_uuid(&self, column: &str) -> EngineResult<Uuid> {
        let value = self.get(column)?;
        value
            .as_uuid()
            .ok_or_else(|| EngineError::type_mismatch(column, "uuid", value.type_name()))
    }

    /// Read the named column as a UTC timestamp.
    fn get_timestamp(&self, column: &str) -> EngineResult<chrono::DateTime<chrono::Utc>> {
        let value = self.get(column)?;
        value
            .as_timestamp()
            .ok_or_else(|| EngineError::type_mismatch(column, "timestamp", value.type_name()))
    }
}

/// The pluggable execution backend.
///
/// Statements arrive with named `@placeholder` tokens and parameters carrying
/// the matching names. A driver instance is assumed exclusive to one logical
/// transaction at a time; running independent transactions concurrently
/// against one instance is the caller's responsibility.
#[async_trait]
pub trait Driver: Send + Sync {
    /// The normalization flags this instance was configured with.
    fn options(&self) -> &DriverOptions;

    /// Execute a statement returning a single scalar, if any row matched.
    async fn execute_scalar(
        &self,
        statement: &str,
        params: &[Parameter],
    ) -> EngineResult<Option<Value>>;

    /// Execute a statement returning the affected-row count.
    async fn execute(&self, statement: &str, params: &[Parameter]) -> EngineResult<u64>;

    /// Execute an insert returning the newly generated 64-bit identifier.
    async fn execute_insert(&self, statement: &str, params: &[Parameter]) -> EngineResult<i64>;

    /// Execute a statement returning a forward-only row source.
    async fn query(
        &self,
        statement: &str,
        params: &[Parameter],
    ) -> EngineResult<Box<dyn RowSource>>;

    /// Begin a transaction on the underlying connection.
    async fn begin(&self) -> EngineResult<TransactionToken>;

    /// Commit the transaction identified by `token`.
    async fn commit(&self, token: TransactionToken) -> EngineResult<()>;

    /// Roll back the transaction identified by `token`.
    async fn rollback(&self, token: TransactionToken) -> EngineResult<()>;
}

/// Close a row source without letting a close failure replace the primary
/// outcome. The failure is logged and swallowed; this is the only place the
/// engine suppresses an error.
pub async fn close_quietly(rows: &mut Box<dyn RowSource>) {
    if let Err(err) = rows.close().await {
        warn!(error = %err, "row source close failed");
    }
}
