//! Ambient transaction coordination.
//!
//! A [`TransactionContext`] is an explicit, cloneable handle that travels
//! through a call chain and carries the one transaction that chain is inside,
//! if any. The [`TransactionCoordinator`] wraps each unit of work: the
//! outermost wrapper on a context begins a driver transaction and becomes its
//! owner; nested wrappers observe the active transaction and join it. Only
//! the owner commits or rolls back.
//!
//! The context's interior lock is a plain mutex held only for pointer-sized
//! reads and writes, never across an await.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};

use crate::driver::{Driver, TransactionToken};
use crate::error::{EngineError, EngineResult};

/// Travels with a call chain and records the transaction it runs inside.
///
/// Clones share state: work dispatched with a clone of an active context
/// joins the same transaction. A fresh context is outside any transaction.
#[derive(Clone, Default)]
pub struct TransactionContext {
    active: Arc<Mutex<Option<TransactionToken>>>,
}

impl TransactionContext {
    /// A context outside any transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction is currently active on this context.
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// The active transaction's token, if any.
    pub fn token(&self) -> Option<TransactionToken> {
        *self.slot()
    }

    fn enter(&self, token: TransactionToken) {
        *self.slot() = Some(token);
    }

    fn clear(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> MutexGuard<'_, Option<TransactionToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("active", &self.token())
            .finish()
    }
}

/// Wraps units of work in driver transactions with single-owner completion.
pub struct TransactionCoordinator {
    driver: Arc<dyn Driver>,
}

impl TransactionCoordinator {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Run `work` inside the context's transaction, beginning one if none is
    /// active.
    ///
    /// When this call begins the transaction it owns it: success commits,
    /// failure rolls back and propagates the original error. A rollback
    /// failure on top of a work failure is reported as a composite
    /// [`EngineError::TransactionIntegrityRisk`] carrying both causes. When a
    /// transaction is already active the work joins it and completion is left
    /// to the owner.
    ///
    /// The context's active slot is cleared before the owner completes the
    /// transaction, so work dispatched after this call never observes a
    /// transaction that is mid-commit.
    pub async fn run<T, F, Fut>(&self, ctx: &TransactionContext, work: F) -> EngineResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        if let Some(token) = ctx.token() {
            debug!(%token, "joining active transaction");
            return work(ctx.clone()).await;
        }

        let token = self.driver.begin().await?;
        ctx.enter(token);
        debug!(%token, "transaction begun");

        let outcome = work(ctx.clone()).await;
        ctx.clear();

        match outcome {
            Ok(value) => {
                self.driver.commit(token).await?;
                debug!(%token, "transaction committed");
                Ok(value)
            }
            Err(original) => {
                warn!(%token, error = %original, "transaction failed, rolling back");
                match self.driver.rollback(token).await {
                    Ok(()) => {
                        debug!(%token, "transaction rolled back");
                        Err(original)
                    }
                    Err(rollback) => {
                        error!(
                            %token,
                            original = %original,
                            rollback = %rollback,
                            "rollback failed, transaction state unknown"
                        );
                        Err(EngineError::integrity_risk(original, rollback))
                    }
                }
            }
        }
    }
}
