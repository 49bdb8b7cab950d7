//! Statement caching.
//!
//! Generated SQL text is memoized per (operation, scope). Generation is pure
//! and deterministic, so concurrent first-time misses are allowed to run the
//! generator redundantly without mutual exclusion: the first writer wins and
//! every caller observes string-equal text. Entries never change once written.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::mapping::field::UpdateScope;

/// The statement operations a descriptor generates text for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    SelectByKey,
    SelectAll,
    SelectByParent,
    Insert,
    Update,
    Delete,
}

/// Memoized statement text per (operation, scope).
#[derive(Default)]
pub struct StatementCache {
    entries: RwLock<HashMap<(StatementKind, Option<UpdateScope>), Arc<str>>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached text for the key, invoking `generate` on a miss.
    ///
    /// The generator runs outside any lock. Losing a write race discards the
    /// redundant text and returns the stored entry instead.
    pub fn get_or_add(
        &self,
        kind: StatementKind,
        scope: Option<UpdateScope>,
        generate: impl FnOnce() -> String,
    ) -> Arc<str> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(text) = entries.get(&(kind, scope)) {
                return Arc::clone(text);
            }
        }

        let generated: Arc<str> = Arc::from(generate());

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let stored = entries
            .entry((kind, scope))
            .or_insert_with(|| {
                debug!(kind = ?kind, scope = ?scope, "statement cached");
                Arc::clone(&generated)
            });
        Arc::clone(stored)
    }

    /// Number of cached statements, for diagnostics.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
