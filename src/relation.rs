//! One-to-one-or-zero child relationships.
//!
//! A [`ChildLoader`] ties a child entity type to its parent through a
//! parent-key column. Loading enforces to-one cardinality; saving routes a
//! child to insert or update based on a caller-supplied new-vs-existing
//! predicate, adding the parent key automatically on insert.

use std::sync::Arc;

use tracing::debug;

use crate::engine::PersistenceEngine;
use crate::error::{EngineError, EngineResult};
use crate::mapping::UpdateScope;
use crate::models::{Parameter, Value};
use crate::registry::Entity;
use crate::transaction::TransactionContext;

/// Stores a loaded child (or its absence) into the parent.
pub type ChildAssign<P, C> = Arc<dyn Fn(&mut P, Option<C>) + Send + Sync>;

/// Decides whether a child instance has been persisted yet.
pub type IsNew<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Loads and saves the to-one child of a parent entity.
pub struct ChildLoader<P, C> {
    parent_key_column: &'static str,
    allow_missing: bool,
    assign: ChildAssign<P, C>,
    is_new: IsNew<C>,
}

impl<P, C: Entity> ChildLoader<P, C> {
    /// A loader for a required child. `assign` stores the loaded child into
    /// the parent; `is_new` routes saves to insert or update.
    pub fn new(
        parent_key_column: &'static str,
        assign: ChildAssign<P, C>,
        is_new: IsNew<C>,
    ) -> Self {
        Self {
            parent_key_column,
            allow_missing: false,
            assign,
            is_new,
        }
    }

    /// Permit a missing child: an absent parent key or zero matching rows
    /// assigns an empty reference instead of failing.
    pub fn allow_missing(mut self) -> Self {
        self.allow_missing = true;
        self
    }

    pub fn parent_key_column(&self) -> &'static str {
        self.parent_key_column
    }

    /// Load the child for `parent_key` and store it into the parent.
    ///
    /// An absent key or zero rows assigns an empty reference when missing
    /// children are permitted and fails otherwise. More than one row always
    /// fails: the to-one relation is violated.
    pub async fn load(
        &self,
        engine: &PersistenceEngine,
        parent: &mut P,
        parent_key: Value,
    ) -> EngineResult<()> {
        if parent_key.is_null() {
            return self.assign_missing(parent, "parent key is not assigned");
        }

        let mut children = engine.fetch_by_parent::<C>(parent_key).await?;
        if children.len() > 1 {
            return Err(EngineError::invalid_state(format!(
                "to-one relation on '{}' violated: found {} child rows",
                self.parent_key_column,
                children.len(),
            )));
        }
        match children.pop() {
            Some(child) => {
                (self.assign)(parent, Some(child));
                Ok(())
            }
            None => self.assign_missing(parent, "no child row exists"),
        }
    }

    /// Save the child: insert with the parent key added as an extra
    /// parameter when the predicate says it is new, otherwise update with
    /// the requested scope.
    pub async fn save(
        &self,
        engine: &PersistenceEngine,
        ctx: &TransactionContext,
        child: &mut C,
        parent_key: Value,
        scope: Option<UpdateScope>,
    ) -> EngineResult<()> {
        if (self.is_new)(child) {
            if parent_key.is_null() {
                return Err(EngineError::argument_invalid(format!(
                    "cannot insert child row without a '{}' value",
                    self.parent_key_column,
                )));
            }
            let parent_param = Parameter::new(self.parent_key_column, parent_key);
            engine.insert(ctx, child, &[parent_param]).await?;
            debug!(parent_key_column = self.parent_key_column, "child inserted");
        } else {
            engine.update(ctx, child, scope).await?;
            debug!(parent_key_column = self.parent_key_column, "child updated");
        }
        Ok(())
    }

    fn assign_missing(&self, parent: &mut P, reason: &str) -> EngineResult<()> {
        if self.allow_missing {
            (self.assign)(parent, None);
            Ok(())
        } else {
            Err(EngineError::invalid_state(format!(
                "required child on '{}' is missing: {reason}",
                self.parent_key_column,
            )))
        }
    }
}
