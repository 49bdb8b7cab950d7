//! Identity mapping.
//!
//! An [`IdentityMap`] describes how an entity's primary key is generated,
//! read, and mutated. Four strategies exist: driver-generated keys, externally
//! assigned immutable keys, externally assigned updatable keys (with a pending
//! slot for re-keying), and no key at all for query-result types.

use std::sync::Arc;

use crate::driver::RowSource;
use crate::error::{EngineError, EngineResult};
use crate::models::{Parameter, Value};

/// Reads the key slot of an entity. `None` means unset.
pub type KeyGetter<T> = Arc<dyn Fn(&T) -> Option<Value> + Send + Sync>;

/// Writes the key slot of an entity.
pub type KeySetter<T> = Arc<dyn Fn(&mut T, Option<Value>) + Send + Sync>;

/// Key generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// The driver generates the key on insert and returns it.
    AutoGenerated,
    /// The caller assigns the key before insert; it never changes.
    Assigned,
    /// The caller assigns the key and may re-key via the pending slot.
    AssignedUpdatable,
    /// No identity: a read-only query-result type. All mutation fails.
    QueryOnly,
}

/// Strategy object owning primary-key parameter construction and lifecycle.
pub struct IdentityMap<T> {
    column: &'static str,
    property: &'static str,
    strategy: KeyStrategy,
    get_key: Option<KeyGetter<T>>,
    set_key: Option<KeySetter<T>>,
    get_pending: Option<KeyGetter<T>>,
    set_pending: Option<KeySetter<T>>,
}

impl<T> IdentityMap<T> {
    /// A driver-generated key. The caller never sets it before insert.
    pub fn auto_generated(
        column: &'static str,
        property: &'static str,
        get_key: KeyGetter<T>,
        set_key: KeySetter<T>,
    ) -> Self {
        Self {
            column,
            property,
            strategy: KeyStrategy::AutoGenerated,
            get_key: Some(get_key),
            set_key: Some(set_key),
            get_pending: None,
            set_pending: None,
        }
    }

    /// An externally assigned immutable key.
    pub fn assigned(
        column: &'static str,
        property: &'static str,
        get_key: KeyGetter<T>,
        set_key: KeySetter<T>,
    ) -> Self {
        Self {
            column,
            property,
            strategy: KeyStrategy::Assigned,
            get_key: Some(get_key),
            set_key: Some(set_key),
            get_pending: None,
            set_pending: None,
        }
    }

    /// An externally assigned key that may be changed through the pending
    /// slot: updates predicate on the current key and assign the pending one.
    pub fn assigned_updatable(
        column: &'static str,
        property: &'static str,
        get_key: KeyGetter<T>,
        set_key: KeySetter<T>,
        get_pending: KeyGetter<T>,
        set_pending: KeySetter<T>,
    ) -> Self {
        Self {
            column,
            property,
            strategy: KeyStrategy::AssignedUpdatable,
            get_key: Some(get_key),
            set_key: Some(set_key),
            get_pending: Some(get_pending),
            set_pending: Some(set_pending),
        }
    }

    /// No identity. Insert, update, and delete are undefined for the type.
    pub fn query_only() -> Self {
        Self {
            column: "",
            property: "",
            strategy: KeyStrategy::QueryOnly,
            get_key: None,
            set_key: None,
            get_pending: None,
            set_pending: None,
        }
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Whether the type has a key at all.
    pub fn has_key(&self) -> bool {
        self.strategy != KeyStrategy::QueryOnly
    }

    fn current(&self, instance: &T) -> Option<Value> {
        self.get_key.as_ref().and_then(|get| get(instance))
    }

    fn pending(&self, instance: &T) -> Option<Value> {
        self.get_pending.as_ref().and_then(|get| get(instance))
    }

    fn store_current(&self, instance: &mut T, value: Option<Value>) {
        if let Some(set) = &self.set_key {
            set(instance, value);
        }
    }

    fn store_pending(&self, instance: &mut T, value: Option<Value>) {
        if let Some(set) = &self.set_pending {
            set(instance, value);
        }
    }

    /// The current key, required. Missing keys are an entity-state problem.
    pub fn require_key(&self, instance: &T, entity: &str) -> EngineResult<Value> {
        if !self.has_key() {
            return Err(EngineError::unsupported("key access", entity));
        }
        self.current(instance).ok_or_else(|| {
            EngineError::invalid_state(format!("{entity}: key '{}' is not assigned", self.property))
        })
    }

    /// The key parameter supplied at insert time, if the strategy has one.
    ///
    /// Auto-generated keys are omitted; the driver returns the value instead.
    /// Assigned keys are required. Updatable keys use the pending value when
    /// set, else the current one.
    pub fn insert_param(&self, instance: &T, entity: &str) -> EngineResult<Option<Parameter>> {
        match self.strategy {
            KeyStrategy::AutoGenerated => Ok(None),
            KeyStrategy::Assigned => {
                let key = self.require_key(instance, entity)?;
                Ok(Some(Parameter::new(self.column, key)))
            }
            KeyStrategy::AssignedUpdatable => {
                let key = match self.pending(instance) {
                    Some(pending) => pending,
                    None => self.require_key(instance, entity)?,
                };
                Ok(Some(Parameter::new(self.column, key)))
            }
            KeyStrategy::QueryOnly => Err(EngineError::unsupported("insert", entity)),
        }
    }

    /// WHERE-predicate parameters for update and delete. Always the current
    /// (pre-update) key.
    pub fn predicate_params(&self, instance: &T, entity: &str) -> EngineResult<Vec<Parameter>> {
        let key = self.require_key(instance, entity)?;
        Ok(vec![Parameter::new(self.column, key)])
    }

    /// The SET-clause key assignment for updatable keys: the pending value
    /// when set, else the current key reassigned to itself. `None` for every
    /// other strategy. The parameter is named `new_<column>` to keep it
    /// distinct from the predicate parameter.
    pub fn update_assignment_param(
        &self,
        instance: &T,
        entity: &str,
    ) -> EngineResult<Option<Parameter>> {
        if self.strategy != KeyStrategy::AssignedUpdatable {
            return Ok(None);
        }
        let value = match self.pending(instance) {
            Some(pending) => pending,
            None => self.require_key(instance, entity)?,
        };
        Ok(Some(Parameter::new(
            format!("new_{}", self.column),
            value,
        )))
    }

    /// Placeholder name used by `update_assignment_param`, for statement
    /// generation.
    pub fn update_assignment_name(&self) -> String {
        format!("new_{}", self.column)
    }

    /// Key lifecycle after a successful insert. Auto-generated strategies
    /// require the driver-returned identifier; a consumed pending key is
    /// promoted to current.
    pub fn after_insert(
        &self,
        instance: &mut T,
        generated: Option<i64>,
        entity: &str,
    ) -> EngineResult<()> {
        match self.strategy {
            KeyStrategy::AutoGenerated => {
                let id = generated.ok_or_else(|| {
                    EngineError::driver(
                        format!("{entity}: driver returned no generated key"),
                        None,
                    )
                })?;
                self.store_current(instance, Some(Value::Int(id)));
                Ok(())
            }
            KeyStrategy::AssignedUpdatable => {
                if let Some(pending) = self.pending(instance) {
                    self.store_current(instance, Some(pending));
                    self.store_pending(instance, None);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Key lifecycle after a successful update: promote pending to current.
    pub fn after_update(&self, instance: &mut T) {
        if self.strategy == KeyStrategy::AssignedUpdatable {
            if let Some(pending) = self.pending(instance) {
                self.store_current(instance, Some(pending));
                self.store_pending(instance, None);
            }
        }
    }

    /// Key lifecycle after a successful delete: updatable keys clear both
    /// slots, other strategies keep the key as-is.
    pub fn after_delete(&self, instance: &mut T) {
        if self.strategy == KeyStrategy::AssignedUpdatable {
            self.store_current(instance, None);
            self.store_pending(instance, None);
        }
    }

    /// Apply the key column of a row to an instance. Loading resets any
    /// pending key.
    pub fn load_from_row(&self, instance: &mut T, row: &dyn RowSource) -> EngineResult<()> {
        if !self.has_key() {
            return Ok(());
        }
        let value = row.get(self.column)?;
        self.store_current(instance, Some(value));
        self.store_pending(instance, None);
        Ok(())
    }
}
