//! Field mapping.
//!
//! A [`FieldMap`] binds one database column to one object field, carrying
//! persistence flags, an optional update scope, and accessor closures bound
//! once when the descriptor is built - never re-resolved per call. Audit
//! variants stamp second-precision UTC timestamps automatically.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

use crate::error::EngineResult;
use crate::models::Value;

/// Reads one field of an entity as a [`Value`].
pub type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// Writes one field of an entity from a [`Value`].
pub type Setter<T> = Arc<dyn Fn(&mut T, Value) -> EngineResult<()> + Send + Sync>;

/// Bitset of operations a field participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistFlags(u8);

impl PersistFlags {
    /// Participates in no operation.
    pub const NONE: Self = Self(0);
    /// Populated by init-from-context.
    pub const INIT: Self = Self(1);
    /// Read back when loading from a row.
    pub const READ: Self = Self(1 << 1);
    /// Written on insert.
    pub const INSERT: Self = Self(1 << 2);
    /// Written on update.
    pub const UPDATE: Self = Self(1 << 3);

    /// Check whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PersistFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A caller-specified subset of updatable fields, as a small bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateScope(pub u32);

/// How a field's scope is compared against a requested update scope.
/// Chosen once per field at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMatch {
    /// Any shared bit matches (flag-style scopes).
    #[default]
    Bitwise,
    /// The scopes must be equal.
    Exact,
}

/// The field's behavioral variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Ordinary getter/setter field.
    Plain,
    /// Creation timestamp: persists on init and insert; on creation also
    /// seeds the paired updated-at field with the identical value.
    AuditInsertedAt,
    /// Modification timestamp: persists on read, insert, and update;
    /// re-stamped on every update.
    AuditUpdatedAt,
}

/// Descriptor binding one database column to one object field.
pub struct FieldMap<T> {
    column: &'static str,
    property: &'static str,
    kind: FieldKind,
    flags: PersistFlags,
    scope: Option<UpdateScope>,
    scope_match: ScopeMatch,
    getter: Getter<T>,
    setter: Setter<T>,
    /// AuditInsertedAt only: stamps the paired updated-at field on creation.
    paired_setter: Option<Setter<T>>,
}

impl<T> FieldMap<T> {
    /// A plain field with explicit persistence flags.
    pub fn plain(
        column: &'static str,
        property: &'static str,
        flags: PersistFlags,
        getter: Getter<T>,
        setter: Setter<T>,
    ) -> Self {
        Self {
            column,
            property,
            kind: FieldKind::Plain,
            flags,
            scope: None,
            scope_match: ScopeMatch::default(),
            getter,
            setter,
            paired_setter: None,
        }
    }

    /// An audit creation-timestamp field. `paired_setter` writes the
    /// companion updated-at field, stamped with the identical value on insert.
    pub fn audit_inserted_at(
        column: &'static str,
        property: &'static str,
        getter: Getter<T>,
        setter: Setter<T>,
        paired_setter: Setter<T>,
    ) -> Self {
        Self {
            column,
            property,
            kind: FieldKind::AuditInsertedAt,
            flags: PersistFlags::INIT | PersistFlags::INSERT,
            scope: None,
            scope_match: ScopeMatch::default(),
            getter,
            setter,
            paired_setter: Some(paired_setter),
        }
    }

    /// An audit modification-timestamp field.
    pub fn audit_updated_at(
        column: &'static str,
        property: &'static str,
        getter: Getter<T>,
        setter: Setter<T>,
    ) -> Self {
        Self {
            column,
            property,
            kind: FieldKind::AuditUpdatedAt,
            flags: PersistFlags::READ | PersistFlags::INSERT | PersistFlags::UPDATE,
            scope: None,
            scope_match: ScopeMatch::default(),
            getter,
            setter,
            paired_setter: None,
        }
    }

    /// Restrict this field to an update scope (bitwise matching).
    pub fn with_scope(mut self, scope: UpdateScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Change how the scope is matched.
    pub fn with_scope_match(mut self, scope_match: ScopeMatch) -> Self {
        self.scope_match = scope_match;
        self
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn property(&self) -> &'static str {
        self.property
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn flags(&self) -> PersistFlags {
        self.flags
    }

    /// Check participation in an operation flag.
    pub fn participates_in(&self, flag: PersistFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether this field is included in an update with the requested scope.
    ///
    /// No requested scope includes every update-flagged field. A scoped field
    /// matches per its own matching mode. An unscoped plain field belongs to
    /// full updates only; the modification timestamp is re-stamped on every
    /// update and so rides along with any scope.
    pub fn included_in_scope(&self, requested: Option<UpdateScope>) -> bool {
        match (requested, self.scope) {
            (None, _) => true,
            (Some(_), None) => self.kind == FieldKind::AuditUpdatedAt,
            (Some(req), Some(own)) => match self.scope_match {
                ScopeMatch::Bitwise => req.0 & own.0 != 0,
                ScopeMatch::Exact => req == own,
            },
        }
    }

    /// Read this field's value from an instance.
    pub fn read(&self, instance: &T) -> Value {
        (self.getter)(instance)
    }

    /// Write a value into this field of an instance.
    pub fn write(&self, instance: &mut T, value: Value) -> EngineResult<()> {
        (self.setter)(instance, value)
    }

    /// Stamp audit state before an insert. The creation timestamp seeds both
    /// its own field and the paired updated-at field with the same instant.
    pub fn stamp_for_insert(&self, instance: &mut T, now: DateTime<Utc>) -> EngineResult<()> {
        if self.kind == FieldKind::AuditInsertedAt {
            (self.setter)(instance, Value::Timestamp(now))?;
            if let Some(paired) = &self.paired_setter {
                paired(instance, Value::Timestamp(now))?;
            }
        }
        Ok(())
    }

    /// Stamp audit state before an update.
    pub fn stamp_for_update(&self, instance: &mut T, now: DateTime<Utc>) -> EngineResult<()> {
        if self.kind == FieldKind::AuditUpdatedAt {
            (self.setter)(instance, Value::Timestamp(now))?;
        }
        Ok(())
    }
}

/// The current UTC time at second precision, the granularity audit columns
/// are stored at.
pub fn audit_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}
