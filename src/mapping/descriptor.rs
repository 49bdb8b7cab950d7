//! Entity descriptors.
//!
//! An [`EntityDescriptor`] aggregates one identity map, the ordered field maps
//! of a business type, and a per-type statement cache. It is built once per
//! type, kept for the process lifetime, and converts between row sources,
//! parameter lists, and instances. Construction is pure: building the same
//! descriptor twice yields equivalent behavior, which is what makes redundant
//! concurrent registry builds safe.

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::driver::RowSource;
use crate::mapping::field::{FieldMap, PersistFlags, UpdateScope, audit_timestamp};
use crate::mapping::identity::{IdentityMap, KeyStrategy};
use crate::mapping::statements::{StatementCache, StatementKind};
use crate::models::{Parameter, Value};

/// Factory producing a fresh instance of the mapped type.
pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Per-type mapping metadata and statement cache.
pub struct EntityDescriptor<T> {
    name: &'static str,
    table: &'static str,
    identity: IdentityMap<T>,
    fields: Vec<FieldMap<T>>,
    parent_key_column: Option<&'static str>,
    statements: StatementCache,
    factory: Factory<T>,
    template_factory: Factory<T>,
}

impl<T> EntityDescriptor<T> {
    /// Create a descriptor for `name`, stored in `table`, with one identity
    /// map and a factory for load operations. The template factory used by
    /// init-from-context defaults to the load factory.
    pub fn new(
        name: &'static str,
        table: &'static str,
        identity: IdentityMap<T>,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let factory: Factory<T> = Arc::new(factory);
        Self {
            name,
            table,
            identity,
            fields: Vec::new(),
            parent_key_column: None,
            statements: StatementCache::new(),
            template_factory: Arc::clone(&factory),
            factory,
        }
    }

    /// Append a field map. Declaration order is parameter order.
    pub fn with_field(mut self, field: FieldMap<T>) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark the type as a child in a relationship keyed by `column`.
    /// The column is added to insert statements and fed by extra parameters.
    pub fn with_parent_key(mut self, column: &'static str) -> Self {
        self.parent_key_column = Some(column);
        self
    }

    /// Use a distinct factory for init-from-context.
    pub fn with_template_factory(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.template_factory = Arc::new(factory);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn identity(&self) -> &IdentityMap<T> {
        &self.identity
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.identity.strategy()
    }

    pub fn parent_key_column(&self) -> Option<&'static str> {
        self.parent_key_column
    }

    /// Fail unless the identity strategy permits mutation.
    pub fn ensure_writable(&self, operation: &str) -> EngineResult<()> {
        if self.identity.has_key() {
            Ok(())
        } else {
            Err(EngineError::unsupported(operation, self.name))
        }
    }

    /// Fail unless the type has a key to fetch by.
    pub fn ensure_keyed(&self, operation: &str) -> EngineResult<()> {
        self.ensure_writable(operation)
    }

    // ------------------------------------------------------------------
    // Row conversion
    // ------------------------------------------------------------------

    /// Construct a new instance from the current row.
    pub fn load_instance(&self, row: &dyn RowSource) -> EngineResult<T> {
        let mut instance = (self.factory)();
        self.load_into(row, &mut instance)?;
        Ok(instance)
    }

    /// Apply the current row to an existing instance: identity first, then
    /// every read-flagged field.
    pub fn load_into(&self, row: &dyn RowSource, instance: &mut T) -> EngineResult<()> {
        self.identity.load_from_row(instance, row)?;
        for field in self
            .fields
            .iter()
            .filter(|f| f.participates_in(PersistFlags::READ))
        {
            let value = row.get(field.column())?;
            field.write(instance, value)?;
        }
        Ok(())
    }

    /// Construct a template instance from a context row, applying
    /// init-flagged fields only.
    pub fn init_instance(&self, row: &dyn RowSource) -> EngineResult<T> {
        let mut instance = (self.template_factory)();
        self.init_into(row, &mut instance)?;
        Ok(instance)
    }

    /// Apply init-flagged fields of a context row to an existing instance.
    pub fn init_into(&self, row: &dyn RowSource, instance: &mut T) -> EngineResult<()> {
        for field in self
            .fields
            .iter()
            .filter(|f| f.participates_in(PersistFlags::INIT))
        {
            let value = row.get(field.column())?;
            field.write(instance, value)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parameter construction
    // ------------------------------------------------------------------

    /// Ordered insert parameters: one per insert-flagged field in declared
    /// order, the identity parameter when the strategy supplies one, then the
    /// caller's extra parameters (e.g. a parent key). Audit creation stamps
    /// are applied to the instance first.
    pub fn params_for_insert(
        &self,
        instance: &mut T,
        extra: &[Parameter],
    ) -> EngineResult<Vec<Parameter>> {
        self.ensure_writable("insert")?;

        let now = audit_timestamp();
        for field in &self.fields {
            field.stamp_for_insert(instance, now)?;
        }

        let mut params = Vec::with_capacity(self.fields.len() + 1 + extra.len());
        for field in self
            .fields
            .iter()
            .filter(|f| f.participates_in(PersistFlags::INSERT))
        {
            params.push(Parameter::new(field.column(), field.read(instance)));
        }
        if let Some(key) = self.identity.insert_param(instance, self.name)? {
            params.push(key);
        }
        params.extend(extra.iter().cloned());
        Ok(params)
    }

    /// Ordered update parameters: one per update-flagged field whose scope
    /// matches, the updatable-key assignment when present, then the identity
    /// predicate. The modification stamp is refreshed first.
    pub fn params_for_update(
        &self,
        instance: &mut T,
        scope: Option<UpdateScope>,
    ) -> EngineResult<Vec<Parameter>> {
        self.ensure_writable("update")?;

        let now = audit_timestamp();
        for field in &self.fields {
            field.stamp_for_update(instance, now)?;
        }

        let mut params = Vec::new();
        for field in self.fields.iter().filter(|f| {
            f.participates_in(PersistFlags::UPDATE) && f.included_in_scope(scope)
        }) {
            params.push(Parameter::new(field.column(), field.read(instance)));
        }
        if let Some(assignment) = self.identity.update_assignment_param(instance, self.name)? {
            params.push(assignment);
        }
        params.extend(self.identity.predicate_params(instance, self.name)?);
        Ok(params)
    }

    /// Delete parameters: the identity predicate.
    pub fn params_for_delete(&self, instance: &T) -> EngineResult<Vec<Parameter>> {
        self.ensure_writable("delete")?;
        self.identity.predicate_params(instance, self.name)
    }

    /// The key predicate parameter for fetch-by-key.
    pub fn key_param(&self, key: &Value) -> EngineResult<Parameter> {
        self.ensure_keyed("fetch by key")?;
        if key.is_null() {
            return Err(EngineError::argument_invalid(format!(
                "{}: fetch key must not be null",
                self.name
            )));
        }
        Ok(Parameter::new(self.identity.column(), key.clone()))
    }

    /// The parent-key predicate parameter for fetch-by-parent.
    pub fn parent_param(&self, parent_key: &Value) -> EngineResult<Parameter> {
        let column = self.parent_key_column.ok_or_else(|| {
            EngineError::argument_invalid(format!(
                "{}: no parent-key column declared",
                self.name
            ))
        })?;
        if parent_key.is_null() {
            return Err(EngineError::argument_invalid(format!(
                "{}: parent key must not be null",
                self.name
            )));
        }
        Ok(Parameter::new(column, parent_key.clone()))
    }

    // ------------------------------------------------------------------
    // Statement text
    // ------------------------------------------------------------------

    /// Cached statement text for an operation, generating it on first access.
    pub fn statement(
        &self,
        kind: StatementKind,
        scope: Option<UpdateScope>,
    ) -> EngineResult<Arc<str>> {
        match kind {
            StatementKind::SelectByKey => self.ensure_keyed("fetch by key")?,
            StatementKind::SelectByParent if self.parent_key_column.is_none() => {
                return Err(EngineError::argument_invalid(format!(
                    "{}: no parent-key column declared",
                    self.name
                )));
            }
            StatementKind::Insert => self.ensure_writable("insert")?,
            StatementKind::Update => self.ensure_writable("update")?,
            StatementKind::Delete => self.ensure_writable("delete")?,
            _ => {}
        }
        Ok(self
            .statements
            .get_or_add(kind, scope, || self.generate(kind, scope)))
    }

    fn generate(&self, kind: StatementKind, scope: Option<UpdateScope>) -> String {
        match kind {
            StatementKind::SelectByKey => format!(
                "SELECT {} FROM {} WHERE {} = @{}",
                self.select_columns().join(", "),
                self.table,
                self.identity.column(),
                self.identity.column(),
            ),
            StatementKind::SelectAll => format!(
                "SELECT {} FROM {}",
                self.select_columns().join(", "),
                self.table,
            ),
            StatementKind::SelectByParent => {
                // Precondition checked in statement()
                let parent = self.parent_key_column.unwrap_or_default();
                format!(
                    "SELECT {} FROM {} WHERE {} = @{}",
                    self.select_columns().join(", "),
                    self.table,
                    parent,
                    parent,
                )
            }
            StatementKind::Insert => {
                let mut columns: Vec<&str> = self
                    .fields
                    .iter()
                    .filter(|f| f.participates_in(PersistFlags::INSERT))
                    .map(|f| f.column())
                    .collect();
                if matches!(
                    self.identity.strategy(),
                    KeyStrategy::Assigned | KeyStrategy::AssignedUpdatable
                ) {
                    columns.push(self.identity.column());
                }
                if let Some(parent) = self.parent_key_column {
                    columns.push(parent);
                }
                let placeholders: Vec<String> =
                    columns.iter().map(|c| format!("@{c}")).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.table,
                    columns.join(", "),
                    placeholders.join(", "),
                )
            }
            StatementKind::Update => {
                let mut assignments: Vec<String> = self
                    .fields
                    .iter()
                    .filter(|f| {
                        f.participates_in(PersistFlags::UPDATE) && f.included_in_scope(scope)
                    })
                    .map(|f| format!("{} = @{}", f.column(), f.column()))
                    .collect();
                if self.identity.strategy() == KeyStrategy::AssignedUpdatable {
                    assignments.push(format!(
                        "{} = @{}",
                        self.identity.column(),
                        self.identity.update_assignment_name(),
                    ));
                }
                format!(
                    "UPDATE {} SET {} WHERE {} = @{}",
                    self.table,
                    assignments.join(", "),
                    self.identity.column(),
                    self.identity.column(),
                )
            }
            StatementKind::Delete => format!(
                "DELETE FROM {} WHERE {} = @{}",
                self.table,
                self.identity.column(),
                self.identity.column(),
            ),
        }
    }

    fn select_columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        if self.identity.has_key() {
            columns.push(self.identity.column());
        }
        columns.extend(
            self.fields
                .iter()
                .filter(|f| f.participates_in(PersistFlags::READ))
                .map(|f| f.column()),
        );
        columns
    }
}
