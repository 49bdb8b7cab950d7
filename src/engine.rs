//! The persistence engine.
//!
//! [`PersistenceEngine`] is the boundary application code talks to: it
//! resolves the descriptor for the requested type, asks it for parameters and
//! cached statement text, and hands both to the driver. Read operations run
//! on whatever transaction the driver connection currently carries; write
//! operations are wrapped through the [`TransactionCoordinator`] and take the
//! caller's [`TransactionContext`].

use std::sync::Arc;

use tracing::debug;

use crate::driver::{Driver, RowSource, close_quietly};
use crate::error::{EngineError, EngineResult};
use crate::mapping::{EntityDescriptor, KeyStrategy, StatementKind, UpdateScope};
use crate::models::{Parameter, Value, normalize_params};
use crate::registry::{DescriptorRegistry, Entity};
use crate::transaction::{TransactionContext, TransactionCoordinator};

/// Orchestrates descriptors, statements, parameters, and the driver.
pub struct PersistenceEngine {
    driver: Arc<dyn Driver>,
    coordinator: TransactionCoordinator,
    registry: DescriptorRegistry,
}

impl PersistenceEngine {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(Arc::clone(&driver)),
            registry: DescriptorRegistry::new(),
            driver,
        }
    }

    /// The coordinator write operations are wrapped through, for callers
    /// that group several operations into one transaction.
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    // ------------------------------------------------------------------
    // Read operations
    // ------------------------------------------------------------------

    /// Fetch the entity with the given key. A missing row is an error: a
    /// keyed single-entity load requires existence.
    pub async fn fetch<T: Entity>(&self, key: impl Into<Value>) -> EngineResult<T> {
        let descriptor = self.registry.descriptor_for::<T>();
        match self.fetch_with(&descriptor, key.into()).await? {
            Some(found) => Ok(found),
            None => Err(self.missing_row(&descriptor)),
        }
    }

    /// Fetch the entity with the given key into an existing instance.
    pub async fn fetch_into<T: Entity>(
        &self,
        key: impl Into<Value>,
        instance: &mut T,
    ) -> EngineResult<()> {
        let descriptor = self.registry.descriptor_for::<T>();
        let key = descriptor.key_param(&key.into())?;
        let statement = descriptor.statement(StatementKind::SelectByKey, None)?;
        let params = normalize_params(vec![key], self.driver.options());

        let mut rows = self.driver.query(&statement, &params).await?;
        let outcome = self.load_one_into(&descriptor, rows.as_mut(), instance).await;
        close_quietly(&mut rows).await;
        if !outcome? {
            return Err(self.missing_row(&descriptor));
        }
        Ok(())
    }

    /// Fetch every row of the entity's table.
    pub async fn fetch_all<T: Entity>(&self) -> EngineResult<Vec<T>> {
        let descriptor = self.registry.descriptor_for::<T>();
        let statement = descriptor.statement(StatementKind::SelectAll, None)?;
        self.query_with(&descriptor, &statement, Vec::new()).await
    }

    /// Fetch every child row carrying the given parent key.
    pub async fn fetch_by_parent<T: Entity>(
        &self,
        parent_key: impl Into<Value>,
    ) -> EngineResult<Vec<T>> {
        let descriptor = self.registry.descriptor_for::<T>();
        let param = descriptor.parent_param(&parent_key.into())?;
        let statement = descriptor.statement(StatementKind::SelectByParent, None)?;
        self.query_with(&descriptor, &statement, vec![param]).await
    }

    /// Run a caller-supplied statement and map every returned row.
    /// An empty result is an empty list, never an error.
    pub async fn query<T: Entity>(
        &self,
        statement: &str,
        params: Vec<Parameter>,
    ) -> EngineResult<Vec<T>> {
        let descriptor = self.registry.descriptor_for::<T>();
        self.query_with(&descriptor, statement, params).await
    }

    /// Build a new instance from context data: run the caller-supplied
    /// statement and apply init-flagged fields of its single row to a
    /// template instance. Zero rows is an error.
    pub async fn init<T: Entity>(
        &self,
        statement: &str,
        params: Vec<Parameter>,
    ) -> EngineResult<T> {
        let descriptor = self.registry.descriptor_for::<T>();
        let params = normalize_params(params, self.driver.options());

        let mut rows = self.driver.query(statement, &params).await?;
        let outcome = self.init_one(&descriptor, rows.as_mut()).await;
        close_quietly(&mut rows).await;
        match outcome? {
            Some(instance) => Ok(instance),
            None => Err(self.missing_row(&descriptor)),
        }
    }

    /// Apply init-flagged context data to an existing instance.
    pub async fn init_into<T: Entity>(
        &self,
        statement: &str,
        params: Vec<Parameter>,
        instance: &mut T,
    ) -> EngineResult<()> {
        let descriptor = self.registry.descriptor_for::<T>();
        let params = normalize_params(params, self.driver.options());

        let mut rows = self.driver.query(statement, &params).await?;
        let outcome = self.init_one_into(&descriptor, rows.as_mut(), instance).await;
        close_quietly(&mut rows).await;
        if !outcome? {
            return Err(self.missing_row(&descriptor));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write operations
    // ------------------------------------------------------------------

    /// Insert the instance, with optional extra parameters (e.g. a parent
    /// key). Auto-generated keys are assigned back to the instance from the
    /// driver's returned identifier.
    pub async fn insert<T: Entity>(
        &self,
        ctx: &TransactionContext,
        instance: &mut T,
        extra: &[Parameter],
    ) -> EngineResult<()> {
        let descriptor = self.registry.descriptor_for::<T>();
        self.coordinator
            .run(ctx, |_tx| async move {
                let params = descriptor.params_for_insert(instance, extra)?;
                let statement = descriptor.statement(StatementKind::Insert, None)?;
                let params = normalize_params(params, self.driver.options());

                let generated = match descriptor.key_strategy() {
                    KeyStrategy::AutoGenerated => {
                        Some(self.driver.execute_insert(&statement, &params).await?)
                    }
                    _ => {
                        self.driver.execute(&statement, &params).await?;
                        None
                    }
                };
                descriptor
                    .identity()
                    .after_insert(instance, generated, descriptor.name())?;
                debug!(entity = descriptor.name(), "inserted");
                Ok(())
            })
            .await
    }

    /// Update the instance, restricted to the requested scope when one is
    /// given. A consumed pending key is promoted afterwards. Returns the
    /// affected-row count.
    pub async fn update<T: Entity>(
        &self,
        ctx: &TransactionContext,
        instance: &mut T,
        scope: Option<UpdateScope>,
    ) -> EngineResult<u64> {
        let descriptor = self.registry.descriptor_for::<T>();
        self.coordinator
            .run(ctx, |_tx| async move {
                let params = descriptor.params_for_update(instance, scope)?;
                let statement = descriptor.statement(StatementKind::Update, scope)?;
                let params = normalize_params(params, self.driver.options());

                let affected = self.driver.execute(&statement, &params).await?;
                descriptor.identity().after_update(instance);
                debug!(entity = descriptor.name(), affected, "updated");
                Ok(affected)
            })
            .await
    }

    /// Delete the instance by its key. Returns the affected-row count.
    pub async fn delete<T: Entity>(
        &self,
        ctx: &TransactionContext,
        instance: &mut T,
    ) -> EngineResult<u64> {
        let descriptor = self.registry.descriptor_for::<T>();
        self.coordinator
            .run(ctx, |_tx| async move {
                let params = descriptor.params_for_delete(instance)?;
                let statement = descriptor.statement(StatementKind::Delete, None)?;
                let params = normalize_params(params, self.driver.options());

                let affected = self.driver.execute(&statement, &params).await?;
                descriptor.identity().after_delete(instance);
                debug!(entity = descriptor.name(), affected, "deleted");
                Ok(affected)
            })
            .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn fetch_with<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        key: Value,
    ) -> EngineResult<Option<T>> {
        let key = descriptor.key_param(&key)?;
        let statement = descriptor.statement(StatementKind::SelectByKey, None)?;
        let params = normalize_params(vec![key], self.driver.options());

        let mut rows = self.driver.query(&statement, &params).await?;
        let outcome = self.load_one(descriptor, rows.as_mut()).await;
        close_quietly(&mut rows).await;
        outcome
    }

    async fn query_with<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        statement: &str,
        params: Vec<Parameter>,
    ) -> EngineResult<Vec<T>> {
        let params = normalize_params(params, self.driver.options());

        let mut rows = self.driver.query(statement, &params).await?;
        let outcome = self.load_all(descriptor, rows.as_mut()).await;
        close_quietly(&mut rows).await;
        outcome
    }

    async fn load_one<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        rows: &mut dyn RowSource,
    ) -> EngineResult<Option<T>> {
        if !rows.advance().await? {
            return Ok(None);
        }
        Ok(Some(descriptor.load_instance(rows)?))
    }

    async fn load_one_into<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        rows: &mut dyn RowSource,
        instance: &mut T,
    ) -> EngineResult<bool> {
        if !rows.advance().await? {
            return Ok(false);
        }
        descriptor.load_into(rows, instance)?;
        Ok(true)
    }

    async fn load_all<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        rows: &mut dyn RowSource,
    ) -> EngineResult<Vec<T>> {
        let mut loaded = Vec::new();
        while rows.advance().await? {
            loaded.push(descriptor.load_instance(rows)?);
        }
        debug!(entity = descriptor.name(), count = loaded.len(), "rows loaded");
        Ok(loaded)
    }

    async fn init_one_into<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        rows: &mut dyn RowSource,
        instance: &mut T,
    ) -> EngineResult<bool> {
        if !rows.advance().await? {
            return Ok(false);
        }
        descriptor.init_into(rows, instance)?;
        Ok(true)
    }

    async fn init_one<T: Entity>(
        &self,
        descriptor: &EntityDescriptor<T>,
        rows: &mut dyn RowSource,
    ) -> EngineResult<Option<T>> {
        if !rows.advance().await? {
            return Ok(None);
        }
        Ok(Some(descriptor.init_instance(rows)?))
    }

    fn missing_row<T>(&self, descriptor: &EntityDescriptor<T>) -> EngineError {
        EngineError::invalid_state(format!(
            "{}: required row does not exist",
            descriptor.name()
        ))
    }
}
