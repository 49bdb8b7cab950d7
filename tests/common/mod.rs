//! Shared integration-test fixtures: an in-memory driver that interprets the
//! engine's generated statement shapes, plus the fixture entity types.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use datamapper::config::DriverOptions;
use datamapper::driver::{Driver, RowSource, TransactionToken};
use datamapper::error::{EngineError, EngineResult};
use datamapper::mapping::{
    EntityDescriptor, FieldMap, IdentityMap, PersistFlags, UpdateScope,
};
use datamapper::models::{Parameter, Value};
use datamapper::{Entity, PersistenceEngine};

pub const FINANCIAL: UpdateScope = UpdateScope(0b01);

/// Install a per-test tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Row = HashMap<String, Value>;

#[derive(Clone, Default)]
struct Table {
    rows: Vec<Row>,
    auto_column: Option<String>,
    next_id: i64,
}

#[derive(Default)]
struct MemState {
    tables: HashMap<String, Table>,
    snapshot: Option<HashMap<String, Table>>,
}

/// An in-memory [`Driver`] understanding the statement shapes the engine
/// generates: single-table INSERT/UPDATE/DELETE/SELECT with named `@column`
/// placeholders and at most one equality predicate. Transactions snapshot
/// the whole store; commit and rollback failures can be injected.
pub struct MemoryDriver {
    options: DriverOptions,
    state: Mutex<MemState>,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            options: DriverOptions::default(),
            state: Mutex::new(MemState::default()),
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
        }
    }

    pub fn register_table(&self, name: &str, auto_column: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(
            name.to_string(),
            Table {
                rows: Vec::new(),
                auto_column: auto_column.map(str::to_string),
                next_id: 7,
            },
        );
    }

    /// Insert a raw row directly, bypassing the engine.
    pub fn seed_row(&self, table: &str, columns: &[(&str, Value)]) {
        let mut state = self.state.lock().unwrap();
        let table = state.tables.get_mut(table).expect("table not registered");
        let row: Row = columns
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        table.rows.push(row);
    }

    pub fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    fn insert_row(&self, statement: &str, params: &[Parameter]) -> EngineResult<Option<i64>> {
        let (table_name, columns) = parse_insert(statement)?;
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .get_mut(&table_name)
            .ok_or_else(|| EngineError::driver(format!("no such table '{table_name}'"), None))?;

        let mut row = Row::new();
        for column in &columns {
            row.insert(column.clone(), param_value(params, column)?.clone());
        }
        let generated = match &table.auto_column {
            Some(auto) => {
                let id = table.next_id;
                table.next_id += 1;
                row.insert(auto.clone(), Value::Int(id));
                Some(id)
            }
            None => None,
        };
        table.rows.push(row);
        Ok(generated)
    }

    fn select_rows(&self, statement: &str, params: &[Parameter]) -> EngineResult<Vec<Row>> {
        let (table_name, condition) = parse_select(statement)?;
        let state = self.state.lock().unwrap();
        let table = state
            .tables
            .get(&table_name)
            .ok_or_else(|| EngineError::driver(format!("no such table '{table_name}'"), None))?;

        let matching = match condition {
            Some((column, placeholder)) => {
                let needle = param_value(params, &placeholder)?;
                table
                    .rows
                    .iter()
                    .filter(|row| row.get(&column) == Some(needle))
                    .cloned()
                    .collect()
            }
            None => table.rows.clone(),
        };
        Ok(matching)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn options(&self) -> &DriverOptions {
        &self.options
    }

    async fn execute_scalar(
        &self,
        statement: &str,
        params: &[Parameter],
    ) -> EngineResult<Option<Value>> {
        let first_column = statement
            .strip_prefix("SELECT ")
            .and_then(|rest| rest.split([',', ' ']).next())
            .map(str::to_string)
            .ok_or_else(|| EngineError::driver("unsupported scalar statement", None))?;
        let rows = self.select_rows(statement, params)?;
        Ok(rows
            .first()
            .and_then(|row| row.get(&first_column))
            .cloned())
    }

    async fn execute(&self, statement: &str, params: &[Parameter]) -> EngineResult<u64> {
        if statement.starts_with("INSERT INTO ") {
            self.insert_row(statement, params)?;
            return Ok(1);
        }
        if let Some(rest) = statement.strip_prefix("UPDATE ") {
            let (table_name, rest) = rest
                .split_once(" SET ")
                .ok_or_else(|| EngineError::driver("malformed UPDATE", None))?;
            let (assignments, predicate) = rest
                .split_once(" WHERE ")
                .ok_or_else(|| EngineError::driver("unpredicated UPDATE", None))?;
            let (where_column, where_placeholder) = parse_condition(predicate)?;
            let needle = param_value(params, &where_placeholder)?.clone();

            let mut updates = Vec::new();
            for assignment in assignments.split(", ") {
                let (column, placeholder) = parse_condition(assignment)?;
                updates.push((column, param_value(params, &placeholder)?.clone()));
            }

            let mut state = self.state.lock().unwrap();
            let table = state.tables.get_mut(table_name).ok_or_else(|| {
                EngineError::driver(format!("no such table '{table_name}'"), None)
            })?;
            let mut affected = 0;
            for row in table
                .rows
                .iter_mut()
                .filter(|row| row.get(&where_column) == Some(&needle))
            {
                for (column, value) in &updates {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
            return Ok(affected);
        }
        if let Some(rest) = statement.strip_prefix("DELETE FROM ") {
            let (table_name, predicate) = rest
                .split_once(" WHERE ")
                .ok_or_else(|| EngineError::driver("unpredicated DELETE", None))?;
            let (where_column, where_placeholder) = parse_condition(predicate)?;
            let needle = param_value(params, &where_placeholder)?.clone();

            let mut state = self.state.lock().unwrap();
            let table = state.tables.get_mut(table_name).ok_or_else(|| {
                EngineError::driver(format!("no such table '{table_name}'"), None)
            })?;
            let before = table.rows.len();
            table.rows.retain(|row| row.get(&where_column) != Some(&needle));
            return Ok((before - table.rows.len()) as u64);
        }
        Err(EngineError::driver(
            format!("unsupported statement: {statement}"),
            None,
        ))
    }

    async fn execute_insert(&self, statement: &str, params: &[Parameter]) -> EngineResult<i64> {
        self.insert_row(statement, params)?.ok_or_else(|| {
            EngineError::driver("table has no generated-key column", None)
        })
    }

    async fn query(
        &self,
        statement: &str,
        params: &[Parameter],
    ) -> EngineResult<Box<dyn RowSource>> {
        let rows = self.select_rows(statement, params)?;
        Ok(Box::new(MemoryRows {
            rows: rows.into(),
            current: None,
            closed: false,
        }))
    }

    async fn begin(&self) -> EngineResult<TransactionToken> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.snapshot.is_some() {
            return Err(EngineError::driver("transaction already active", None));
        }
        state.snapshot = Some(state.tables.clone());
        Ok(TransactionToken::generate())
    }

    async fn commit(&self, _token: TransactionToken) -> EngineResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(EngineError::driver("commit refused", Some("40001".into())));
        }
        let mut state = self.state.lock().unwrap();
        state.snapshot = None;
        Ok(())
    }

    async fn rollback(&self, _token: TransactionToken) -> EngineResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(EngineError::driver("rollback refused", Some("40002".into())));
        }
        let mut state = self.state.lock().unwrap();
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| EngineError::driver("no transaction to roll back", None))?;
        state.tables = snapshot;
        Ok(())
    }
}

struct MemoryRows {
    rows: VecDeque<Row>,
    current: Option<Row>,
    closed: bool,
}

#[async_trait]
impl RowSource for MemoryRows {
    async fn advance(&mut self) -> EngineResult<bool> {
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn get(&self, column: &str) -> EngineResult<Value> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| EngineError::driver("no current row", None))?;
        Ok(row.get(column).cloned().unwrap_or(Value::Null))
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn param_value<'a>(params: &'a [Parameter], name: &str) -> EngineResult<&'a Value> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
        .ok_or_else(|| EngineError::driver(format!("missing parameter '@{name}'"), None))
}

/// `column = @placeholder` -> (column, placeholder)
fn parse_condition(clause: &str) -> EngineResult<(String, String)> {
    let (column, placeholder) = clause
        .split_once(" = @")
        .ok_or_else(|| EngineError::driver(format!("malformed condition: {clause}"), None))?;
    Ok((column.to_string(), placeholder.to_string()))
}

fn parse_insert(statement: &str) -> EngineResult<(String, Vec<String>)> {
    let rest = statement
        .strip_prefix("INSERT INTO ")
        .ok_or_else(|| EngineError::driver("malformed INSERT", None))?;
    let (table, rest) = rest
        .split_once(" (")
        .ok_or_else(|| EngineError::driver("malformed INSERT", None))?;
    let (columns, _) = rest
        .split_once(')')
        .ok_or_else(|| EngineError::driver("malformed INSERT", None))?;
    Ok((
        table.to_string(),
        columns.split(", ").map(str::to_string).collect(),
    ))
}

fn parse_select(statement: &str) -> EngineResult<(String, Option<(String, String)>)> {
    let rest = statement
        .strip_prefix("SELECT ")
        .ok_or_else(|| EngineError::driver("malformed SELECT", None))?;
    let (_, rest) = rest
        .split_once(" FROM ")
        .ok_or_else(|| EngineError::driver("malformed SELECT", None))?;
    match rest.split_once(" WHERE ") {
        Some((table, predicate)) => Ok((table.to_string(), Some(parse_condition(predicate)?))),
        None => Ok((rest.to_string(), None)),
    }
}

// ----------------------------------------------------------------------
// Fixture entities
// ----------------------------------------------------------------------

/// Auto-generated integer key, one unscoped field, one financially scoped
/// field, audit timestamps.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Invoice {
    pub id: Option<i64>,
    pub number: i64,
    pub total: f64,
    pub inserted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Invoice {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new(
            "Invoice",
            "invoice",
            IdentityMap::auto_generated(
                "invoice_id",
                "id",
                Arc::new(|i: &Invoice| i.id.map(Value::Int)),
                Arc::new(|i: &mut Invoice, v| i.id = v.and_then(|v| v.as_i64())),
            ),
            Invoice::default,
        )
        .with_field(FieldMap::plain(
            "number",
            "number",
            PersistFlags::READ | PersistFlags::INSERT | PersistFlags::UPDATE,
            Arc::new(|i: &Invoice| Value::Int(i.number)),
            Arc::new(|i: &mut Invoice, v: Value| {
                i.number = v.as_i64().unwrap_or_default();
                Ok(())
            }),
        ))
        .with_field(
            FieldMap::plain(
                "total",
                "total",
                PersistFlags::READ | PersistFlags::INSERT | PersistFlags::UPDATE,
                Arc::new(|i: &Invoice| Value::Float(i.total)),
                Arc::new(|i: &mut Invoice, v: Value| {
                    i.total = v.as_f64().unwrap_or_default();
                    Ok(())
                }),
            )
            .with_scope(FINANCIAL),
        )
        .with_field(FieldMap::audit_inserted_at(
            "inserted_at",
            "inserted_at",
            Arc::new(|i: &Invoice| i.inserted_at.into()),
            Arc::new(|i: &mut Invoice, v: Value| {
                i.inserted_at = v.as_timestamp();
                Ok(())
            }),
            Arc::new(|i: &mut Invoice, v: Value| {
                i.updated_at = v.as_timestamp();
                Ok(())
            }),
        ))
        .with_field(FieldMap::audit_updated_at(
            "updated_at",
            "updated_at",
            Arc::new(|i: &Invoice| i.updated_at.into()),
            Arc::new(|i: &mut Invoice, v: Value| {
                i.updated_at = v.as_timestamp();
                Ok(())
            }),
        ))
    }
}

/// Externally assigned updatable key with a pending slot for re-keying.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Account {
    pub code: Option<String>,
    pub pending_code: Option<String>,
    pub balance: f64,
}

impl Entity for Account {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new(
            "Account",
            "account",
            IdentityMap::assigned_updatable(
                "code",
                "code",
                Arc::new(|a: &Account| a.code.clone().map(Value::Text)),
                Arc::new(|a: &mut Account, v| {
                    a.code = v.and_then(|v| v.as_str().map(str::to_string));
                }),
                Arc::new(|a: &Account| a.pending_code.clone().map(Value::Text)),
                Arc::new(|a: &mut Account, v| {
                    a.pending_code = v.and_then(|v| v.as_str().map(str::to_string));
                }),
            ),
            Account::default,
        )
        .with_field(FieldMap::plain(
            "balance",
            "balance",
            PersistFlags::READ | PersistFlags::INSERT | PersistFlags::UPDATE,
            Arc::new(|a: &Account| Value::Float(a.balance)),
            Arc::new(|a: &mut Account, v: Value| {
                a.balance = v.as_f64().unwrap_or_default();
                Ok(())
            }),
        ))
    }
}

/// Child of [`Invoice`] through the `invoice_id` parent-key column.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvoiceLine {
    pub id: Option<i64>,
    pub amount: f64,
}

impl Entity for InvoiceLine {
    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new(
            "InvoiceLine",
            "invoice_line",
            IdentityMap::auto_generated(
                "line_id",
                "id",
                Arc::new(|l: &InvoiceLine| l.id.map(Value::Int)),
                Arc::new(|l: &mut InvoiceLine, v| l.id = v.and_then(|v| v.as_i64())),
            ),
            InvoiceLine::default,
        )
        .with_field(FieldMap::plain(
            "amount",
            "amount",
            PersistFlags::READ | PersistFlags::INSERT | PersistFlags::UPDATE,
            Arc::new(|l: &InvoiceLine| Value::Float(l.amount)),
            Arc::new(|l: &mut InvoiceLine, v: Value| {
                l.amount = v.as_f64().unwrap_or_default();
                Ok(())
            }),
        ))
        .with_parent_key("invoice_id")
    }
}

/// A driver with the fixture tables registered, plus an engine on top of it.
pub fn fixture_engine() -> (Arc<MemoryDriver>, PersistenceEngine) {
    let driver = Arc::new(MemoryDriver::new());
    driver.register_table("invoice", Some("invoice_id"));
    driver.register_table("account", None);
    driver.register_table("invoice_line", Some("line_id"));
    let engine = PersistenceEngine::new(driver.clone());
    (driver, engine)
}
