//! In-memory catalog driver.
//!
//! Implements [`ConnectionProvider`] over a shared in-process catalog of
//! tables, columns and rows. Used for dry runs and as the store behind the
//! writer tests. Statements are rendered with the configured dialect (so
//! identifier validation behaves as it would against a real server) and
//! logged in execution order.
//!
//! Transactions buffer their statements and apply them atomically on commit.
//! Faults can be injected per operation to exercise partial-failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::core::{
    ColumnDescriptor, Connection, ConnectionProvider, Dialect, SqlValue, Statement, TableId,
};
use crate::drivers::postgres::PostgresDialect;
use crate::error::{Result, SinkError};

/// One stored row, keyed by column name.
pub type MemoryRow = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    identity: Option<String>,
    next_id: i64,
    rows: Vec<MemoryRow>,
}

#[derive(Debug, Default)]
struct Faults {
    connect: bool,
    metadata: bool,
    add_column: HashSet<String>,
    execute: bool,
    commit: bool,
}

#[derive(Debug, Default)]
struct CatalogState {
    tables: BTreeMap<TableId, MemoryTable>,
    statements: Vec<Statement>,
    sql: Vec<String>,
    connections: usize,
    faults: Faults,
}

impl CatalogState {
    fn apply(&mut self, statement: &Statement) -> Result<u64> {
        apply_to(&mut self.tables, statement, &self.faults)
    }
}

fn apply_to(
    tables: &mut BTreeMap<TableId, MemoryTable>,
    statement: &Statement,
    faults: &Faults,
) -> Result<u64> {
    match statement {
        Statement::CreateTable {
            table,
            identity_column,
        } => {
            if tables.contains_key(table) {
                return Err(SinkError::TableAlreadyExists(table.to_string()));
            }
            tables.insert(
                table.clone(),
                MemoryTable {
                    columns: vec![identity_column.clone()],
                    identity: Some(identity_column.clone()),
                    next_id: 1,
                    rows: Vec::new(),
                },
            );
            Ok(0)
        }
        Statement::AddColumn { table, column, .. } => {
            if faults.add_column.contains(column) {
                return Err(SinkError::execution(
                    table.to_string(),
                    format!("injected failure adding column {}", column),
                ));
            }
            let stored = tables
                .get_mut(table)
                .ok_or_else(|| SinkError::execution(table.to_string(), "relation does not exist"))?;
            if stored.columns.contains(column) {
                return Err(SinkError::ColumnAlreadyExists {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
            stored.columns.push(column.clone());
            Ok(0)
        }
        Statement::Insert {
            table,
            columns,
            values,
        } => {
            if faults.execute {
                return Err(SinkError::execution(table.to_string(), "injected execution failure"));
            }
            let stored = tables
                .get_mut(table)
                .ok_or_else(|| SinkError::execution(table.to_string(), "relation does not exist"))?;
            if let Some(missing) = columns.iter().find(|c| !stored.columns.contains(c)) {
                return Err(SinkError::execution(
                    table.to_string(),
                    format!("column \"{}\" does not exist", missing),
                ));
            }

            let mut seen = HashSet::with_capacity(columns.len());
            if let Some(repeated) = columns.iter().find(|c| !seen.insert(c.as_str())) {
                return Err(SinkError::execution(
                    table.to_string(),
                    format!("column \"{}\" specified more than once", repeated),
                ));
            }

            let mut row: MemoryRow = columns.iter().cloned().zip(values.iter().cloned()).collect();
            if let Some(identity) = &stored.identity {
                if !row.contains_key(identity) {
                    row.insert(identity.clone(), SqlValue::I64(stored.next_id));
                    stored.next_id += 1;
                }
            }
            stored.rows.push(row);
            Ok(1)
        }
    }
}

/// Shared in-memory catalog. Clones share the same state.
#[derive(Clone)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
    dialect: Arc<dyn Dialect>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    /// Empty catalog rendering statements as PostgreSQL.
    pub fn new() -> Self {
        Self::with_dialect(Arc::new(PostgresDialect::new()))
    }

    /// Empty catalog rendering statements with the given dialect.
    pub fn with_dialect(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState::default())),
            dialect,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a table with the given columns (no identity column).
    pub fn with_table(self, table: &TableId, columns: &[&str]) -> Self {
        self.lock().tables.insert(
            table.clone(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                ..MemoryTable::default()
            },
        );
        self
    }

    pub fn table_exists(&self, table: &TableId) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Column names of a table, in creation order.
    pub fn columns(&self, table: &TableId) -> Option<Vec<String>> {
        self.lock().tables.get(table).map(|t| t.columns.clone())
    }

    /// Committed rows of a table.
    pub fn rows(&self, table: &TableId) -> Vec<MemoryRow> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every statement sent to the catalog, in order, including failed ones.
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// Rendered SQL of every statement sent to the catalog.
    pub fn sql_log(&self) -> Vec<String> {
        self.lock().sql.clone()
    }

    /// Number of `AddColumn` statements attempted.
    pub fn alteration_count(&self) -> usize {
        self.lock()
            .statements
            .iter()
            .filter(|s| matches!(s, Statement::AddColumn { .. }))
            .count()
    }

    /// Number of connections handed out so far.
    pub fn connection_count(&self) -> usize {
        self.lock().connections
    }

    /// Make `connect` fail.
    pub fn fail_connect(&self, fail: bool) {
        self.lock().faults.connect = fail;
    }

    /// Make every metadata query fail.
    pub fn fail_metadata(&self, fail: bool) {
        self.lock().faults.metadata = fail;
    }

    /// Make `ADD` of this column fail.
    pub fn fail_add_column(&self, column: &str) {
        self.lock().faults.add_column.insert(column.to_string());
    }

    /// Make inserts fail at execution time.
    pub fn fail_execution(&self, fail: bool) {
        self.lock().faults.execute = fail;
    }

    /// Make commit fail.
    pub fn fail_commit(&self, fail: bool) {
        self.lock().faults.commit = fail;
    }
}

#[async_trait]
impl ConnectionProvider for MemoryCatalog {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.lock();
        if state.faults.connect {
            return Err(SinkError::pool(
                "injected connection failure",
                "connecting to memory catalog",
            ));
        }
        state.connections += 1;
        drop(state);

        Ok(Box::new(MemoryConnection {
            catalog: self.clone(),
            pending: None,
        }))
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }
}

/// Connection to a [`MemoryCatalog`].
pub struct MemoryConnection {
    catalog: MemoryCatalog,
    /// Statements buffered by the open transaction, if any.
    pending: Option<Vec<Statement>>,
}

impl MemoryConnection {
    fn record(&self, statement: &Statement) -> Result<()> {
        let sql = self.catalog.dialect.render(statement);
        let mut state = self.catalog.lock();
        state.statements.push(statement.clone());
        state.sql.push(sql?);
        Ok(())
    }

    fn run(&mut self, statement: &Statement) -> Result<u64> {
        self.record(statement)?;

        match self.pending.as_mut() {
            Some(pending) => {
                // Check against a scratch copy so errors surface at execute time
                let state = self.catalog.lock();
                let mut scratch = state.tables.clone();
                for queued in pending.iter() {
                    apply_to(&mut scratch, queued, &state.faults)?;
                }
                let affected = apply_to(&mut scratch, statement, &state.faults)?;
                drop(state);
                pending.push(statement.clone());
                Ok(affected)
            }
            None => self.catalog.lock().apply(statement),
        }
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        let pending = self.pending.take().unwrap_or_default();
        if !commit {
            return Ok(());
        }

        let mut state = self.catalog.lock();
        if state.faults.commit {
            return Err(SinkError::execution(
                "memory catalog",
                "injected commit failure",
            ));
        }
        let mut tables = state.tables.clone();
        for statement in &pending {
            apply_to(&mut tables, statement, &state.faults)?;
        }
        state.tables = tables;
        Ok(())
    }

    fn check_metadata(&self, table: &TableId) -> Result<()> {
        if self.catalog.lock().faults.metadata {
            return Err(SinkError::metadata(
                table.to_string(),
                "injected metadata failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&mut self) -> Result<()> {
        if self.pending.is_none() {
            self.pending = Some(Vec::new());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.finish(true)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.finish(false)
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.run(statement)
    }

    async fn table_exists(&mut self, table: &TableId) -> Result<bool> {
        self.check_metadata(table)?;
        Ok(self.catalog.table_exists(table))
    }

    async fn column_exists(&mut self, table: &TableId, column: &str) -> Result<bool> {
        self.check_metadata(table)?;
        Ok(self
            .catalog
            .columns(table)
            .is_some_and(|cols| cols.iter().any(|c| c == column)))
    }

    async fn columns(&mut self, table: &TableId) -> Result<Vec<ColumnDescriptor>> {
        self.check_metadata(table)?;
        Ok(self
            .catalog
            .columns(table)
            .unwrap_or_default()
            .into_iter()
            .map(|name| ColumnDescriptor {
                name,
                type_name: "text".to_string(),
            })
            .collect())
    }
}
