//! Column-metadata cache.
//!
//! Keeps the known column set per table for a fixed TTL so a busy writer
//! does not query the catalog once per field per record. Entries are
//! extended on successful `ADD` and dropped on any failed alteration, since
//! the catalog state is then uncertain.

use std::collections::HashSet;
use std::time::Duration;

use moka::sync::Cache;

use crate::core::TableId;

/// Upper bound on cached tables; least recently used entries go first.
const MAX_CACHED_TABLES: u64 = 10_000;

/// Per-table column sets with expiry.
pub struct ColumnCache {
    ttl: Duration,
    entries: Cache<TableId, HashSet<String>>,
}

impl ColumnCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_CACHED_TABLES)
            .time_to_live(ttl)
            .build();
        Self { ttl, entries }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached columns of `table`, if present and not expired.
    pub fn get(&self, table: &TableId) -> Option<HashSet<String>> {
        self.entries.get(table)
    }

    /// Replace the cached column set of `table`.
    pub fn store(&self, table: &TableId, columns: HashSet<String>) {
        self.entries.insert(table.clone(), columns);
    }

    /// Record a column added to `table`. No-op if the table is not cached.
    pub fn add_column(&self, table: &TableId, column: &str) {
        if let Some(mut columns) = self.entries.get(table) {
            columns.insert(column.to_string());
            self.entries.insert(table.clone(), columns);
        }
    }

    pub fn invalidate(&self, table: &TableId) {
        self.entries.invalidate(table);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of live entries, after expired ones are evicted.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}
