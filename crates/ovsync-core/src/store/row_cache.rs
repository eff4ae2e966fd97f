// ── Raw row cache ──
//
// Mirrors remote state verbatim: table name -> row uuid -> latest row
// image. Every table the server reports is kept, typed or not.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use uuid::Uuid;

use ovsync_api::Row;

pub(crate) struct RowCache {
    tables: DashMap<String, HashMap<Uuid, Row>>,
}

impl RowCache {
    /// A cache with the given tables already present (and empty).
    pub(crate) fn with_tables<'a>(tables: impl IntoIterator<Item = &'a str>) -> Self {
        let cache = Self {
            tables: DashMap::new(),
        };
        for table in tables {
            cache.tables.entry(table.to_owned()).or_default();
        }
        cache
    }

    /// Exclusive access to one table, creating it on first reference.
    pub(crate) fn table_mut(&self, table: &str) -> RefMut<'_, String, HashMap<Uuid, Row>> {
        self.tables.entry(table.to_owned()).or_default()
    }

    pub(crate) fn row(&self, table: &str, uuid: &Uuid) -> Option<Row> {
        self.tables.get(table)?.get(uuid).cloned()
    }

    pub(crate) fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    /// Names of every table seen so far, sorted.
    pub(crate) fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Any one uuid present in `table`.
    pub(crate) fn any_uuid(&self, table: &str) -> Option<Uuid> {
        self.tables.get(table)?.keys().next().copied()
    }
}
