// ── Update batch application ──
//
// The single path through which remote changes reach the caches. Each
// table of a batch is applied under that table's typed writer lock, raw row
// first and typed entity second, so a reader of either cache never sees a
// row the other has not caught up with once the table is released.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use ovsync_api::{Row, TableUpdate, TableUpdates};

use super::DataStore;
use super::collection::TypedCollection;
use crate::convert::{FromTypedRow, TypedRow};
use crate::model::TypedKind;

/// What applying one batch did to the caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Rows inserted or replaced in the raw cache.
    pub upserted: usize,
    /// Rows removed from the raw cache.
    pub deleted: usize,
    /// Rows cached raw but rejected by the typed decoder.
    pub decode_failures: usize,
}

impl DataStore {
    /// Apply one update notification (or the initial monitor reply).
    pub fn apply_batch(&self, batch: &TableUpdates) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (table, update) in batch.tables() {
            match TypedKind::for_table(table) {
                Some(TypedKind::Bridge) => {
                    self.apply_typed(&self.bridges, table, update, &mut summary);
                }
                Some(TypedKind::Port) => self.apply_typed(&self.ports, table, update, &mut summary),
                Some(TypedKind::Interface) => {
                    self.apply_typed(&self.interfaces, table, update, &mut summary);
                }
                None => self.apply_raw(table, update, &mut summary),
            }
        }

        if !batch.is_empty() {
            self.last_update.send_replace(Some(Utc::now()));
        }

        debug!(
            upserted = summary.upserted,
            deleted = summary.deleted,
            decode_failures = summary.decode_failures,
            "applied update batch"
        );
        summary
    }

    fn apply_typed<T: FromTypedRow>(
        &self,
        collection: &TypedCollection<T>,
        table: &str,
        update: &TableUpdate,
        summary: &mut BatchSummary,
    ) {
        // Typed writer lock first, then the raw table: every writer takes
        // them in this order.
        let mut typed = collection.batch();
        let mut rows = self.rows.table_mut(table);

        for (uuid, change) in update.rows() {
            let after = change.after();
            apply_row(&mut rows, *uuid, after, summary);

            let Some(after) = after else {
                typed.remove(uuid);
                continue;
            };
            match TypedRow::decode(T::KIND, *uuid, after).map(T::from_typed) {
                Ok(Some(entity)) => typed.upsert(entity),
                Ok(None) => {
                    typed.remove(uuid);
                }
                Err(err) => {
                    warn!(table, %uuid, error = %err, "dropping undecodable row from typed cache");
                    typed.remove(uuid);
                    summary.decode_failures += 1;
                }
            }
        }
    }

    fn apply_raw(&self, table: &str, update: &TableUpdate, summary: &mut BatchSummary) {
        let mut rows = self.rows.table_mut(table);
        for (uuid, change) in update.rows() {
            apply_row(&mut rows, *uuid, change.after(), summary);
        }
    }
}

fn apply_row(
    rows: &mut HashMap<Uuid, Row>,
    uuid: Uuid,
    after: Option<&Row>,
    summary: &mut BatchSummary,
) {
    match after {
        Some(row) => {
            rows.insert(uuid, row.clone());
            summary.upserted += 1;
        }
        None => {
            if rows.remove(&uuid).is_some() {
                summary.deleted += 1;
            }
        }
    }
}
