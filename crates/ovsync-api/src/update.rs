// Rows and table update notifications.
//
// A `TableUpdates` value is what the server sends both as the reply to a
// `monitor` request (the initial contents) and as the payload of every
// subsequent `update` notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One database row: column name to OVSDB value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// The before and after images of one row within an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
}

impl RowUpdate {
    /// An insert or modification carrying `row` as the after image.
    pub fn upsert(row: Row) -> Self {
        Self {
            old: None,
            new: Some(row),
        }
    }

    /// A deletion: the after image is absent.
    pub fn delete() -> Self {
        Self::default()
    }

    /// The after image, unless it is the empty sentinel. An absent `new`
    /// member and an empty `new` object both mean the row is gone.
    pub fn after(&self) -> Option<&Row> {
        self.new.as_ref().filter(|row| !row.is_empty())
    }

    pub fn is_delete(&self) -> bool {
        self.after().is_none()
    }
}

/// Row changes for a single table, keyed by row uuid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdate(pub HashMap<Uuid, RowUpdate>);

impl TableUpdate {
    pub fn rows(&self) -> impl Iterator<Item = (&Uuid, &RowUpdate)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One atomic batch of remote-side changes across any number of tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableUpdates(pub HashMap<String, TableUpdate>);

impl TableUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change to `uuid` in `table`, replacing any earlier
    /// change for the same row in this batch.
    pub fn push(&mut self, table: &str, uuid: Uuid, update: RowUpdate) -> &mut Self {
        self.0
            .entry(table.to_owned())
            .or_default()
            .0
            .insert(uuid, update);
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &TableUpdate)> {
        self.0.iter()
    }

    /// Total number of row changes across all tables.
    pub fn row_count(&self) -> usize {
        self.0.values().map(TableUpdate::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(TableUpdate::is_empty)
    }
}

impl IntoIterator for TableUpdates {
    type Item = (String, TableUpdate);
    type IntoIter = std::collections::hash_map::IntoIter<String, TableUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_monitor_reply_shape() {
        let raw = json!({
            "Bridge": {
                "2a4c3eb1-0d05-4bc9-8f0a-6c2b1e1f3c11": {
                    "new": { "name": "br0", "ports": ["set", []] }
                },
                "5e0f40e9-8c59-4b3a-9d3b-7c2a3f4a1d22": {
                    "old": { "name": "br-old" }
                }
            }
        });

        let updates: TableUpdates = serde_json::from_value(raw).unwrap();
        assert_eq!(updates.row_count(), 2);

        let bridge = &updates.0["Bridge"];
        let live = &bridge.0[&Uuid::parse_str("2a4c3eb1-0d05-4bc9-8f0a-6c2b1e1f3c11").unwrap()];
        assert_eq!(live.after().unwrap().get("name"), Some(&json!("br0")));

        let gone = &bridge.0[&Uuid::parse_str("5e0f40e9-8c59-4b3a-9d3b-7c2a3f4a1d22").unwrap()];
        assert!(gone.is_delete());
    }

    #[test]
    fn empty_new_object_is_a_delete() {
        let update = RowUpdate {
            old: Some(Row::new().with("name", json!("p1"))),
            new: Some(Row::new()),
        };
        assert!(update.is_delete());
    }

    #[test]
    fn push_replaces_earlier_change_for_same_row() {
        let id = Uuid::new_v4();
        let mut batch = TableUpdates::new();
        batch.push("Port", id, RowUpdate::upsert(Row::new().with("name", json!("a"))));
        batch.push("Port", id, RowUpdate::delete());
        assert_eq!(batch.row_count(), 1);
        assert!(batch.0["Port"].0[&id].is_delete());
    }
}
