// Transaction operations and their results (RFC 7047 §5.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::update::Row;
use crate::value;

/// One operation inside a `transact` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        row: Row,
        #[serde(rename = "uuid-name", default, skip_serializing_if = "Option::is_none")]
        uuid_name: Option<String>,
    },
    Update {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
    },
    Select {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },
}

impl Operation {
    pub fn insert(table: &str, row: Row) -> Self {
        Self::Insert {
            table: table.to_owned(),
            row,
            uuid_name: None,
        }
    }

    /// An insert whose new row can be referenced later in the same
    /// transaction as `["named-uuid", name]`.
    pub fn insert_named(table: &str, row: Row, uuid_name: &str) -> Self {
        Self::Insert {
            table: table.to_owned(),
            row,
            uuid_name: Some(uuid_name.to_owned()),
        }
    }

    pub fn update(table: &str, conditions: Vec<Condition>, row: Row) -> Self {
        Self::Update {
            table: table.to_owned(),
            conditions,
            row,
        }
    }

    pub fn mutate(table: &str, conditions: Vec<Condition>, mutations: Vec<Mutation>) -> Self {
        Self::Mutate {
            table: table.to_owned(),
            conditions,
            mutations,
        }
    }

    pub fn delete(table: &str, conditions: Vec<Condition>) -> Self {
        Self::Delete {
            table: table.to_owned(),
            conditions,
        }
    }

    pub fn select(table: &str, conditions: Vec<Condition>) -> Self {
        Self::Select {
            table: table.to_owned(),
            conditions,
            columns: None,
        }
    }

    /// Wire name of the operation (`"insert"`, `"mutate"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Mutate { .. } => "mutate",
            Self::Delete { .. } => "delete",
            Self::Select { .. } => "select",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Mutate { table, .. }
            | Self::Delete { table, .. }
            | Self::Select { table, .. } => table,
        }
    }
}

/// Comparison function of a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "excludes")]
    Excludes,
}

/// `[column, function, value]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition(pub String, pub Function, pub Value);

impl Condition {
    pub fn eq(column: &str, value: Value) -> Self {
        Self(column.to_owned(), Function::Eq, value)
    }

    /// Match a row by its `_uuid` column.
    pub fn uuid_is(id: Uuid) -> Self {
        Self::eq("_uuid", value::uuid(id))
    }

    /// Match a row by its `name` column.
    pub fn name_is(name: &str) -> Self {
        Self::eq("name", Value::String(name.to_owned()))
    }
}

/// Mutator of a `mutate` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutator {
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Subtract,
    #[serde(rename = "*=")]
    Multiply,
    #[serde(rename = "/=")]
    Divide,
    #[serde(rename = "%=")]
    Modulo,
    #[serde(rename = "insert")]
    Insert,
    #[serde(rename = "delete")]
    Delete,
}

/// `[column, mutator, value]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation(pub String, pub Mutator, pub Value);

impl Mutation {
    /// Add elements to a set or map column.
    pub fn insert(column: &str, value: Value) -> Self {
        Self(column.to_owned(), Mutator::Insert, value)
    }

    /// Remove elements from a set or map column.
    pub fn delete(column: &str, value: Value) -> Self {
        Self(column.to_owned(), Mutator::Delete, value)
    }
}

/// The server's reply to a single operation.
///
/// A transaction reply carries one of these per submitted operation; when
/// the commit itself fails the server appends one more carrying only the
/// error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OperationResult {
    /// An error reply. An empty error string counts as no error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// The uuid of a row created by an `insert`.
    pub fn inserted_uuid(&self) -> Option<Uuid> {
        self.uuid.as_ref().and_then(|v| value::as_uuid(v).ok())
    }
}
