//! OVSDB value notation (RFC 7047 §5.1).
//!
//! On the wire every column value is plain JSON, but compound values are
//! tagged arrays: `["uuid", "..."]`, `["named-uuid", "..."]`,
//! `["set", [...]]` and `["map", [[k, v], ...]]`. A set with exactly one
//! element may be sent as the bare atom instead. The helpers here build
//! and take apart those forms so neither the cache nor the command layer
//! has to know the encoding.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ValueError;

// ── Builders ────────────────────────────────────────────────────────

/// `["uuid", "<uuid>"]`
pub fn uuid(id: Uuid) -> Value {
    json!(["uuid", id.to_string()])
}

/// `["named-uuid", "<name>"]`, a reference to a row inserted earlier in
/// the same transaction.
pub fn named_uuid(name: &str) -> Value {
    json!(["named-uuid", name])
}

/// `["set", [...]]`
pub fn set<I>(elements: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    json!(["set", elements.into_iter().collect::<Vec<_>>()])
}

/// The empty set, used to clear optional columns.
pub fn empty_set() -> Value {
    json!(["set", []])
}

/// `["map", [[k, v], ...]]` from string pairs.
pub fn string_map<'a, I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let entries: Vec<Value> = pairs.into_iter().map(|(k, v)| json!([k, v])).collect();
    json!(["map", entries])
}

// ── Decoders ────────────────────────────────────────────────────────

fn tagged(value: &Value) -> Option<(&str, &Value)> {
    match value.as_array()?.as_slice() {
        [Value::String(tag), payload] => Some((tag.as_str(), payload)),
        _ => None,
    }
}

/// Decode a `["uuid", ...]` atom.
pub fn as_uuid(value: &Value) -> Result<Uuid, ValueError> {
    match tagged(value) {
        Some(("uuid", Value::String(raw))) => {
            Uuid::parse_str(raw).map_err(|_| ValueError::new("a valid uuid", value))
        }
        _ => Err(ValueError::new("a uuid atom", value)),
    }
}

/// The elements of a set, accepting the bare-atom shorthand for a
/// single-element set.
pub fn as_set(value: &Value) -> Result<Vec<&Value>, ValueError> {
    match tagged(value) {
        Some(("set", Value::Array(elements))) => Ok(elements.iter().collect()),
        Some(("set", _)) => Err(ValueError::new("a set", value)),
        Some(("map", _)) => Err(ValueError::new("a set or atom", value)),
        _ => Ok(vec![value]),
    }
}

/// An optional column: a set holding zero or one element.
pub fn as_optional(value: &Value) -> Result<Option<&Value>, ValueError> {
    let elements = as_set(value)?;
    match elements.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        _ => Err(ValueError::new("a set of at most one element", value)),
    }
}

/// A set of uuid references, in the order the server recorded them.
pub fn as_uuid_set(value: &Value) -> Result<Vec<Uuid>, ValueError> {
    as_set(value)?.into_iter().map(as_uuid).collect()
}

/// The entries of a `["map", ...]` value, in wire order.
pub fn as_map(value: &Value) -> Result<Vec<(&Value, &Value)>, ValueError> {
    let Some(("map", Value::Array(entries))) = tagged(value) else {
        return Err(ValueError::new("a map", value));
    };
    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([k, v]) => Ok((k, v)),
            _ => Err(ValueError::new("a [key, value] pair", entry)),
        })
        .collect()
}

/// A map with string keys and string values.
pub fn as_string_map(value: &Value) -> Result<BTreeMap<String, String>, ValueError> {
    as_map(value)?
        .into_iter()
        .map(|(k, v)| Ok((as_str(k)?.to_owned(), as_str(v)?.to_owned())))
        .collect()
}

/// A map with string keys and integer values (e.g. interface statistics).
pub fn as_integer_map(value: &Value) -> Result<BTreeMap<String, i64>, ValueError> {
    as_map(value)?
        .into_iter()
        .map(|(k, v)| Ok((as_str(k)?.to_owned(), as_integer(v)?)))
        .collect()
}

/// A string atom.
pub fn as_str(value: &Value) -> Result<&str, ValueError> {
    value
        .as_str()
        .ok_or_else(|| ValueError::new("a string atom", value))
}

/// An integer atom.
pub fn as_integer(value: &Value) -> Result<i64, ValueError> {
    value
        .as_i64()
        .ok_or_else(|| ValueError::new("an integer atom", value))
}

/// A boolean atom.
pub fn as_bool(value: &Value) -> Result<bool, ValueError> {
    value
        .as_bool()
        .ok_or_else(|| ValueError::new("a boolean atom", value))
}
