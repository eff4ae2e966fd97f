// ── Row-to-domain type conversions ──
//
// Decodes raw `ovsync_api::Row` images into the typed `model` entities.
// `name` is the only required column; any other known column that is absent
// decodes to its empty value, so rows monitored with a column subset still
// produce entities. A column that is present but malformed fails the whole
// row.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use ovsync_api::{Row, ValueError, value};

use crate::model::{
    Bridge, Entity, Interface, InterfaceType, LinkState, Port, TypedKind, VlanMode,
};

/// Highest valid 802.1Q VLAN id.
pub(crate) const MAX_VLAN: i64 = 4095;

/// A raw row that could not be turned into its typed entity.
#[derive(Debug, Error)]
#[error("cannot decode {kind} {uuid}: column '{column}' {failure}")]
pub struct DecodeError {
    pub kind: TypedKind,
    pub uuid: Uuid,
    pub column: &'static str,
    pub failure: DecodeFailure,
}

#[derive(Debug, Error)]
pub enum DecodeFailure {
    #[error("is missing")]
    Missing,
    #[error("is malformed: {0}")]
    Value(#[from] ValueError),
    #[error("holds {value}, outside {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("holds unknown value '{0}'")]
    Unknown(String),
}

/// One decoded row, tagged by entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedRow {
    Bridge(Bridge),
    Port(Port),
    Interface(Interface),
}

impl TypedRow {
    pub fn decode(kind: TypedKind, uuid: Uuid, row: &Row) -> Result<Self, DecodeError> {
        let columns = Columns { kind, uuid, row };
        Ok(match kind {
            TypedKind::Bridge => Self::Bridge(decode_bridge(&columns)?),
            TypedKind::Port => Self::Port(decode_port(&columns)?),
            TypedKind::Interface => Self::Interface(decode_interface(&columns)?),
        })
    }

    pub fn kind(&self) -> TypedKind {
        match self {
            Self::Bridge(_) => TypedKind::Bridge,
            Self::Port(_) => TypedKind::Port,
            Self::Interface(_) => TypedKind::Interface,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Bridge(b) => b.uuid,
            Self::Port(p) => p.uuid,
            Self::Interface(i) => i.uuid,
        }
    }
}

/// Typed entities that can be taken back out of a [`TypedRow`].
pub(crate) trait FromTypedRow: Entity {
    const KIND: TypedKind;

    fn from_typed(row: TypedRow) -> Option<Self>;
}

impl FromTypedRow for Bridge {
    const KIND: TypedKind = TypedKind::Bridge;

    fn from_typed(row: TypedRow) -> Option<Self> {
        match row {
            TypedRow::Bridge(bridge) => Some(bridge),
            _ => None,
        }
    }
}

impl FromTypedRow for Port {
    const KIND: TypedKind = TypedKind::Port;

    fn from_typed(row: TypedRow) -> Option<Self> {
        match row {
            TypedRow::Port(port) => Some(port),
            _ => None,
        }
    }
}

impl FromTypedRow for Interface {
    const KIND: TypedKind = TypedKind::Interface;

    fn from_typed(row: TypedRow) -> Option<Self> {
        match row {
            TypedRow::Interface(intf) => Some(intf),
            _ => None,
        }
    }
}

// ── Column access ──────────────────────────────────────────────────

struct Columns<'a> {
    kind: TypedKind,
    uuid: Uuid,
    row: &'a Row,
}

impl<'a> Columns<'a> {
    fn fail(&self, column: &'static str, failure: impl Into<DecodeFailure>) -> DecodeError {
        DecodeError {
            kind: self.kind,
            uuid: self.uuid,
            column,
            failure: failure.into(),
        }
    }

    /// Decode a present column, or fall back to `T::default()` when absent.
    fn or_default<T, F>(&self, column: &'static str, decode: F) -> Result<T, DecodeError>
    where
        T: Default,
        F: FnOnce(&'a Value) -> Result<T, DecodeFailure>,
    {
        match self.row.get(column) {
            Some(raw) => decode(raw).map_err(|f| self.fail(column, f)),
            None => Ok(T::default()),
        }
    }

    fn required_str(&self, column: &'static str) -> Result<String, DecodeError> {
        let raw = self
            .row
            .get(column)
            .ok_or_else(|| self.fail(column, DecodeFailure::Missing))?;
        value::as_str(raw)
            .map(str::to_owned)
            .map_err(|e| self.fail(column, e))
    }

    fn string(&self, column: &'static str) -> Result<String, DecodeError> {
        self.or_default(column, |v| Ok(value::as_str(v)?.to_owned()))
    }

    fn optional_string(&self, column: &'static str) -> Result<Option<String>, DecodeError> {
        self.or_default(column, |v| {
            Ok(value::as_optional(v)?
                .map(value::as_str)
                .transpose()?
                .map(str::to_owned))
        })
    }

    fn optional_integer(&self, column: &'static str) -> Result<Option<i64>, DecodeError> {
        self.or_default(column, |v| Ok(value::as_optional(v)?.map(value::as_integer).transpose()?))
    }

    fn bool(&self, column: &'static str) -> Result<bool, DecodeError> {
        self.or_default(column, |v| Ok(value::as_bool(v)?))
    }

    fn uuids(&self, column: &'static str) -> Result<Vec<Uuid>, DecodeError> {
        self.or_default(column, |v| Ok(value::as_uuid_set(v)?))
    }

    fn string_map(&self, column: &'static str) -> Result<BTreeMap<String, String>, DecodeError> {
        self.or_default(column, |v| Ok(value::as_string_map(v)?))
    }

    fn integer_map(&self, column: &'static str) -> Result<BTreeMap<String, i64>, DecodeError> {
        self.or_default(column, |v| Ok(value::as_integer_map(v)?))
    }

    fn parsed<T: std::str::FromStr>(&self, column: &'static str) -> Result<Option<T>, DecodeError> {
        self.optional_string(column)?
            .map(|raw| {
                raw.parse()
                    .map_err(|_| self.fail(column, DecodeFailure::Unknown(raw.clone())))
            })
            .transpose()
    }
}

fn vlan(raw: &Value) -> Result<u16, DecodeFailure> {
    let id = value::as_integer(raw)?;
    if (0..=MAX_VLAN).contains(&id) {
        u16::try_from(id).map_err(|_| out_of_range(id))
    } else {
        Err(out_of_range(id))
    }
}

fn out_of_range(value: i64) -> DecodeFailure {
    DecodeFailure::OutOfRange {
        value,
        min: 0,
        max: MAX_VLAN,
    }
}

// ── Entities ───────────────────────────────────────────────────────

fn decode_bridge(c: &Columns<'_>) -> Result<Bridge, DecodeError> {
    Ok(Bridge {
        uuid: c.uuid,
        name: c.required_str("name")?,
        ports: c.uuids("ports")?,
        controllers: c.uuids("controller")?,
        fail_mode: c.optional_string("fail_mode")?,
        datapath_type: c.string("datapath_type")?,
        datapath_id: c.optional_string("datapath_id")?,
        stp_enable: c.bool("stp_enable")?,
        external_ids: c.string_map("external_ids")?,
    })
}

fn decode_port(c: &Columns<'_>) -> Result<Port, DecodeError> {
    let tag = c.or_default("tag", |v| value::as_optional(v)?.map(vlan).transpose())?;
    let trunks = c.or_default("trunks", |v| {
        value::as_set(v)?.into_iter().map(vlan).collect::<Result<Vec<_>, _>>()
    })?;

    Ok(Port {
        uuid: c.uuid,
        name: c.required_str("name")?,
        interfaces: c.uuids("interfaces")?,
        tag,
        trunks,
        vlan_mode: c.parsed::<VlanMode>("vlan_mode")?,
        external_ids: c.string_map("external_ids")?,
    })
}

fn decode_interface(c: &Columns<'_>) -> Result<Interface, DecodeError> {
    Ok(Interface {
        uuid: c.uuid,
        name: c.required_str("name")?,
        kind: InterfaceType::from_wire(&c.string("type")?),
        options: c.string_map("options")?,
        ofport: c.optional_integer("ofport")?,
        mac_in_use: c.optional_string("mac_in_use")?,
        admin_state: c.parsed::<LinkState>("admin_state")?,
        link_state: c.parsed::<LinkState>("link_state")?,
        statistics: c.integer_map("statistics")?,
        external_ids: c.string_map("external_ids")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const BR0: &str = "2a4c3eb1-0d05-4bc9-8f0a-6c2b1e1f3c11";
    const P1: &str = "8f5a0c4e-5d6b-4fd1-9f64-2b3c3f3b8a01";
    const P2: &str = "0b9c3a52-12f4-4c43-8d8a-6f0f7f52b702";

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn id(raw: &str) -> Uuid {
        Uuid::parse_str(raw).unwrap()
    }

    #[test]
    fn decodes_full_bridge_row() {
        let raw = row(json!({
            "name": "br0",
            "ports": ["set", [["uuid", P2], ["uuid", P1]]],
            "controller": ["set", []],
            "fail_mode": "secure",
            "datapath_type": "netdev",
            "datapath_id": "0000aabbccddeeff",
            "stp_enable": false,
            "external_ids": ["map", [["owner", "ovsync"]]]
        }));

        let TypedRow::Bridge(bridge) = TypedRow::decode(TypedKind::Bridge, id(BR0), &raw).unwrap()
        else {
            panic!("expected a bridge");
        };
        assert_eq!(bridge.name, "br0");
        assert_eq!(bridge.ports, vec![id(P2), id(P1)]);
        assert!(bridge.controllers.is_empty());
        assert_eq!(bridge.fail_mode.as_deref(), Some("secure"));
        assert_eq!(bridge.datapath_type, "netdev");
        assert_eq!(bridge.external_ids["owner"], "ovsync");
    }

    #[test]
    fn single_port_reference_is_bare_atom() {
        let raw = row(json!({ "name": "br0", "ports": ["uuid", P1] }));
        let TypedRow::Bridge(bridge) = TypedRow::decode(TypedKind::Bridge, id(BR0), &raw).unwrap()
        else {
            panic!("expected a bridge");
        };
        assert_eq!(bridge.ports, vec![id(P1)]);
        assert_eq!(bridge.fail_mode, None);
    }

    #[test]
    fn decodes_port_vlan_columns() {
        let raw = row(json!({
            "name": "vnet0",
            "interfaces": ["uuid", P2],
            "tag": 100,
            "trunks": ["set", [10, 20]],
            "vlan_mode": "native-untagged"
        }));
        let TypedRow::Port(port) = TypedRow::decode(TypedKind::Port, id(P1), &raw).unwrap() else {
            panic!("expected a port");
        };
        assert_eq!(port.tag, Some(100));
        assert_eq!(port.trunks, vec![10, 20]);
        assert_eq!(port.vlan_mode, Some(VlanMode::NativeUntagged));
        assert_eq!(port.interfaces, vec![id(P2)]);
    }

    #[test]
    fn empty_tag_is_untagged() {
        let raw = row(json!({ "name": "vnet0", "tag": ["set", []] }));
        let TypedRow::Port(port) = TypedRow::decode(TypedKind::Port, id(P1), &raw).unwrap() else {
            panic!("expected a port");
        };
        assert_eq!(port.tag, None);
    }

    #[test]
    fn out_of_range_tag_fails() {
        let raw = row(json!({ "name": "vnet0", "tag": 5000 }));
        let err = TypedRow::decode(TypedKind::Port, id(P1), &raw).unwrap_err();
        assert_eq!(err.column, "tag");
        assert!(matches!(err.failure, DecodeFailure::OutOfRange { value: 5000, .. }));
    }

    #[test]
    fn decodes_interface_statistics() {
        let raw = row(json!({
            "name": "patch-br1",
            "type": "patch",
            "options": ["map", [["peer", "patch-br0"]]],
            "ofport": 3,
            "link_state": "up",
            "statistics": ["map", [["rx_packets", 12], ["tx_bytes", 4096]]]
        }));
        let TypedRow::Interface(intf) =
            TypedRow::decode(TypedKind::Interface, id(P2), &raw).unwrap()
        else {
            panic!("expected an interface");
        };
        assert_eq!(intf.kind, InterfaceType::Patch);
        assert_eq!(intf.patch_peer(), Some("patch-br0"));
        assert_eq!(intf.ofport, Some(3));
        assert_eq!(intf.link_state, Some(LinkState::Up));
        assert_eq!(intf.statistics["tx_bytes"], 4096);
    }

    #[test]
    fn missing_name_fails() {
        let raw = row(json!({ "ports": ["set", []] }));
        let err = TypedRow::decode(TypedKind::Bridge, id(BR0), &raw).unwrap_err();
        assert_eq!(err.column, "name");
        assert!(matches!(err.failure, DecodeFailure::Missing));
    }

    #[test]
    fn malformed_reference_fails() {
        let raw = row(json!({ "name": "br0", "ports": ["set", [["uuid", "bogus"]]] }));
        let err = TypedRow::decode(TypedKind::Bridge, id(BR0), &raw).unwrap_err();
        assert_eq!(err.column, "ports");
        assert!(err.to_string().starts_with("cannot decode bridge"));
    }

    #[test]
    fn unknown_link_state_fails() {
        let raw = row(json!({ "name": "eth0", "link_state": "sideways" }));
        let err = TypedRow::decode(TypedKind::Interface, id(P2), &raw).unwrap_err();
        assert!(matches!(err.failure, DecodeFailure::Unknown(ref s) if s == "sideways"));
    }
}
