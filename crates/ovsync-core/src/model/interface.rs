// ── Interface domain type ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Interface `type` column. An empty string on the wire means `System`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum InterfaceType {
    System,
    Internal,
    Patch,
    Other(String),
}

impl InterfaceType {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "" | "system" => Self::System,
            "internal" => Self::Internal,
            "patch" => Self::Patch,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Value written to the `type` column.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::System => "",
            Self::Internal => "internal",
            Self::Patch => "patch",
            Self::Other(raw) => raw,
        }
    }
}

/// Administrative or operational state reported by the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
}

/// A network device attached to a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub uuid: Uuid,
    pub name: String,
    pub kind: InterfaceType,
    pub options: BTreeMap<String, String>,
    /// OpenFlow port number, assigned by the switch. `-1` signals failure.
    pub ofport: Option<i64>,
    pub mac_in_use: Option<String>,
    pub admin_state: Option<LinkState>,
    pub link_state: Option<LinkState>,
    /// Counter name to value (`rx_packets`, `tx_bytes`, ...).
    pub statistics: BTreeMap<String, i64>,
    pub external_ids: BTreeMap<String, String>,
}

impl Interface {
    /// Peer name of a patch interface.
    pub fn patch_peer(&self) -> Option<&str> {
        match self.kind {
            InterfaceType::Patch => self.options.get("peer").map(String::as_str),
            _ => None,
        }
    }
}

impl super::Entity for Interface {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }
}
