// ── Typed request structs for Command payloads ──

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── VLAN ───────────────────────────────────────────────────────────

/// An 802.1Q VLAN id usable as a port tag (1..=4095).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanTag(u16);

impl VlanTag {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4095;

    pub fn new(id: u16) -> Result<Self, CoreError> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(Self(id))
        } else {
            Err(CoreError::ValidationFailed {
                message: format!(
                    "VLAN tag {id} is outside {}..={}",
                    Self::MIN,
                    Self::MAX
                ),
            })
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for VlanTag {
    type Error = CoreError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<VlanTag> for u16 {
    fn from(tag: VlanTag) -> Self {
        tag.0
    }
}

impl fmt::Display for VlanTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Port ───────────────────────────────────────────────────────────

/// What backs a newly created port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PortKind {
    /// A switch-internal network device.
    Internal,
    /// An existing kernel device (e.g. one end of a veth pair).
    Veth,
    /// One end of a patch link to another bridge.
    Patch { peer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePortRequest {
    pub bridge: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: PortKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<VlanTag>,
}

impl CreatePortRequest {
    pub fn internal(bridge: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(bridge, name, PortKind::Internal)
    }

    pub fn veth(bridge: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(bridge, name, PortKind::Veth)
    }

    pub fn patch(
        bridge: impl Into<String>,
        name: impl Into<String>,
        peer: impl Into<String>,
    ) -> Self {
        Self::new(bridge, name, PortKind::Patch { peer: peer.into() })
    }

    /// Set the access VLAN.
    #[must_use]
    pub fn with_tag(mut self, tag: VlanTag) -> Self {
        self.tag = Some(tag);
        self
    }

    fn new(bridge: impl Into<String>, name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            bridge: bridge.into(),
            name: name.into(),
            kind,
            tag: None,
        }
    }
}
