// ── Bridge domain type ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A virtual switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub uuid: Uuid,
    pub name: String,
    /// Port references in the order the server recorded them.
    pub ports: Vec<Uuid>,
    pub controllers: Vec<Uuid>,
    /// `"standalone"` or `"secure"` when set.
    pub fail_mode: Option<String>,
    /// Empty means the default (`"system"`) datapath.
    pub datapath_type: String,
    pub datapath_id: Option<String>,
    pub stp_enable: bool,
    pub external_ids: BTreeMap<String, String>,
}

impl Bridge {
    pub fn has_port(&self, port: Uuid) -> bool {
        self.ports.contains(&port)
    }
}

impl super::Entity for Bridge {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }
}
