// ── Runtime connection configuration ──
//
// These types describe *how* to reach a database server. They never touch
// disk: consumers (or `ovsync-config`) construct a `ClientConfig` and hand
// it in.

use std::time::Duration;

use ovsync_api::{Endpoint, TransportConfig, TransportKind};

use crate::error::CoreError;

/// Name of the database holding the switch configuration.
pub const DEFAULT_DATABASE: &str = "Open_vSwitch";

/// Configuration for one database connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Where the server listens.
    pub endpoint: Endpoint,
    /// Database to monitor and transact against.
    pub database: String,
    /// Socket establishment bound.
    pub connect_timeout: Duration,
    /// Per-request bound. `None` waits as long as the connection lives.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Build a config from a transport kind name (`"tcp"` or `"unix"`) and
    /// a raw endpoint. An empty endpoint selects the transport's default.
    pub fn from_parts(transport: &str, endpoint: &str) -> Result<Self, CoreError> {
        let kind: TransportKind = transport.parse().map_err(|_| CoreError::Config {
            message: format!("unknown transport '{transport}', expected 'tcp' or 'unix'"),
        })?;
        let endpoint = Endpoint::resolve(kind, endpoint)?;
        Ok(Self {
            endpoint,
            ..Self::default()
        })
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    /// Two configs address the same database on the same server.
    pub fn same_target(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint && self.database == other.database
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} ({})", self.endpoint, self.database)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            endpoint: Endpoint::default(),
            database: DEFAULT_DATABASE.into(),
            connect_timeout: transport.connect_timeout,
            request_timeout: transport.request_timeout,
        }
    }
}
