// ── Central local mirror ──
//
// Owns the raw row cache and the typed caches. The reconciler is the only
// writer; everything here is a read-only query served without a round trip.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tokio::sync::watch;
use uuid::Uuid;

use ovsync_api::Row;

use super::collection::TypedCollection;
use super::row_cache::RowCache;
use crate::error::CoreError;
use crate::model::{Bridge, Interface, Port, TableKind};
use crate::stream::{EntityStream, EntityWatch};

/// Local mirror of the switch database.
///
/// Each typed cache sits behind its own reader/writer lock; the raw row
/// cache is sharded. Reads take one lock for one lookup and never wait on
/// the network.
pub struct DataStore {
    pub(crate) rows: RowCache,
    pub(crate) bridges: TypedCollection<Bridge>,
    pub(crate) ports: TypedCollection<Port>,
    pub(crate) interfaces: TypedCollection<Interface>,
    pub(crate) last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    /// An empty store with every known table already present.
    pub fn new() -> Self {
        let (last_update, _) = watch::channel(None);
        Self {
            rows: RowCache::with_tables(TableKind::iter().map(TableKind::name)),
            bridges: TypedCollection::new(),
            ports: TypedCollection::new(),
            interfaces: TypedCollection::new(),
            last_update,
        }
    }

    // ── Bridge queries ───────────────────────────────────────────────

    pub fn bridge_exists(&self, name: &str) -> bool {
        self.bridges.by_name(name).is_some()
    }

    pub fn bridge_by_name(&self, name: &str) -> Option<Arc<Bridge>> {
        self.bridges.by_name(name)
    }

    pub fn bridge(&self, uuid: &Uuid) -> Option<Arc<Bridge>> {
        self.bridges.get(uuid)
    }

    pub(crate) fn require_bridge(&self, name: &str) -> Result<Arc<Bridge>, CoreError> {
        self.bridges
            .by_name(name)
            .ok_or_else(|| CoreError::not_found("Bridge", name))
    }

    /// Ports of `bridge` in the order the server recorded them. References
    /// that do not resolve in the port cache are skipped.
    pub fn ports_on_bridge(&self, bridge: &str) -> Result<Vec<Arc<Port>>, CoreError> {
        let bridge = self.require_bridge(bridge)?;
        Ok(self.ports.resolve(&bridge.ports))
    }

    /// Names of the ports attached to `bridge`.
    pub fn find_all_ports_on_bridge(&self, bridge: &str) -> Result<Vec<String>, CoreError> {
        Ok(self
            .ports_on_bridge(bridge)?
            .iter()
            .map(|port| port.name.clone())
            .collect())
    }

    pub fn port_exists_on_bridge(&self, port: &str, bridge: &str) -> Result<bool, CoreError> {
        Ok(self
            .ports_on_bridge(bridge)?
            .iter()
            .any(|p| p.name == port))
    }

    // ── Port queries ─────────────────────────────────────────────────

    pub fn port_by_name(&self, name: &str) -> Option<Arc<Port>> {
        self.ports.by_name(name)
    }

    pub fn port(&self, uuid: &Uuid) -> Option<Arc<Port>> {
        self.ports.get(uuid)
    }

    pub(crate) fn require_port(&self, name: &str) -> Result<Arc<Port>, CoreError> {
        self.ports
            .by_name(name)
            .ok_or_else(|| CoreError::not_found("Port", name))
    }

    /// Interfaces of `port`, skipping unresolvable references.
    pub fn interfaces_on_port(&self, port: &str) -> Result<Vec<Arc<Interface>>, CoreError> {
        let port = self.require_port(port)?;
        Ok(self.interfaces.resolve(&port.interfaces))
    }

    // ── Interface queries ────────────────────────────────────────────

    pub fn interface_by_name(&self, name: &str) -> Option<Arc<Interface>> {
        self.interfaces.by_name(name)
    }

    pub fn interface(&self, uuid: &Uuid) -> Option<Arc<Interface>> {
        self.interfaces.get(uuid)
    }

    pub fn find_statistics_on_interface(
        &self,
        interface: &str,
    ) -> Result<BTreeMap<String, i64>, CoreError> {
        self.interfaces
            .by_name(interface)
            .map(|intf| intf.statistics.clone())
            .ok_or_else(|| CoreError::not_found("Interface", interface))
    }

    // ── Raw rows ─────────────────────────────────────────────────────

    /// Uuid of the single `Open_vSwitch` root row, once it has been seen.
    pub fn root_uuid(&self) -> Option<Uuid> {
        self.rows.any_uuid(TableKind::OpenVSwitch.name())
    }

    pub fn row(&self, table: &str, uuid: &Uuid) -> Option<Row> {
        self.rows.row(table, uuid)
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.rows.table_len(table)
    }

    pub fn tables(&self) -> Vec<String> {
        self.rows.tables()
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn bridges_snapshot(&self) -> Arc<Vec<Arc<Bridge>>> {
        self.bridges.snapshot()
    }

    pub fn ports_snapshot(&self) -> Arc<Vec<Arc<Port>>> {
        self.ports.snapshot()
    }

    pub fn interfaces_snapshot(&self) -> Arc<Vec<Arc<Interface>>> {
        self.interfaces.snapshot()
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_bridges(&self) -> EntityStream<Bridge> {
        EntityStream::new(self.bridges.subscribe())
    }

    pub fn subscribe_ports(&self) -> EntityStream<Port> {
        EntityStream::new(self.ports.subscribe())
    }

    pub fn subscribe_interfaces(&self) -> EntityStream<Interface> {
        EntityStream::new(self.interfaces.subscribe())
    }

    /// Follow one bridge by name. See [`EntityWatch`].
    pub fn watch_bridge(&self, name: &str) -> EntityWatch<Bridge> {
        self.subscribe_bridges().watch(name)
    }

    pub fn watch_port(&self, name: &str) -> EntityWatch<Port> {
        self.subscribe_ports().watch(name)
    }

    pub fn watch_interface(&self, name: &str) -> EntityWatch<Interface> {
        self.subscribe_interfaces().watch(name)
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// When the most recent non-empty batch was applied.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    /// How long ago the last batch was applied, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_update().map(|t| Utc::now() - t)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
