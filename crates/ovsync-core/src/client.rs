// ── Client abstraction ──
//
// Full lifecycle management for one database connection: initial fetch,
// background update application, command routing, and the query surface
// served from the DataStore.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ovsync_api::{Operation, OperationResult, Ovsdb, OvsdbClient, TableUpdates};

use crate::command::{Command, CommandEnvelope, CommandResult, CreatePortRequest, VlanTag, ops};
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::executor::TransactionExecutor;
use crate::model::{Bridge, Interface, Port};
use crate::store::DataStore;
use crate::stream::{EntityStream, EntityWatch};

const COMMAND_CHANNEL_SIZE: usize = 64;
const MONITOR_ID: &str = "ovsync";

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// The update stream ended or the client was shut down. The cache
    /// keeps its last contents but no longer follows the server.
    Disconnected,
}

// ── Client ───────────────────────────────────────────────────────

/// A live connection with its local mirror.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Reads are answered from the
/// cache; mutations are serialized through one command processor task and
/// become visible in the cache once the server's next update arrives.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    store: Arc<DataStore>,
    executor: TransactionExecutor,
    connection_state: watch::Sender<ConnectionState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Open a socket to `config.endpoint` and connect over it.
    pub async fn connect(config: ClientConfig) -> Result<Self, CoreError> {
        let conn = OvsdbClient::connect(&config.endpoint, &config.transport()).await?;
        Self::connect_with(config, Arc::new(conn)).await
    }

    /// Connect over an already established database connection.
    ///
    /// Fetches every table, reconciles the result into a fresh DataStore,
    /// and spawns the update and command processor tasks.
    pub async fn connect_with(
        config: ClientConfig,
        conn: Arc<dyn Ovsdb>,
    ) -> Result<Self, CoreError> {
        // Claim the update stream before monitoring so no notification
        // sent after the initial reply can be missed.
        let updates = conn.take_updates().ok_or_else(|| {
            CoreError::Internal("update stream already claimed by another client".into())
        })?;

        let store = Arc::new(DataStore::new());
        let initial = conn.monitor_all(&config.database, json!(MONITOR_ID)).await?;
        let summary = store.apply_batch(&initial);

        let executor = TransactionExecutor::new(Arc::clone(&conn), config.database.clone());
        let (connection_state, _) = watch::channel(ConnectionState::Connected);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let handles = vec![
            tokio::spawn(update_task(
                Arc::clone(&store),
                updates,
                connection_state.clone(),
                cancel.clone(),
            )),
            tokio::spawn(command_processor_task(
                Arc::clone(&store),
                executor.clone(),
                command_rx,
                cancel.clone(),
            )),
        ];

        info!(
            database = %config.describe(),
            rows = summary.upserted,
            bridges = store.bridge_count(),
            ports = store.port_count(),
            "connected to database"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                executor,
                connection_state,
                command_tx,
                cancel,
                task_handles: Mutex::new(handles),
            }),
        })
    }

    /// Access the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Access the underlying DataStore.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// Stop following the server. Cancels the background tasks and waits
    /// for them to finish; the cache keeps its last contents.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("client shut down");
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Connected
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command against the database.
    ///
    /// Sends the command through the internal channel to the command
    /// processor task and awaits the result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::NotConnected)?;

        rx.await.map_err(|_| CoreError::NotConnected)?
    }

    /// Run a caller-built operation list as one transaction, bypassing the
    /// command layer.
    pub async fn transact(
        &self,
        operations: &[Operation],
        action: &str,
    ) -> Result<Vec<OperationResult>, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        self.inner.executor.execute(operations, action).await
    }

    // ── Mutation convenience ─────────────────────────────────────

    pub async fn create_bridge(&self, name: &str) -> Result<CommandResult, CoreError> {
        self.execute(Command::CreateBridge { name: name.into() })
            .await
    }

    pub async fn delete_bridge(&self, name: &str) -> Result<CommandResult, CoreError> {
        self.execute(Command::DeleteBridge { name: name.into() })
            .await
    }

    pub async fn update_bridge_controller(
        &self,
        bridge: &str,
        target: &str,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::UpdateBridgeController {
            bridge: bridge.into(),
            target: target.into(),
        })
        .await
    }

    pub async fn create_internal_port(
        &self,
        bridge: &str,
        port: &str,
        tag: Option<u16>,
    ) -> Result<CommandResult, CoreError> {
        let request = with_optional_tag(CreatePortRequest::internal(bridge, port), tag)?;
        self.execute(Command::CreatePort(request)).await
    }

    pub async fn create_veth_port(
        &self,
        bridge: &str,
        port: &str,
        tag: Option<u16>,
    ) -> Result<CommandResult, CoreError> {
        let request = with_optional_tag(CreatePortRequest::veth(bridge, port), tag)?;
        self.execute(Command::CreatePort(request)).await
    }

    pub async fn create_patch_port(
        &self,
        bridge: &str,
        port: &str,
        peer: &str,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::CreatePort(CreatePortRequest::patch(bridge, port, peer)))
            .await
    }

    pub async fn delete_port(&self, bridge: &str, port: &str) -> Result<CommandResult, CoreError> {
        self.execute(Command::DeletePort {
            bridge: bridge.into(),
            port: port.into(),
        })
        .await
    }

    /// Set a port's access VLAN, or clear it with `None`.
    pub async fn update_port_tag(
        &self,
        bridge: &str,
        port: &str,
        tag: Option<u16>,
    ) -> Result<CommandResult, CoreError> {
        let tag = tag.map(VlanTag::new).transpose()?;
        self.execute(Command::UpdatePortTag {
            bridge: bridge.into(),
            port: port.into(),
            tag,
        })
        .await
    }

    pub async fn remove_interface_from_port(
        &self,
        port: &str,
        interface: Uuid,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::RemoveInterfaceFromPort {
            port: port.into(),
            interface,
        })
        .await
    }

    // ── Queries (delegate to DataStore) ──────────────────────────

    pub fn bridge_exists(&self, name: &str) -> bool {
        self.inner.store.bridge_exists(name)
    }

    pub fn find_all_ports_on_bridge(&self, bridge: &str) -> Result<Vec<String>, CoreError> {
        self.inner.store.find_all_ports_on_bridge(bridge)
    }

    pub fn port_exists_on_bridge(&self, port: &str, bridge: &str) -> Result<bool, CoreError> {
        self.inner.store.port_exists_on_bridge(port, bridge)
    }

    pub fn find_statistics_on_interface(
        &self,
        interface: &str,
    ) -> Result<BTreeMap<String, i64>, CoreError> {
        self.inner.store.find_statistics_on_interface(interface)
    }

    pub fn interfaces_on_port(&self, port: &str) -> Result<Vec<Arc<Interface>>, CoreError> {
        self.inner.store.interfaces_on_port(port)
    }

    pub fn root_uuid(&self) -> Option<Uuid> {
        self.inner.store.root_uuid()
    }

    // ── Snapshot accessors (delegate to DataStore) ───────────────

    pub fn bridges_snapshot(&self) -> Arc<Vec<Arc<Bridge>>> {
        self.inner.store.bridges_snapshot()
    }

    pub fn ports_snapshot(&self) -> Arc<Vec<Arc<Port>>> {
        self.inner.store.ports_snapshot()
    }

    pub fn interfaces_snapshot(&self) -> Arc<Vec<Arc<Interface>>> {
        self.inner.store.interfaces_snapshot()
    }

    // ── Stream accessors (delegate to DataStore) ─────────────────

    pub fn bridges(&self) -> EntityStream<Bridge> {
        self.inner.store.subscribe_bridges()
    }

    pub fn ports(&self) -> EntityStream<Port> {
        self.inner.store.subscribe_ports()
    }

    pub fn interfaces(&self) -> EntityStream<Interface> {
        self.inner.store.subscribe_interfaces()
    }

    pub fn watch_bridge(&self, name: &str) -> EntityWatch<Bridge> {
        self.inner.store.watch_bridge(name)
    }

    pub fn watch_port(&self, name: &str) -> EntityWatch<Port> {
        self.inner.store.watch_port(name)
    }

    pub fn watch_interface(&self, name: &str) -> EntityWatch<Interface> {
        self.inner.store.watch_interface(name)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("connection_state", &*self.inner.connection_state.borrow())
            .finish_non_exhaustive()
    }
}

fn with_optional_tag(
    request: CreatePortRequest,
    tag: Option<u16>,
) -> Result<CreatePortRequest, CoreError> {
    Ok(match tag {
        Some(id) => request.with_tag(VlanTag::new(id)?),
        None => request,
    })
}

// ── ClientContext ────────────────────────────────────────────────

enum ContextState {
    Unconnected,
    Connected(Client),
}

/// Owner of at most one [`Client`].
///
/// The first successful `get_client` connects; later calls for the same
/// endpoint and database return that same handle. Asking for a different
/// target while connected is an error.
pub struct ClientContext {
    state: Mutex<ContextState>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContextState::Unconnected),
        }
    }

    /// Connect on first use, then hand out the shared client.
    pub async fn get_client(&self, config: ClientConfig) -> Result<Client, CoreError> {
        let mut state = self.state.lock().await;
        if let ContextState::Connected(client) = &*state {
            return reuse(client, &config);
        }

        let client = Client::connect(config).await?;
        *state = ContextState::Connected(client.clone());
        Ok(client)
    }

    /// Like [`get_client`](Self::get_client), but connects over `conn`
    /// instead of opening a socket.
    pub async fn get_client_with(
        &self,
        config: ClientConfig,
        conn: Arc<dyn Ovsdb>,
    ) -> Result<Client, CoreError> {
        let mut state = self.state.lock().await;
        if let ContextState::Connected(client) = &*state {
            return reuse(client, &config);
        }

        let client = Client::connect_with(config, conn).await?;
        *state = ContextState::Connected(client.clone());
        Ok(client)
    }

    /// The connected client, if any.
    pub async fn client(&self) -> Option<Client> {
        match &*self.state.lock().await {
            ContextState::Connected(client) => Some(client.clone()),
            ContextState::Unconnected => None,
        }
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}

fn reuse(client: &Client, requested: &ClientConfig) -> Result<Client, CoreError> {
    if client.config().same_target(requested) {
        Ok(client.clone())
    } else {
        Err(CoreError::AlreadyConnected {
            current: client.config().describe(),
            requested: requested.describe(),
        })
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Drain the update stream into the DataStore, one batch at a time, in
/// arrival order.
async fn update_task(
    store: Arc<DataStore>,
    mut updates: mpsc::UnboundedReceiver<TableUpdates>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = updates.recv() => {
                let Some(batch) = batch else {
                    warn!("update stream closed, cache no longer follows the server");
                    connection_state.send_replace(ConnectionState::Disconnected);
                    break;
                };
                let summary = store.apply_batch(&batch);
                if summary.decode_failures > 0 {
                    warn!(failures = summary.decode_failures, "update batch contained undecodable rows");
                }
            }
        }
    }
}

/// Process commands from the mpsc channel one at a time.
async fn command_processor_task(
    store: Arc<DataStore>,
    executor: TransactionExecutor,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&store, &executor, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────

/// Resolve a command against the cache and run its operation list.
///
/// Only `Arc` clones leave the cache, so no cache lock is held while the
/// transaction is in flight.
async fn route_command(
    store: &DataStore,
    executor: &TransactionExecutor,
    cmd: Command,
) -> Result<CommandResult, CoreError> {
    let action = cmd.action();

    match cmd {
        // ── Bridge operations ────────────────────────────────────

        Command::CreateBridge { name } => {
            if store.bridge_exists(&name) {
                debug!(bridge = %name, "bridge already exists");
                return Ok(CommandResult::Unchanged);
            }
            let ops = ops::create_bridge(require_root(store)?, &name);
            let replies = executor.execute(&ops, action).await?;
            Ok(created(&replies, ops::CREATE_BRIDGE_RESULT))
        }

        Command::DeleteBridge { name } => {
            let bridge = store.require_bridge(&name)?;
            let ops = ops::delete_bridge(require_root(store)?, bridge.uuid);
            executor.execute(&ops, action).await?;
            Ok(CommandResult::Ok)
        }

        Command::UpdateBridgeController { bridge, target } => {
            let bridge = store.require_bridge(&bridge)?;
            let ops = ops::update_bridge_controller(bridge.uuid, &target);
            let replies = executor.execute(&ops, action).await?;
            Ok(created(&replies, ops::UPDATE_CONTROLLER_RESULT))
        }

        // ── Port operations ──────────────────────────────────────

        Command::CreatePort(request) => {
            let bridge = store.require_bridge(&request.bridge)?;
            if store.port_exists_on_bridge(&request.name, &request.bridge)? {
                debug!(bridge = %request.bridge, port = %request.name, "port already exists");
                return Ok(CommandResult::Unchanged);
            }
            let ops = ops::create_port(bridge.uuid, &request);
            let replies = executor.execute(&ops, action).await?;
            Ok(created(&replies, ops::CREATE_PORT_RESULT))
        }

        Command::DeletePort { bridge, port } => {
            let (bridge, port) = port_on_bridge(store, &bridge, &port)?;
            let ops = ops::delete_port(bridge.uuid, port.uuid);
            executor.execute(&ops, action).await?;
            Ok(CommandResult::Ok)
        }

        Command::UpdatePortTag { bridge, port, tag } => {
            let (_, port) = port_on_bridge(store, &bridge, &port)?;
            let ops = ops::update_port_tag(port.uuid, tag);
            executor.execute(&ops, action).await?;
            Ok(CommandResult::Ok)
        }

        Command::RemoveInterfaceFromPort { port, interface } => {
            let port = store.require_port(&port)?;
            if !port.interfaces.contains(&interface) {
                return Err(CoreError::not_found(
                    "Interface",
                    format!("{interface} on port {}", port.name),
                ));
            }
            let ops = ops::remove_interface_from_port(port.uuid, interface);
            executor.execute(&ops, action).await?;
            Ok(CommandResult::Ok)
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn require_root(store: &DataStore) -> Result<Uuid, CoreError> {
    store
        .root_uuid()
        .ok_or_else(|| CoreError::not_found("Open_vSwitch", "root row"))
}

fn port_on_bridge(
    store: &DataStore,
    bridge: &str,
    port: &str,
) -> Result<(Arc<Bridge>, Arc<Port>), CoreError> {
    let bridge_row = store.require_bridge(bridge)?;
    let port_row = store
        .ports_on_bridge(bridge)?
        .into_iter()
        .find(|p| p.name == port)
        .ok_or_else(|| CoreError::not_found("Port", format!("{port} on bridge {bridge}")))?;
    Ok((bridge_row, port_row))
}

fn created(replies: &[OperationResult], index: usize) -> CommandResult {
    replies
        .get(index)
        .and_then(OperationResult::inserted_uuid)
        .map_or(CommandResult::Ok, CommandResult::Created)
}
