// OVSDB JSON-RPC client
//
// Owns one connection to an `ovsdb-server`. A reader task demultiplexes
// incoming messages: replies are routed to the waiting request by id,
// `update` notifications are forwarded in arrival order to a single
// unbounded channel, and server `echo` requests are answered directly. A
// writer task serializes outgoing frames.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::JsonCodec;
use crate::error::Error;
use crate::operation::{Operation, OperationResult};
use crate::schema::{DatabaseSchema, MonitorRequest};
use crate::transport::{self, Endpoint, TransportConfig};
use crate::update::TableUpdates;

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value, Error>>>>;

struct Shared {
    pending: PendingMap,
    outgoing: mpsc::UnboundedSender<Value>,
    cancel: CancellationToken,
}

/// Async client for one OVSDB server connection.
///
/// Requests may be issued concurrently from any task. Dropping the client
/// closes the connection and ends the update stream.
pub struct OvsdbClient {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
    endpoint: Option<Endpoint>,
    updates_rx: Mutex<Option<mpsc::UnboundedReceiver<TableUpdates>>>,
}

impl OvsdbClient {
    /// Open a connection to `endpoint` and start the I/O tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(endpoint: &Endpoint, config: &TransportConfig) -> Result<Self, Error> {
        let stream = transport::open(endpoint, config).await?;
        debug!(%endpoint, "connected to database server");
        let mut client = Self::from_stream(stream, config);
        client.endpoint = Some(endpoint.clone());
        Ok(client)
    }

    /// Run the JSON-RPC protocol over an already-connected byte stream.
    pub fn from_stream<S>(stream: S, config: &TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            outgoing,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(writer_task(
            FramedWrite::new(write_half, JsonCodec::default()),
            outgoing_rx,
            shared.cancel.clone(),
        ));
        tokio::spawn(reader_task(
            FramedRead::new(read_half, JsonCodec::default()),
            Arc::clone(&shared),
            updates_tx,
        ));

        Self {
            shared,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            endpoint: None,
            updates_rx: Mutex::new(Some(updates_rx)),
        }
    }

    /// The endpoint this client was connected to, if it was opened via
    /// [`connect`](Self::connect).
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// `true` once the connection has been lost or closed.
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Close the connection. Outstanding requests fail with
    /// [`Error::Disconnected`].
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    /// Take the update notification receiver. Only the first call
    /// returns `Some`; the stream ends when the connection closes.
    pub fn take_updates(&self) -> Option<mpsc::UnboundedReceiver<TableUpdates>> {
        self.updates_rx.lock().take()
    }

    // ── RPC methods ─────────────────────────────────────────────────

    pub async fn list_dbs(&self) -> Result<Vec<String>, Error> {
        self.call("list_dbs", json!([])).await
    }

    pub async fn get_schema(&self, database: &str) -> Result<DatabaseSchema, Error> {
        self.call("get_schema", json!([database])).await
    }

    /// Liveness check: the server echoes the params back.
    pub async fn echo(&self) -> Result<(), Error> {
        let _: Value = self.call("echo", json!(["ovsync"])).await?;
        Ok(())
    }

    /// Start monitoring the given tables. Returns the initial contents;
    /// subsequent changes arrive on the [`take_updates`](Self::take_updates)
    /// channel.
    pub async fn monitor(
        &self,
        database: &str,
        monitor_id: Value,
        requests: HashMap<String, MonitorRequest>,
    ) -> Result<TableUpdates, Error> {
        self.call("monitor", json!([database, monitor_id, requests]))
            .await
    }

    /// Monitor every table and column the schema declares.
    pub async fn monitor_all(&self, database: &str, monitor_id: Value) -> Result<TableUpdates, Error> {
        let schema = self.get_schema(database).await?;
        let requests: HashMap<String, MonitorRequest> = schema
            .table_names()
            .map(|table| (table.to_owned(), MonitorRequest::default()))
            .collect();
        debug!(database, tables = requests.len(), "monitoring all tables");
        self.monitor(database, monitor_id, requests).await
    }

    /// Submit `operations` as one transaction.
    ///
    /// Returns the raw per-operation replies; a `null` slot (operation not
    /// executed) is reported as an empty [`OperationResult`]. Whether the
    /// transaction succeeded is for the caller to judge.
    pub async fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> Result<Vec<OperationResult>, Error> {
        let mut params = Vec::with_capacity(operations.len() + 1);
        params.push(Value::String(database.to_owned()));
        for op in operations {
            params.push(serde_json::to_value(op)?);
        }

        let replies: Vec<Option<OperationResult>> =
            self.call("transact", Value::Array(params)).await?;
        Ok(replies.into_iter().map(Option::unwrap_or_default).collect())
    }

    // ── Request plumbing ────────────────────────────────────────────

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, Error> {
        let raw = self.call_raw(method, params).await?;
        serde_json::from_value(raw).map_err(|e| Error::UnexpectedResponse {
            method: method.to_owned(),
            detail: e.to_string(),
        })
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        // The reader cancels before draining `pending`, so a request
        // registered after the drain is caught here.
        if self.shared.cancel.is_cancelled() {
            self.shared.pending.lock().remove(&id);
            return Err(Error::Disconnected);
        }

        trace!(id, method, "sending request");
        let frame = json!({ "id": id, "method": method, "params": params });
        if self.shared.outgoing.send(frame).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(Error::Disconnected);
        }

        let reply = match self.request_timeout {
            Some(limit) => {
                if let Ok(reply) = tokio::time::timeout(limit, rx).await {
                    reply
                } else {
                    self.shared.pending.lock().remove(&id);
                    return Err(Error::Timeout {
                        method: method.to_owned(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }
            None => rx.await,
        };

        match reply {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(Error::Rpc { message, .. })) => Err(Error::Rpc {
                method: method.to_owned(),
                message,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Disconnected),
        }
    }
}

impl Drop for OvsdbClient {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ── Background I/O tasks ────────────────────────────────────────────

async fn writer_task<W>(
    mut sink: FramedWrite<W, JsonCodec>,
    mut rx: mpsc::UnboundedReceiver<Value>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "write to database server failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}

async fn reader_task<R>(
    mut stream: FramedRead<R, JsonCodec>,
    shared: Arc<Shared>,
    updates_tx: mpsc::UnboundedSender<TableUpdates>,
) where
    R: AsyncRead + Unpin,
{
    let mut updates_tx = Some(updates_tx);
    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(message)) => dispatch(&shared, &mut updates_tx, message),
                    Some(Err(e)) => {
                        warn!(error = %e, "read from database server failed");
                        break;
                    }
                    None => {
                        debug!("database server closed the connection");
                        break;
                    }
                }
            }
        }
    }

    shared.cancel.cancel();
    let orphaned: Vec<_> = shared.pending.lock().drain().collect();
    for (_, waiter) in orphaned {
        let _ = waiter.send(Err(Error::Disconnected));
    }
}

fn dispatch(
    shared: &Shared,
    updates_tx: &mut Option<mpsc::UnboundedSender<TableUpdates>>,
    message: Value,
) {
    if let Some(method) = message.get("method").and_then(Value::as_str) {
        match method {
            "echo" => {
                let reply = json!({
                    "id": message.get("id").cloned().unwrap_or(Value::Null),
                    "result": message.get("params").cloned().unwrap_or_else(|| json!([])),
                    "error": Value::Null,
                });
                let _ = shared.outgoing.send(reply);
            }
            "update" => forward_update(updates_tx, &message),
            other => debug!(method = other, "ignoring unsolicited server request"),
        }
        return;
    }

    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        warn!(%message, "reply without a usable id");
        return;
    };
    let Some(waiter) = shared.pending.lock().remove(&id) else {
        debug!(id, "reply for unknown or abandoned request");
        return;
    };

    let error = message.get("error").filter(|e| !e.is_null());
    let outcome = match error {
        Some(err) => Err(Error::Rpc {
            method: String::new(),
            message: describe_rpc_error(err),
        }),
        None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
    };
    let _ = waiter.send(outcome);
}

/// Forward one `update` notification. A notification that cannot be
/// decoded closes the update stream: the batch is lost, so the receiver
/// could never converge with the server again.
fn forward_update(updates_tx: &mut Option<mpsc::UnboundedSender<TableUpdates>>, message: &Value) {
    if updates_tx.is_none() {
        trace!("update stream already closed, dropping notification");
        return;
    }

    let decoded = match message.get("params").and_then(|p| p.get(1)) {
        Some(payload) => {
            serde_json::from_value::<TableUpdates>(payload.clone()).map_err(|e| e.to_string())
        }
        None => Err("missing table-updates payload".to_owned()),
    };

    match decoded {
        Ok(updates) => {
            trace!(rows = updates.row_count(), "update notification");
            if let Some(tx) = updates_tx.as_ref() {
                if tx.send(updates).is_err() {
                    trace!("update receiver dropped");
                }
            }
        }
        Err(reason) => {
            warn!(%reason, "undecodable update notification, closing update stream");
            *updates_tx = None;
        }
    }
}

fn describe_rpc_error(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let kind = obj.get("error").and_then(Value::as_str).unwrap_or("error");
            match obj.get("details").and_then(Value::as_str) {
                Some(details) => format!("{kind}: {details}"),
                None => kind.to_owned(),
            }
        }
        other => other.to_string(),
    }
}
