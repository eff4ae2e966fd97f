#![allow(clippy::unwrap_used)]

// Facade tests against an in-memory database connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use ovsync_api::{Error, Operation, OperationResult, Ovsdb, Row, RowUpdate, TableUpdates, value};
use ovsync_core::{
    ClientConfig, ClientContext, Command, CommandResult, ConnectionState, CoreError,
    CreatePortRequest, VlanTag,
};

const ROOT: &str = "c1a0a5f4-75a5-4f4c-9b8a-0a7a0e3d5b00";
const BR0: &str = "2a4c3eb1-0d05-4bc9-8f0a-6c2b1e1f3c11";
const BR1: &str = "5e0f40e9-8c59-4b3a-9d3b-7c2a3f4a1d22";
const P_BR0: &str = "8f5a0c4e-5d6b-4fd1-9f64-2b3c3f3b8a01";
const P_VNET0: &str = "0b9c3a52-12f4-4c43-8d8a-6f0f7f52b702";
const P_PATCH: &str = "d3b7c7a2-93f1-4b1e-8e0e-4c6c9b2a7f03";
const I_VNET0: &str = "4e6f8a10-2b3c-4d5e-8f70-91a2b3c4d5e6";

fn id(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap()
}

fn row(value: Value) -> Row {
    serde_json::from_value(value).unwrap()
}

fn refs(ids: &[&str]) -> Value {
    value::set(ids.iter().map(|i| value::uuid(id(i))))
}

fn initial_state() -> TableUpdates {
    let mut batch = TableUpdates::new();
    batch
        .push(
            "Open_vSwitch",
            id(ROOT),
            RowUpdate::upsert(row(json!({ "bridges": refs(&[BR0, BR1]) }))),
        )
        .push(
            "Bridge",
            id(BR0),
            RowUpdate::upsert(row(json!({ "name": "br0", "ports": refs(&[P_BR0, P_VNET0]) }))),
        )
        .push(
            "Bridge",
            id(BR1),
            RowUpdate::upsert(row(json!({ "name": "br1", "ports": refs(&[P_PATCH]) }))),
        )
        .push("Port", id(P_BR0), RowUpdate::upsert(row(json!({ "name": "br0" }))))
        .push(
            "Port",
            id(P_VNET0),
            RowUpdate::upsert(row(json!({
                "name": "vnet0",
                "interfaces": refs(&[I_VNET0]),
                "tag": 100
            }))),
        )
        .push("Port", id(P_PATCH), RowUpdate::upsert(row(json!({ "name": "patch-br0" }))))
        .push(
            "Interface",
            id(I_VNET0),
            RowUpdate::upsert(row(json!({
                "name": "vnet0",
                "statistics": ["map", [["rx_packets", 12], ["tx_packets", 30]]]
            }))),
        );
    batch
}

// ── Mock connection ─────────────────────────────────────────────────

struct MockOvsdb {
    initial: TableUpdates,
    updates: Mutex<Option<mpsc::UnboundedReceiver<TableUpdates>>>,
    transactions: Mutex<Vec<Vec<Operation>>>,
    scripted: Mutex<VecDeque<Vec<OperationResult>>>,
    stall: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl MockOvsdb {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<TableUpdates>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mock = Arc::new(Self {
            initial: initial_state(),
            updates: Mutex::new(Some(rx)),
            transactions: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            stall: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        });
        (mock, tx)
    }

    /// Queue the reply for the next transaction instead of the default
    /// all-clean one.
    fn reply_with(&self, replies: Vec<OperationResult>) {
        self.scripted.lock().unwrap().push_back(replies);
    }

    fn transactions(&self) -> Vec<Vec<Operation>> {
        self.transactions.lock().unwrap().clone()
    }

    /// Hold every later transaction open until `release` is notified.
    /// `entered` fires once the transaction has been recorded.
    fn stall_transactions(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ovsdb for MockOvsdb {
    async fn monitor_all(&self, database: &str, _monitor_id: Value) -> Result<TableUpdates, Error> {
        assert_eq!(database, "Open_vSwitch");
        Ok(self.initial.clone())
    }

    async fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> Result<Vec<OperationResult>, Error> {
        assert_eq!(database, "Open_vSwitch");
        self.transactions.lock().unwrap().push(operations.to_vec());
        if self.stall.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if let Some(replies) = self.scripted.lock().unwrap().pop_front() {
            return Ok(replies);
        }
        Ok(operations
            .iter()
            .map(|op| match op {
                Operation::Insert { .. } => OperationResult {
                    uuid: Some(value::uuid(Uuid::new_v4())),
                    ..OperationResult::default()
                },
                _ => OperationResult {
                    count: Some(1),
                    ..OperationResult::default()
                },
            })
            .collect())
    }

    fn take_updates(&self) -> Option<mpsc::UnboundedReceiver<TableUpdates>> {
        self.updates.lock().unwrap().take()
    }
}

async fn connected() -> (
    ovsync_core::Client,
    Arc<MockOvsdb>,
    mpsc::UnboundedSender<TableUpdates>,
) {
    let (mock, tx) = MockOvsdb::new();
    let ctx = ClientContext::new();
    let client = ctx
        .get_client_with(ClientConfig::default(), mock.clone())
        .await
        .unwrap();
    (client, mock, tx)
}

fn wire(op: &Operation) -> Value {
    serde_json::to_value(op).unwrap()
}

// ── Connection and queries ──────────────────────────────────────────

#[tokio::test]
async fn connect_populates_cache_from_initial_fetch() {
    let (client, mock, _tx) = connected().await;

    assert!(client.is_connected());
    assert_eq!(client.root_uuid(), Some(id(ROOT)));
    assert!(client.bridge_exists("br0"));
    assert_eq!(client.find_all_ports_on_bridge("br0").unwrap(), ["br0", "vnet0"]);
    assert!(client.port_exists_on_bridge("patch-br0", "br1").unwrap());
    assert_eq!(client.find_statistics_on_interface("vnet0").unwrap()["tx_packets"], 30);
    assert_eq!(client.interfaces_on_port("vnet0").unwrap()[0].uuid, id(I_VNET0));
    assert!(mock.transactions().is_empty());
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let (client, _mock, _tx) = connected().await;

    assert!(!client.bridge_exists("br9"));
    assert!(client.find_all_ports_on_bridge("br9").unwrap_err().is_not_found());
    assert!(client.port_exists_on_bridge("vnet0", "br9").unwrap_err().is_not_found());
    assert!(client.find_statistics_on_interface("eth9").unwrap_err().is_not_found());
}

#[tokio::test]
async fn streamed_updates_reach_the_cache() {
    let (client, _mock, tx) = connected().await;
    let mut ports = client.ports();

    let mut batch = TableUpdates::new();
    batch.push(
        "Port",
        id(P_VNET0),
        RowUpdate::upsert(row(json!({ "name": "vnet0", "tag": 200 }))),
    );
    tx.send(batch).unwrap();

    let snap = tokio::time::timeout(Duration::from_secs(1), ports.changed())
        .await
        .unwrap()
        .unwrap();
    let vnet0 = snap.iter().find(|p| p.name == "vnet0").unwrap();
    assert_eq!(vnet0.tag, Some(200));
    assert!(client.store().last_update().is_some());
}

#[tokio::test]
async fn deleting_br1_upstream_removes_it_locally() {
    let (client, _mock, tx) = connected().await;
    let mut bridges = client.bridges();

    let mut batch = TableUpdates::new();
    batch
        .push("Bridge", id(BR1), RowUpdate::delete())
        .push("Port", id(P_PATCH), RowUpdate::delete());
    tx.send(batch).unwrap();

    tokio::time::timeout(Duration::from_secs(1), bridges.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(!client.bridge_exists("br1"));
    assert!(client.store().row("Bridge", &id(BR1)).is_none());
    assert!(client.find_all_ports_on_bridge("br1").unwrap_err().is_not_found());
}

#[tokio::test]
async fn closed_update_stream_disconnects() {
    let (client, mock, tx) = connected().await;
    let mut state = client.connection_state();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    let err = client.create_bridge("br2").await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(mock.transactions().is_empty());
    // Cache contents survive.
    assert!(client.bridge_exists("br0"));
}

#[tokio::test]
async fn port_watch_ignores_other_ports() {
    let (client, _mock, tx) = connected().await;
    let mut vnet0 = client.watch_port("vnet0");
    assert_eq!(vnet0.current().unwrap().tag, Some(100));

    let mut unrelated = TableUpdates::new();
    unrelated.push(
        "Port",
        id(P_PATCH),
        RowUpdate::upsert(row(json!({ "name": "patch-br0", "tag": 7 }))),
    );
    tx.send(unrelated).unwrap();

    let mut retag = TableUpdates::new();
    retag.push(
        "Port",
        id(P_VNET0),
        RowUpdate::upsert(row(json!({ "name": "vnet0", "tag": 200 }))),
    );
    tx.send(retag).unwrap();

    // The first item seen is the retag, never the patch port change.
    let item = tokio::time::timeout(Duration::from_secs(1), vnet0.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(item.tag, Some(200));

    let mut removal = TableUpdates::new();
    removal.push("Port", id(P_VNET0), RowUpdate::delete());
    tx.send(removal).unwrap();
    let gone = tokio::time::timeout(Duration::from_secs(1), vnet0.next())
        .await
        .unwrap()
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_and_updates_proceed_while_a_transaction_is_pending() {
    let (client, mock, tx) = connected().await;
    mock.stall_transactions();
    let mut ports = client.ports();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.delete_port("br0", "vnet0").await }
    });
    tokio::time::timeout(Duration::from_secs(1), mock.entered.notified())
        .await
        .unwrap();

    let reader = tokio::spawn({
        let client = client.clone();
        async move { client.find_all_ports_on_bridge("br0") }
    });
    let listed = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(listed, ["br0", "vnet0"]);

    // The server's view of the delete lands before the reply does.
    let mut batch = TableUpdates::new();
    batch
        .push(
            "Bridge",
            id(BR0),
            RowUpdate::upsert(row(json!({ "name": "br0", "ports": refs(&[P_BR0]) }))),
        )
        .push("Port", id(P_VNET0), RowUpdate::delete());
    tx.send(batch).unwrap();
    tokio::time::timeout(Duration::from_secs(1), ports.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.find_all_ports_on_bridge("br0").unwrap(), ["br0"]);

    assert!(!pending.is_finished());
    mock.release.notify_one();
    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(result, CommandResult::Ok));
    assert_eq!(mock.transactions().len(), 1);
}

#[tokio::test]
async fn client_debug_shows_target_and_state() {
    let (client, _mock, _tx) = connected().await;
    let shown = format!("{client:?}");
    assert!(shown.starts_with("Client"));
    assert!(shown.contains("Open_vSwitch"));
    assert!(shown.contains("Connected"));
}

// ── Context lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn context_returns_same_client_for_same_target() {
    let (mock, _tx) = MockOvsdb::new();
    let ctx = ClientContext::new();
    assert!(ctx.client().await.is_none());

    let first = ctx
        .get_client_with(ClientConfig::default(), mock.clone())
        .await
        .unwrap();
    let (other, _other_tx) = MockOvsdb::new();
    let second = ctx
        .get_client_with(ClientConfig::default(), other)
        .await
        .unwrap();

    assert!(Arc::ptr_eq(first.store(), second.store()));
    assert!(Arc::ptr_eq(first.store(), ctx.client().await.unwrap().store()));
}

#[tokio::test]
async fn context_rejects_different_target() {
    let (mock, _tx) = MockOvsdb::new();
    let ctx = ClientContext::new();
    ctx.get_client_with(ClientConfig::default(), mock.clone())
        .await
        .unwrap();

    let elsewhere = ClientConfig::from_parts("tcp", "10.0.0.5:6640").unwrap();
    let err = ctx.get_client_with(elsewhere, mock).await.unwrap_err();
    assert!(matches!(err, CoreError::AlreadyConnected { .. }));
}

#[tokio::test]
async fn update_stream_can_only_be_claimed_once() {
    let (mock, _tx) = MockOvsdb::new();
    ClientContext::new()
        .get_client_with(ClientConfig::default(), mock.clone())
        .await
        .unwrap();

    let err = ClientContext::new()
        .get_client_with(ClientConfig::default(), mock)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

#[tokio::test]
async fn shutdown_stops_command_processing() {
    let (client, mock, _tx) = connected().await;
    client.shutdown().await;

    assert!(!client.is_connected());
    assert!(matches!(client.delete_bridge("br1").await, Err(CoreError::NotConnected)));
    assert!(mock.transactions().is_empty());
}

// ── Mutations ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_bridge_links_under_root() {
    let (client, mock, _tx) = connected().await;

    let result = client.create_bridge("br2").await.unwrap();
    assert!(matches!(result, CommandResult::Created(_)));

    let txns = mock.transactions();
    assert_eq!(txns.len(), 1);
    let ops = &txns[0];
    assert_eq!(ops.len(), 4);
    assert_eq!(wire(&ops[0])["row"], json!({ "name": "br2", "type": "internal" }));
    assert_eq!(wire(&ops[2])["row"]["name"], "br2");
    assert_eq!(
        wire(&ops[3])["where"],
        json!([["_uuid", "==", ["uuid", ROOT]]])
    );
}

#[tokio::test]
async fn create_existing_bridge_is_a_no_op() {
    let (client, mock, _tx) = connected().await;
    assert_eq!(client.create_bridge("br0").await.unwrap(), CommandResult::Unchanged);
    assert!(mock.transactions().is_empty());
}

#[tokio::test]
async fn delete_bridge_targets_cached_uuid() {
    let (client, mock, _tx) = connected().await;
    assert_eq!(client.delete_bridge("br1").await.unwrap(), CommandResult::Ok);

    let ops = &mock.transactions()[0];
    assert_eq!(
        wire(&ops[0])["mutations"],
        json!([["bridges", "delete", ["set", [["uuid", BR1]]]]])
    );
    assert_eq!(wire(&ops[1])["op"], "delete");
}

#[tokio::test]
async fn mutations_on_missing_entities_send_nothing() {
    let (client, mock, _tx) = connected().await;

    assert!(client.delete_bridge("br9").await.unwrap_err().is_not_found());
    assert!(client
        .update_bridge_controller("br9", "tcp:10.0.0.1:6653")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(client.delete_port("br0", "patch-br0").await.unwrap_err().is_not_found());
    assert!(client
        .remove_interface_from_port("vnet0", Uuid::new_v4())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(client
        .create_internal_port("br9", "p9", None)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(mock.transactions().is_empty());
}

#[tokio::test]
async fn invalid_vlan_is_rejected_before_sending() {
    let (client, mock, _tx) = connected().await;

    let err = client.create_internal_port("br0", "p1", Some(4096)).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    let err = client.update_port_tag("br0", "vnet0", Some(0)).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    assert!(mock.transactions().is_empty());
}

#[tokio::test]
async fn create_tagged_internal_port() {
    let (client, mock, _tx) = connected().await;
    let result = client.create_internal_port("br0", "p1", Some(10)).await.unwrap();
    assert!(matches!(result, CommandResult::Created(_)));

    let ops = &mock.transactions()[0];
    assert_eq!(wire(&ops[0])["row"]["type"], "internal");
    assert_eq!(wire(&ops[1])["row"]["tag"], 10);
    assert_eq!(
        wire(&ops[2])["where"],
        json!([["_uuid", "==", ["uuid", BR0]]])
    );
}

#[tokio::test]
async fn create_existing_port_is_a_no_op() {
    let (client, mock, _tx) = connected().await;
    let result = client
        .execute(Command::CreatePort(CreatePortRequest::veth("br0", "vnet0")))
        .await
        .unwrap();
    assert_eq!(result, CommandResult::Unchanged);
    assert!(mock.transactions().is_empty());
}

#[tokio::test]
async fn patch_port_carries_peer() {
    let (client, mock, _tx) = connected().await;
    client.create_patch_port("br0", "patch-br1", "patch-br0").await.unwrap();

    let ops = &mock.transactions()[0];
    assert_eq!(
        wire(&ops[0])["row"]["options"],
        json!(["map", [["peer", "patch-br0"]]])
    );
}

#[tokio::test]
async fn clearing_port_tag_writes_empty_set() {
    let (client, mock, _tx) = connected().await;
    client
        .execute(Command::UpdatePortTag {
            bridge: "br0".into(),
            port: "vnet0".into(),
            tag: None,
        })
        .await
        .unwrap();
    client
        .execute(Command::UpdatePortTag {
            bridge: "br0".into(),
            port: "vnet0".into(),
            tag: Some(VlanTag::new(300).unwrap()),
        })
        .await
        .unwrap();

    let txns = mock.transactions();
    assert_eq!(wire(&txns[0][0])["row"]["tag"], json!(["set", []]));
    assert_eq!(wire(&txns[1][0])["row"]["tag"], 300);
    assert_eq!(
        wire(&txns[0][0])["where"],
        json!([["_uuid", "==", ["uuid", P_VNET0]]])
    );
}

#[tokio::test]
async fn remove_interface_mutates_port() {
    let (client, mock, _tx) = connected().await;
    client
        .remove_interface_from_port("vnet0", id(I_VNET0))
        .await
        .unwrap();

    let ops = &mock.transactions()[0];
    assert_eq!(
        wire(&ops[0])["mutations"],
        json!([["interfaces", "delete", ["set", [["uuid", I_VNET0]]]]])
    );
}

#[tokio::test]
async fn controller_update_inserts_then_points() {
    let (client, mock, _tx) = connected().await;
    let result = client
        .update_bridge_controller("br0", "tcp:10.0.0.1:6653")
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::Created(_)));

    let ops = &mock.transactions()[0];
    assert_eq!(ops[0].table(), "Controller");
    assert_eq!(ops[1].name(), "update");
}

// ── Transaction failures ────────────────────────────────────────────

#[tokio::test]
async fn operation_error_is_reported_with_index() {
    let (client, mock, _tx) = connected().await;
    mock.reply_with(vec![
        OperationResult::default(),
        OperationResult {
            error: Some("constraint violation".into()),
            details: Some("Transaction causes multiple rows in \"Port\" table to have identical values".into()),
            ..OperationResult::default()
        },
        OperationResult::default(),
    ]);

    let err = client.create_internal_port("br0", "dup", None).await.unwrap_err();
    match err {
        CoreError::Transaction {
            action,
            index,
            code,
            ..
        } => {
            assert_eq!(action, "CreatePort");
            assert_eq!(index, Some(1));
            assert_eq!(code, "constraint violation");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn short_reply_is_a_protocol_error() {
    let (client, mock, _tx) = connected().await;
    mock.reply_with(vec![OperationResult::default()]);

    let err = client.delete_port("br0", "vnet0").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Protocol { expected: 2, received: 1, .. }
    ));
}

#[tokio::test]
async fn raw_transact_validates_replies() {
    let (client, mock, _tx) = connected().await;
    let ops = vec![Operation::select("Bridge", Vec::new())];
    mock.reply_with(Vec::new());

    let err = client.transact(&ops, "ListBridges").await.unwrap_err();
    assert!(matches!(err, CoreError::Protocol { .. }));
    assert_eq!(client.transact(&ops, "ListBridges").await.unwrap().len(), 1);
}
