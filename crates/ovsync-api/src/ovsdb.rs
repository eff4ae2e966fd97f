// The database boundary consumed by `ovsync-core`.
//
// Everything the cache engine needs from a server connection, behind a
// trait so the engine can run against a real socket or an in-memory
// double.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::OvsdbClient;
use crate::error::Error;
use crate::operation::{Operation, OperationResult};
use crate::update::TableUpdates;

#[async_trait]
pub trait Ovsdb: Send + Sync {
    /// Fetch the full contents of every table and subscribe to changes.
    async fn monitor_all(&self, database: &str, monitor_id: Value) -> Result<TableUpdates, Error>;

    /// Submit a batch of operations as one transaction.
    async fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> Result<Vec<OperationResult>, Error>;

    /// Hand over the ordered stream of update notifications. Returns
    /// `None` if it was already taken.
    fn take_updates(&self) -> Option<mpsc::UnboundedReceiver<TableUpdates>>;
}

#[async_trait]
impl Ovsdb for OvsdbClient {
    async fn monitor_all(&self, database: &str, monitor_id: Value) -> Result<TableUpdates, Error> {
        OvsdbClient::monitor_all(self, database, monitor_id).await
    }

    async fn transact(
        &self,
        database: &str,
        operations: &[Operation],
    ) -> Result<Vec<OperationResult>, Error> {
        OvsdbClient::transact(self, database, operations).await
    }

    fn take_updates(&self) -> Option<mpsc::UnboundedReceiver<TableUpdates>> {
        OvsdbClient::take_updates(self)
    }
}
