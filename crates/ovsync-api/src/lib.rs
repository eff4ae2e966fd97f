// ovsync-api: Async Rust client for the Open vSwitch database protocol (RFC 7047)

mod codec;

pub mod client;
pub mod error;
pub mod operation;
pub mod ovsdb;
pub mod schema;
pub mod transport;
pub mod update;
pub mod value;

pub use client::OvsdbClient;
pub use error::{Error, ValueError};
pub use operation::{Condition, Function, Mutation, Mutator, Operation, OperationResult};
pub use ovsdb::Ovsdb;
pub use schema::{DatabaseSchema, MonitorRequest, TableSchema};
pub use transport::{Endpoint, TransportConfig, TransportKind};
pub use update::{Row, RowUpdate, TableUpdate, TableUpdates};
