//! Local cache synchronization and transaction layer for the Open vSwitch
//! database, built on `ovsync-api`.
//!
//! - **[`Client`]**: Central facade for one connection:
//!   [`connect()`](Client::connect) fetches every table, reconciles the reply
//!   into a fresh [`DataStore`], then spawns background tasks that apply the
//!   server's update stream and process commands. [`ClientContext`] hands out
//!   at most one client per endpoint and database.
//!
//! - **[`DataStore`]**: Raw row cache (`DashMap`) plus typed bridge, port,
//!   and interface caches (`parking_lot::RwLock` + `tokio::sync::watch`).
//!   [`DataStore::apply_batch`] is the only writer.
//!
//! - **[`EntityStream<T>`]**: Subscription handle vended by the `DataStore`.
//!   Exposes `current()` / `latest()` / `changed()`, and narrows to a single
//!   named entity with [`EntityStream::watch`].
//!
//! - **[`Command`]**: Typed mutation requests routed through an `mpsc`
//!   channel to the command processor, which builds each operation list and
//!   runs it through the [`TransactionExecutor`]. Reads never touch the
//!   network.
//!
//! - **Domain model** ([`model`]): `Bridge`, `Port`, and `Interface`, decoded
//!   from raw rows by [`TypedRow::decode`].

pub mod client;
pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod executor;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{Client, ClientContext, ConnectionState};
pub use command::requests::*;
pub use command::{Command, CommandResult};
pub use config::{ClientConfig, DEFAULT_DATABASE};
pub use convert::{DecodeError, DecodeFailure, TypedRow};
pub use error::CoreError;
pub use executor::{TransactionExecutor, validate_replies};
pub use store::{BatchSummary, DataStore};
pub use stream::{EntityStream, EntityWatch, Snapshot};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Bridge, Entity, Interface, InterfaceType, LinkState, Port, TableKind, TypedKind, VlanMode,
};
