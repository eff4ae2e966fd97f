// ── Command API ──
//
// All write operations flow through a unified `Command` enum. The client's
// command processor resolves each variant against the cache, builds its
// operation list, and runs it as one transaction.

pub(crate) mod ops;
pub mod requests;

use strum::IntoStaticStr;
use uuid::Uuid;

use crate::error::CoreError;

pub use requests::{CreatePortRequest, PortKind, VlanTag};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All possible write operations against the switch database.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum Command {
    // ── Bridge operations ────────────────────────────────────────────
    /// Create a bridge with its same-named internal port. A no-op when a
    /// bridge with that name is already cached.
    CreateBridge {
        name: String,
    },
    DeleteBridge {
        name: String,
    },
    /// Replace the bridge's controller set with one new controller.
    UpdateBridgeController {
        bridge: String,
        target: String,
    },

    // ── Port operations ──────────────────────────────────────────────
    CreatePort(CreatePortRequest),
    DeletePort {
        bridge: String,
        port: String,
    },
    /// Set (or with `None`, clear) a port's access VLAN.
    UpdatePortTag {
        bridge: String,
        port: String,
        tag: Option<VlanTag>,
    },
    RemoveInterfaceFromPort {
        port: String,
        interface: Uuid,
    },
}

impl Command {
    /// Name used for this command in errors and logs.
    pub fn action(&self) -> &'static str {
        self.into()
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// The transaction committed.
    Ok,
    /// Nothing needed doing; no transaction was sent.
    Unchanged,
    /// The transaction committed and created the row with this uuid.
    Created(Uuid),
}
