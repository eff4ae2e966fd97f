// ── Switch configuration model ──
//
// Typed views of the rows the cache engine understands. Everything else in
// the database is mirrored verbatim in the row cache but never decoded.

pub mod bridge;
pub mod interface;
pub mod port;
pub mod table;

// ── Re-exports ──────────────────────────────────────────────────────

pub use bridge::Bridge;
pub use interface::{Interface, InterfaceType, LinkState};
pub use port::{Port, VlanMode};
pub use table::{TableKind, TypedKind};

use uuid::Uuid;

/// Identity shared by every cached entity.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> &str;
}
