// ── Local mirror of the switch database ──
//
// Raw row cache plus typed caches, written only by the reconciler.

mod collection;
mod data_store;
mod reconcile;
mod row_cache;

pub use data_store::DataStore;
pub use reconcile::BatchSummary;
