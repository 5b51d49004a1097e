//! Per-tenant relationship graph storage.

pub mod store;

pub use store::{Edge, EdgeId, GraphStats, GraphStore, Node, UpsertOutcome};
