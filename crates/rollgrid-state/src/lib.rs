//! rollgrid-state: embedded state store for rollgrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the fleet inventory
//! (servers, instances), the external entities that front it (load-balancer
//! pool members, service-registry instances), and the mappings between the
//! two together with their append-only history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{entity_type}/{entity_id}/{instance_id}`) keep the rows
//! of one entity under a common prefix and make each mapping triple unique.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).
//! Multi-step mapping changes go through [`StateStore::write`], which runs
//! them in one redb write transaction.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{MappingWriter, StateStore};
pub use types::*;
