//! rollgrid-mapping: keeps track of which external entity fronts which instance.
//!
//! External entities (load-balancer pool members, service-registry
//! instances) are matched to deployment instances by a chain of strategies:
//!
//! 1. **address**: the entity's discovery URL or `host:port` identifies exactly one instance
//! 2. **name pattern**: `hostname_appName[_N]` names a server and an instance on it
//! 3. **fuzzy name** (service registry only): best string-similarity match among
//!    instances on the server with the entity's address
//!
//! Matches become active mappings; operator pins (manual mappings) are never
//! touched by automatic reconciliation. Every change is recorded in the
//! mapping history.
//!
//! # Components
//!
//! - **`strategy`**: the matching strategies over a fleet snapshot
//! - **`similarity`**: normalized string-similarity ratio
//! - **`reconciler`**: reconcile / pin / unpin / remap-all / stats

pub mod error;
pub mod reconciler;
pub mod similarity;
pub mod strategy;

pub use error::{MappingError, MappingResult};
pub use reconciler::{MappingStats, ReconcileOutcome, Reconciler, RemapSummary, SYSTEM_ACTOR};
pub use strategy::{FleetSnapshot, MatchStrategy, MemberName, StrategyMatch, find_match};
