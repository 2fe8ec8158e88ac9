//! redb table definitions for the rollgrid state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys put the most selective part first so related rows
//! share a prefix.

use redb::TableDefinition;

/// Servers keyed by `{server_id}`.
pub const SERVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");

/// Instances keyed by `{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// External entities keyed by `{entity_type}/{entity_id}`.
pub const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// Mappings keyed by `{entity_type}/{entity_id}/{instance_id}`; one row per triple.
pub const MAPPINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("mappings");

/// Append-only mapping history keyed by zero-padded history id.
pub const MAPPING_HISTORY: TableDefinition<&str, &[u8]> =
    TableDefinition::new("mapping_history");

/// Id sequences keyed by sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const SEQ_MAPPING: &str = "mapping";
pub const SEQ_HISTORY: &str = "mapping_history";
