//! StateStore: redb-backed persistence for rollgrid.
//!
//! Provides typed CRUD over servers, instances and external entities, read
//! queries over mappings and their history, and [`StateStore::write`] for
//! the multi-step mapping updates that must commit atomically. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn read_record<T, Tb>(table: &Tb, key: &str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Decode every row whose key starts with `prefix`.
fn scan_records<T, Tb>(table: &Tb, prefix: &str) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if key.value().starts_with(prefix) {
            results.push(decode(value.value())?);
        }
    }
    Ok(results)
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVERS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
        txn.open_table(MAPPING_HISTORY).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record access ──────────────────────────────────────

    fn put_record<T: Serialize>(&self, def: RecordTable, key: &str, value: &T) -> StateResult<()> {
        let value = encode(value)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get(&self, def: RecordTable, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let bytes = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec());
        Ok(bytes)
    }

    fn get_record<T: DeserializeOwned>(&self, def: RecordTable, key: &str) -> StateResult<Option<T>> {
        self.get(def, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn scan<T: DeserializeOwned>(&self, def: RecordTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        scan_records(&table, prefix)
    }

    fn delete_record(&self, def: RecordTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Servers ────────────────────────────────────────────────────

    /// Insert or update a server.
    pub fn put_server(&self, server: &Server) -> StateResult<()> {
        self.put_record(SERVERS, &server.id.to_string(), server)?;
        debug!(server_id = server.id, name = %server.name, "server stored");
        Ok(())
    }

    pub fn get_server(&self, id: ServerId) -> StateResult<Option<Server>> {
        self.get_record(SERVERS, &id.to_string())
    }

    /// List all servers, ordered by id.
    pub fn list_servers(&self) -> StateResult<Vec<Server>> {
        let mut servers: Vec<Server> = self.scan(SERVERS, "")?;
        servers.sort_by_key(|s| s.id);
        Ok(servers)
    }

    /// Delete a server by id. Returns true if it existed.
    pub fn delete_server(&self, id: ServerId) -> StateResult<bool> {
        self.delete_record(SERVERS, &id.to_string())
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance.
    pub fn put_instance(&self, instance: &Instance) -> StateResult<()> {
        self.put_record(INSTANCES, &instance.id.to_string(), instance)?;
        debug!(instance_id = instance.id, name = %instance.name, "instance stored");
        Ok(())
    }

    pub fn get_instance(&self, id: InstanceId) -> StateResult<Option<Instance>> {
        self.get_record(INSTANCES, &id.to_string())
    }

    /// List all instances, ordered by id.
    pub fn list_instances(&self) -> StateResult<Vec<Instance>> {
        let mut instances: Vec<Instance> = self.scan(INSTANCES, "")?;
        instances.sort_by_key(|i| i.id);
        Ok(instances)
    }

    /// Instances hosted on any of the given servers, ordered by id.
    pub fn list_instances_on_servers(&self, server_ids: &[ServerId]) -> StateResult<Vec<Instance>> {
        let mut instances = self.list_instances()?;
        instances.retain(|i| server_ids.contains(&i.server_id));
        Ok(instances)
    }

    /// Delete an instance by id. Returns true if it existed.
    pub fn delete_instance(&self, id: InstanceId) -> StateResult<bool> {
        self.delete_record(INSTANCES, &id.to_string())
    }

    // ── External entities ──────────────────────────────────────────

    /// Insert or update an external entity.
    pub fn put_entity(&self, entity: &ExternalEntity) -> StateResult<()> {
        let key = entity.table_key();
        self.put_record(ENTITIES, &key, entity)?;
        debug!(%key, "entity stored");
        Ok(())
    }

    pub fn get_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StateResult<Option<ExternalEntity>> {
        self.get_record(ENTITIES, &entity_key(entity_type, entity_id))
    }

    /// All entities of one type, removed ones included.
    pub fn list_entities(&self, entity_type: EntityType) -> StateResult<Vec<ExternalEntity>> {
        let prefix = format!("{entity_type}/");
        let entities: Vec<ExternalEntity> = self.scan(ENTITIES, &prefix)?;
        Ok(entities
            .into_iter()
            .filter(|e| e.entity_type() == entity_type)
            .collect())
    }

    /// Delete an entity. Returns true if it existed.
    pub fn delete_entity(&self, entity_type: EntityType, entity_id: &str) -> StateResult<bool> {
        self.delete_record(ENTITIES, &entity_key(entity_type, entity_id))
    }

    // ── Mappings (read side) ───────────────────────────────────────

    /// Every mapping row, active or not.
    pub fn list_mappings(&self) -> StateResult<Vec<Mapping>> {
        self.scan(MAPPINGS, "")
    }

    /// Every mapping row for one entity type.
    pub fn list_mappings_of_type(&self, entity_type: EntityType) -> StateResult<Vec<Mapping>> {
        let prefix = format!("{entity_type}/");
        let mappings: Vec<Mapping> = self.scan(MAPPINGS, &prefix)?;
        Ok(mappings
            .into_iter()
            .filter(|m| m.entity_type == entity_type)
            .collect())
    }

    /// Active mappings for an entity (at most one while the store is consistent).
    pub fn active_mappings_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StateResult<Vec<Mapping>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
        entity_mappings(&table, entity_type, entity_id, true)
    }

    /// Active mappings held by an instance, across all entity types.
    pub fn active_mappings_for_instance(&self, instance_id: InstanceId) -> StateResult<Vec<Mapping>> {
        let mut mappings = self.list_mappings()?;
        mappings.retain(|m| m.is_active && m.instance_id == instance_id);
        Ok(mappings)
    }

    /// Most recent history records first, at most `limit`.
    pub fn history(&self, limit: usize) -> StateResult<Vec<MappingHistory>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MAPPING_HISTORY).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev().take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// History of one entity, oldest first.
    pub fn history_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StateResult<Vec<MappingHistory>> {
        let records: Vec<MappingHistory> = self.scan(MAPPING_HISTORY, "")?;
        Ok(records
            .into_iter()
            .filter(|h| h.entity_type == entity_type && h.entity_id == entity_id)
            .collect())
    }

    // ── Mappings (write side) ──────────────────────────────────────

    /// Run `f` inside a single write transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; on `Err` it is
    /// dropped and redb discards every write made through the writer.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&MappingWriter) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let writer = MappingWriter { txn };
        let value = f(&writer)?;
        writer.txn.commit().map_err(map_err!(Transaction))?;
        Ok(value)
    }
}

/// Mappings stored for one entity, optionally only the active ones.
fn entity_mappings<Tb>(
    table: &Tb,
    entity_type: EntityType,
    entity_id: &str,
    active_only: bool,
) -> StateResult<Vec<Mapping>>
where
    Tb: ReadableTable<&'static str, &'static [u8]>,
{
    let prefix = format!("{}/", entity_key(entity_type, entity_id));
    let mappings: Vec<Mapping> = scan_records(table, &prefix)?;
    Ok(mappings
        .into_iter()
        .filter(|m| m.entity_type == entity_type && m.entity_id == entity_id)
        .filter(|m| !active_only || m.is_active)
        .collect())
}

/// Handle to an open write transaction, handed out by [`StateStore::write`].
pub struct MappingWriter {
    txn: WriteTransaction,
}

impl MappingWriter {
    pub fn entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StateResult<Option<ExternalEntity>> {
        let table = self.txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        read_record(&table, &entity_key(entity_type, entity_id))
    }

    pub fn instance(&self, id: InstanceId) -> StateResult<Option<Instance>> {
        let table = self.txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        read_record(&table, &id.to_string())
    }

    pub fn server(&self, id: ServerId) -> StateResult<Option<Server>> {
        let table = self.txn.open_table(SERVERS).map_err(map_err!(Table))?;
        read_record(&table, &id.to_string())
    }

    /// Active mappings for an entity as seen inside this transaction.
    pub fn active_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StateResult<Vec<Mapping>> {
        let table = self.txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
        entity_mappings(&table, entity_type, entity_id, true)
    }

    /// The mapping row for one (entity, instance) pair, active or not.
    pub fn find(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        instance_id: InstanceId,
    ) -> StateResult<Option<Mapping>> {
        let table = self.txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
        read_record(&table, &mapping_key(entity_type, entity_id, instance_id))
    }

    /// Allocate the next id of a sequence (starting at 1).
    pub fn next_id(&self, sequence: &str) -> StateResult<u64> {
        let mut table = self.txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let current = table
            .get(sequence)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(sequence, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    /// Insert or overwrite the row for `mapping`'s triple.
    pub fn put_mapping(&self, mapping: &Mapping) -> StateResult<()> {
        let key = mapping.table_key();
        let value = encode(mapping)?;
        let mut table = self.txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Hard-delete a mapping row. History records that referenced it keep
    /// their content but lose the `mapping_id` link.
    pub fn delete_mapping(&self, mapping: &Mapping) -> StateResult<bool> {
        let existed = {
            let mut table = self.txn.open_table(MAPPINGS).map_err(map_err!(Table))?;
            table
                .remove(mapping.table_key().as_str())
                .map_err(map_err!(Write))?
                .is_some()
        };

        let mut table = self.txn.open_table(MAPPING_HISTORY).map_err(map_err!(Table))?;
        let referencing: Vec<MappingHistory> = scan_records::<MappingHistory, _>(&table, "")?
            .into_iter()
            .filter(|h| h.mapping_id == Some(mapping.id))
            .collect();
        for mut record in referencing {
            record.mapping_id = None;
            let value = encode(&record)?;
            table
                .insert(record.table_key().as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        Ok(existed)
    }

    /// Append a history record. Its `id` is assigned here.
    pub fn append_history(&self, mut record: MappingHistory) -> StateResult<HistoryId> {
        record.id = self.next_id(SEQ_HISTORY)?;
        let value = encode(&record)?;
        let mut table = self.txn.open_table(MAPPING_HISTORY).map_err(map_err!(Table))?;
        table
            .insert(record.table_key().as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mapping(id: MappingId, instance_id: InstanceId, entity_id: &str) -> Mapping {
        Mapping {
            id,
            instance_id,
            entity_type: EntityType::LoadBalancerServer,
            entity_id: entity_id.to_string(),
            is_manual: false,
            mapped_by: "system".to_string(),
            mapped_at: 1000,
            notes: None,
            is_active: true,
            metadata: Default::default(),
        }
    }

    fn test_history(mapping: &Mapping, action: HistoryAction) -> MappingHistory {
        MappingHistory {
            id: 0,
            mapping_id: Some(mapping.id),
            instance_id: mapping.instance_id,
            entity_type: mapping.entity_type,
            entity_id: mapping.entity_id.clone(),
            action,
            before: None,
            after: Some(mapping.clone()),
            changed_by: "system".to_string(),
            changed_at: 1000,
            reason: "test".to_string(),
        }
    }

    // ── Inventory CRUD ─────────────────────────────────────────────

    #[test]
    fn server_put_get_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let server = Server::new(1, "srv01.example.com", Some("10.0.0.1"));

        store.put_server(&server).unwrap();
        assert_eq!(store.get_server(1).unwrap(), Some(server));

        assert!(store.delete_server(1).unwrap());
        assert!(!store.delete_server(1).unwrap());
        assert!(store.get_server(1).unwrap().is_none());
    }

    #[test]
    fn server_address_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut server = Server::new(1, "srv01", Some("10.0.0.1"));
        store.put_server(&server).unwrap();

        server.address = Some("10.0.0.99".to_string());
        store.put_server(&server).unwrap();

        let all = store.list_servers().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].address.as_deref(), Some("10.0.0.99"));
    }

    #[test]
    fn lists_are_ordered_by_numeric_id() {
        let store = StateStore::open_in_memory().unwrap();
        for id in [10, 2, 1] {
            store.put_server(&Server::new(id, &format!("srv{id}"), None)).unwrap();
            store.put_instance(&Instance::new(id, "app_1", 1)).unwrap();
        }
        let ids: Vec<_> = store.list_servers().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        let ids: Vec<_> = store.list_instances().unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
    }

    #[test]
    fn instances_on_servers() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&Instance::new(1, "a_1", 1)).unwrap();
        store.put_instance(&Instance::new(2, "a_2", 2)).unwrap();
        store.put_instance(&Instance::new(3, "b_1", 3)).unwrap();

        let on = store.list_instances_on_servers(&[1, 3]).unwrap();
        let ids: Vec<_> = on.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);

        assert!(store.delete_instance(2).unwrap());
        assert!(store.get_instance(2).unwrap().is_none());
    }

    #[test]
    fn entities_are_scoped_by_type() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_entity(&ExternalEntity::load_balancer("1", "srv01_app", "be_app"))
            .unwrap();
        store
            .put_entity(&ExternalEntity::service_registry("1", "APP", "srv01:app:8080"))
            .unwrap();

        let lb = store.list_entities(EntityType::LoadBalancerServer).unwrap();
        assert_eq!(lb.len(), 1);
        assert_eq!(lb[0].name, "srv01_app");

        let reg = store
            .get_entity(EntityType::ServiceRegistryInstance, "1")
            .unwrap()
            .unwrap();
        assert_eq!(reg.service_name(), Some("APP"));

        assert!(store.delete_entity(EntityType::LoadBalancerServer, "1").unwrap());
        assert!(store.list_entities(EntityType::LoadBalancerServer).unwrap().is_empty());
    }

    // ── Mapping writes ─────────────────────────────────────────────

    #[test]
    fn write_commits_mapping_and_history() {
        let store = StateStore::open_in_memory().unwrap();
        let mapping = test_mapping(1, 5, "42");

        let history_id = store
            .write(|w| {
                w.put_mapping(&mapping)?;
                w.append_history(test_history(&mapping, HistoryAction::Created))
            })
            .map_err(|e: StateError| e)
            .unwrap();
        assert_eq!(history_id, 1);

        let active = store
            .active_mappings_for_entity(EntityType::LoadBalancerServer, "42")
            .unwrap();
        assert_eq!(active, vec![mapping.clone()]);
        assert_eq!(store.active_mappings_for_instance(5).unwrap().len(), 1);

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mapping_id, Some(1));
    }

    #[test]
    fn write_rolls_back_on_error() {
        let store = StateStore::open_in_memory().unwrap();
        let mapping = test_mapping(1, 5, "42");

        let result: StateResult<()> = store.write(|w| {
            w.put_mapping(&mapping)?;
            Err(StateError::Write("aborted by caller".to_string()))
        });
        assert!(result.is_err());
        assert!(store.list_mappings().unwrap().is_empty());
    }

    #[test]
    fn sequences_are_monotonic_across_transactions() {
        let store = StateStore::open_in_memory().unwrap();
        let first: u64 = store
            .write(|w| w.next_id(SEQ_MAPPING))
            .map_err(|e: StateError| e)
            .unwrap();
        let second: u64 = store
            .write(|w| w.next_id(SEQ_MAPPING))
            .map_err(|e: StateError| e)
            .unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn active_filter_and_find() {
        let store = StateStore::open_in_memory().unwrap();
        let active = test_mapping(1, 5, "42");
        let mut inactive = test_mapping(2, 6, "42");
        inactive.is_active = false;

        store
            .write(|w| {
                w.put_mapping(&active)?;
                w.put_mapping(&inactive)?;
                assert_eq!(w.active_for_entity(EntityType::LoadBalancerServer, "42")?.len(), 1);
                assert_eq!(
                    w.find(EntityType::LoadBalancerServer, "42", 6)?,
                    Some(inactive.clone())
                );
                Ok::<_, StateError>(())
            })
            .unwrap();

        // Entity "4" must not pick up rows of entity "42".
        assert!(store
            .active_mappings_for_entity(EntityType::LoadBalancerServer, "4")
            .unwrap()
            .is_empty());
        assert_eq!(store.list_mappings_of_type(EntityType::LoadBalancerServer).unwrap().len(), 2);
        assert!(store
            .list_mappings_of_type(EntityType::ServiceRegistryInstance)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn hard_delete_unlinks_history() {
        let store = StateStore::open_in_memory().unwrap();
        let mapping = test_mapping(1, 5, "42");

        store
            .write(|w| {
                w.put_mapping(&mapping)?;
                w.append_history(test_history(&mapping, HistoryAction::Created))?;
                Ok::<_, StateError>(())
            })
            .unwrap();

        let deleted = store
            .write(|w| {
                let existed = w.delete_mapping(&mapping)?;
                let mut record = test_history(&mapping, HistoryAction::Deleted);
                record.mapping_id = None;
                w.append_history(record)?;
                Ok::<_, StateError>(existed)
            })
            .unwrap();
        assert!(deleted);
        assert!(store.list_mappings().unwrap().is_empty());

        let history = store
            .history_for_entity(EntityType::LoadBalancerServer, "42")
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|h| h.mapping_id.is_none()));
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[1].action, HistoryAction::Deleted);
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let store = StateStore::open_in_memory().unwrap();
        let mapping = test_mapping(1, 5, "42");
        store
            .write(|w| {
                for action in [
                    HistoryAction::Created,
                    HistoryAction::Deactivated,
                    HistoryAction::Updated,
                ] {
                    w.append_history(test_history(&mapping, action))?;
                }
                Ok::<_, StateError>(())
            })
            .unwrap();

        let latest = store.history(2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].action, HistoryAction::Updated);
        assert_eq!(latest[0].id, 3);
        assert_eq!(latest[1].action, HistoryAction::Deactivated);

        assert!(store.history(0).unwrap().is_empty());
        assert_eq!(store.history(10).unwrap().len(), 3);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_server(&Server::new(1, "srv01", None)).unwrap();
            store
                .write(|w| w.put_mapping(&test_mapping(1, 5, "42")))
                .map_err(|e: StateError| e)
                .unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_server(1).unwrap().unwrap().name, "srv01");
        assert_eq!(store.list_mappings().unwrap().len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_servers().unwrap().is_empty());
        assert!(store.list_instances().unwrap().is_empty());
        assert!(store.list_entities(EntityType::LoadBalancerServer).unwrap().is_empty());
        assert!(store.list_mappings().unwrap().is_empty());
        assert!(store.history(10).unwrap().is_empty());
        assert!(!store.delete_instance(1).unwrap());
        assert!(!store.delete_entity(EntityType::LoadBalancerServer, "x").unwrap());
    }
}
