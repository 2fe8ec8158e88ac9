//! Store-backed target directory with a per-process server cache.
//!
//! A plan or assemble run looks up the same few servers once per instance;
//! the cache keeps those lookups off the database.

use std::cell::RefCell;
use std::time::Duration;

use rollgrid_core::{SharedClock, TtlCache, TtlCacheConfig};
use rollgrid_rollout::TargetDirectory;
use rollgrid_state::{ExternalEntity, Instance, InstanceId, Server, ServerId, StateResult, StateStore};
use tracing::debug;

pub struct CachedDirectory<'a> {
    store: &'a StateStore,
    servers: RefCell<TtlCache<ServerId, Server>>,
}

impl<'a> CachedDirectory<'a> {
    pub fn new(store: &'a StateStore, clock: SharedClock) -> Self {
        let config = TtlCacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 4096,
        };
        Self {
            store,
            servers: RefCell::new(TtlCache::new(config, clock)),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.servers.borrow().stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            "server cache"
        );
    }
}

impl TargetDirectory for CachedDirectory<'_> {
    fn instance(&self, id: InstanceId) -> StateResult<Option<Instance>> {
        self.store.get_instance(id)
    }

    fn server(&self, id: ServerId) -> StateResult<Option<Server>> {
        if let Some(server) = self.servers.borrow_mut().get(&id) {
            return Ok(Some(server.clone()));
        }
        let server = self.store.get_server(id)?;
        if let Some(server) = &server {
            self.servers.borrow_mut().insert(id, server.clone());
        }
        Ok(server)
    }

    fn load_balancer_member(&self, instance_id: InstanceId) -> StateResult<Option<ExternalEntity>> {
        self.store.load_balancer_member(instance_id)
    }
}
