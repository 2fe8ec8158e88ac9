//! Read-only lookups the assembler needs: instances, their servers, and the
//! load-balancer pool member currently fronting each instance.

use rollgrid_state::{
    EntityType, ExternalEntity, Instance, InstanceId, Server, ServerId, SoftDelete, StateResult,
    StateStore,
};

use crate::batch::BatchMember;
use crate::error::{RolloutError, RolloutResult};
use crate::strategy::RolloutStrategy;

/// One instance to update, with the records needed to name and drain it.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutTarget {
    pub instance: Instance,
    pub server: Server,
    /// Active load-balancer pool member, if the instance is mapped to one.
    pub member: Option<ExternalEntity>,
}

impl RolloutTarget {
    /// Composite target identifier for the given strategy.
    ///
    /// Plain targets are `server::instance`. Load-balancer-aware targets
    /// append the pool member name, or `server_instance` when the instance
    /// has no mapped member.
    pub fn composite_id(&self, strategy: RolloutStrategy) -> String {
        let server = self.server.short_name();
        let instance = &self.instance.name;
        match (strategy, &self.member) {
            (RolloutStrategy::Plain, _) => format!("{server}::{instance}"),
            (RolloutStrategy::LoadBalancerAware, Some(member)) => {
                format!("{server}::{instance}::{}", member.name)
            }
            (RolloutStrategy::LoadBalancerAware, None) => {
                format!("{server}::{instance}::{server}_{instance}")
            }
        }
    }
}

impl BatchMember for RolloutTarget {
    fn app_name(&self) -> &str {
        &self.instance.app_name
    }

    fn server_name(&self) -> &str {
        &self.server.name
    }
}

/// Source of inventory and mapping data for rollout assembly.
pub trait TargetDirectory {
    fn instance(&self, id: InstanceId) -> StateResult<Option<Instance>>;

    fn server(&self, id: ServerId) -> StateResult<Option<Server>>;

    /// The live load-balancer entity actively mapped to `instance_id`.
    fn load_balancer_member(&self, instance_id: InstanceId) -> StateResult<Option<ExternalEntity>>;

    /// Resolve a live instance together with its live server and pool member.
    fn target(&self, id: InstanceId) -> RolloutResult<RolloutTarget> {
        let instance = self
            .instance(id)?
            .filter(|i| i.is_live())
            .ok_or(RolloutError::InstanceNotFound(id))?;
        let server = self
            .server(instance.server_id)?
            .filter(|s| s.is_live())
            .ok_or(RolloutError::ServerNotFound(instance.server_id))?;
        let member = self.load_balancer_member(id)?;
        Ok(RolloutTarget {
            instance,
            server,
            member,
        })
    }
}

impl TargetDirectory for StateStore {
    fn instance(&self, id: InstanceId) -> StateResult<Option<Instance>> {
        self.get_instance(id)
    }

    fn server(&self, id: ServerId) -> StateResult<Option<Server>> {
        self.get_server(id)
    }

    /// Several active rows can exist for one instance across pools; the
    /// most recently mapped live entity wins.
    fn load_balancer_member(&self, instance_id: InstanceId) -> StateResult<Option<ExternalEntity>> {
        let mut mappings: Vec<_> = self
            .active_mappings_for_instance(instance_id)?
            .into_iter()
            .filter(|m| m.entity_type == EntityType::LoadBalancerServer)
            .collect();
        mappings.sort_by(|a, b| (b.mapped_at, b.id).cmp(&(a.mapped_at, a.id)));

        for mapping in mappings {
            let entity = self.get_entity(EntityType::LoadBalancerServer, &mapping.entity_id)?;
            if let Some(entity) = entity.filter(|e| e.is_live()) {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rollgrid_state::Mapping;

    use super::*;

    fn mapping(id: u64, entity_id: &str, instance_id: InstanceId, mapped_at: u64) -> Mapping {
        Mapping {
            id,
            instance_id,
            entity_type: EntityType::LoadBalancerServer,
            entity_id: entity_id.to_string(),
            is_manual: false,
            mapped_by: "system".to_string(),
            mapped_at,
            notes: None,
            is_active: true,
            metadata: BTreeMap::new(),
        }
    }

    fn store() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store.put_server(&Server::new(1, "srv01.dc1", None)).unwrap();
        store.put_instance(&Instance::new(10, "billing_1", 1)).unwrap();
        store
    }

    fn seed(store: &StateStore, mappings: &[Mapping]) {
        store
            .write(|w| -> StateResult<()> {
                for m in mappings {
                    w.put_mapping(m)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn composite_ids() {
        let mut target = RolloutTarget {
            instance: Instance::new(10, "billing_1", 1),
            server: Server::new(1, "srv01.dc1.example.com", None),
            member: None,
        };
        assert_eq!(target.composite_id(RolloutStrategy::Plain), "srv01::billing_1");
        assert_eq!(
            target.composite_id(RolloutStrategy::LoadBalancerAware),
            "srv01::billing_1::srv01_billing_1"
        );

        target.member = Some(ExternalEntity::load_balancer("7", "web_billing_a", "be"));
        assert_eq!(
            target.composite_id(RolloutStrategy::LoadBalancerAware),
            "srv01::billing_1::web_billing_a"
        );
        assert_eq!(target.composite_id(RolloutStrategy::Plain), "srv01::billing_1");
    }

    #[test]
    fn target_requires_live_instance_and_server() {
        let store = store();
        assert!(matches!(store.target(99), Err(RolloutError::InstanceNotFound(99))));

        store.put_instance(&Instance::new(11, "orphan_1", 5)).unwrap();
        assert!(matches!(store.target(11), Err(RolloutError::ServerNotFound(5))));

        let mut removed = Instance::new(12, "old_1", 1);
        removed.removed_at = Some(1);
        store.put_instance(&removed).unwrap();
        assert!(matches!(store.target(12), Err(RolloutError::InstanceNotFound(12))));

        let target = store.target(10).unwrap();
        assert_eq!(target.server.name, "srv01.dc1");
        assert!(target.member.is_none());
    }

    #[test]
    fn most_recent_live_member_wins() {
        let store = store();
        store
            .put_entity(&ExternalEntity::load_balancer("a", "member_a", "be"))
            .unwrap();
        store
            .put_entity(&ExternalEntity::load_balancer("b", "member_b", "be"))
            .unwrap();
        let mut gone = ExternalEntity::load_balancer("c", "member_c", "be");
        gone.removed_at = Some(9);
        store.put_entity(&gone).unwrap();

        seed(
            &store,
            &[
                mapping(1, "a", 10, 100),
                mapping(2, "b", 10, 200),
                mapping(3, "c", 10, 300),
            ],
        );

        let member = store.load_balancer_member(10).unwrap().unwrap();
        assert_eq!(member.entity_id, "b");
    }
}
