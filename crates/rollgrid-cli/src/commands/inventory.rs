//! `rollgrid import`: load a TOML inventory snapshot into the store.
//!
//! ```toml
//! [[servers]]
//! id = 1
//! name = "srv01.dc1.example.com"
//! address = "10.0.0.1"
//!
//! [[instances]]
//! id = 10
//! name = "billing_1"
//! server_id = 1
//! ip = "10.0.0.1"
//! port = 8080
//!
//! [[load_balancer]]
//! entity_id = "lb1/be_billing/srv01_billing_1"
//! name = "srv01_billing_1"
//! backend = "be_billing"
//! api_url = "http://lb1:5555/v3"
//!
//! [[registry]]
//! entity_id = "BILLING/srv01:billing:8080"
//! service_name = "BILLING"
//! instance_id = "srv01:billing:8080"
//! address = "10.0.0.1:8080"
//! ```

use std::path::Path;

use anyhow::Context as _;
use rollgrid_state::{ExternalEntity, Instance, InstanceId, Server, ServerId, StateStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Context;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
    #[serde(default)]
    pub load_balancer: Vec<LoadBalancerRecord>,
    #[serde(default)]
    pub registry: Vec<RegistryRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub name: String,
    pub address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub removed_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub name: String,
    pub server_id: ServerId,
    /// Defaults to the name without its `_N` suffix.
    pub app_name: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub discovery_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub removed_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LoadBalancerRecord {
    pub entity_id: String,
    pub name: String,
    pub backend: String,
    pub address: Option<String>,
    pub api_url: Option<String>,
    pub removed_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RegistryRecord {
    pub entity_id: String,
    pub service_name: String,
    pub instance_id: String,
    pub address: Option<String>,
    pub discovery_url: Option<String>,
    pub removed_at: Option<u64>,
}

/// Counts of records written by an import.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub servers: usize,
    pub instances: usize,
    pub entities: usize,
}

impl Inventory {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn servers(&self) -> impl Iterator<Item = Server> + '_ {
        self.servers.iter().map(|r| {
            let mut server = Server::new(r.id, &r.name, r.address.as_deref());
            server.tags = r.tags.clone();
            server.removed_at = r.removed_at;
            server
        })
    }

    pub fn instances(&self) -> impl Iterator<Item = Instance> + '_ {
        self.instances.iter().map(|r| {
            let mut instance = Instance::new(r.id, &r.name, r.server_id);
            if let Some(app_name) = &r.app_name {
                instance.app_name = app_name.clone();
            }
            instance.ip = r.ip.clone();
            instance.port = r.port;
            instance.discovery_url = r.discovery_url.clone();
            instance.tags = r.tags.clone();
            instance.removed_at = r.removed_at;
            instance
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = ExternalEntity> + '_ {
        let members = self.load_balancer.iter().map(|r| {
            let mut entity = ExternalEntity::load_balancer(&r.entity_id, &r.name, &r.backend);
            entity.address = r.address.clone();
            if let Some(url) = &r.api_url {
                entity = entity.with_url(url);
            }
            entity.removed_at = r.removed_at;
            entity
        });
        let registered = self.registry.iter().map(|r| {
            let mut entity =
                ExternalEntity::service_registry(&r.entity_id, &r.service_name, &r.instance_id);
            entity.address = r.address.clone();
            if let Some(url) = &r.discovery_url {
                entity = entity.with_url(url);
            }
            entity.removed_at = r.removed_at;
            entity
        });
        members.chain(registered)
    }

    /// Upsert every record. Existing rows with the same key are replaced.
    pub fn apply(&self, store: &StateStore) -> anyhow::Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for server in self.servers() {
            store.put_server(&server)?;
            summary.servers += 1;
        }
        for instance in self.instances() {
            store.put_instance(&instance)?;
            summary.instances += 1;
        }
        for entity in self.entities() {
            store.put_entity(&entity)?;
            summary.entities += 1;
        }
        Ok(summary)
    }
}

pub fn import(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let inventory = Inventory::from_file(file)?;
    let store = ctx.open_store()?;
    let summary = inventory.apply(&store)?;
    info!(
        servers = summary.servers,
        instances = summary.instances,
        entities = summary.entities,
        "inventory imported"
    );

    ctx.emit(&summary, |s| {
        println!(
            "✓ Imported {} server(s), {} instance(s), {} entit(y/ies)",
            s.servers, s.instances, s.entities
        );
    })
}

#[cfg(test)]
mod tests {
    use rollgrid_state::{EntityType, SoftDelete};

    use super::*;

    const SAMPLE: &str = r#"
[[servers]]
id = 1
name = "srv01.dc1.example.com"
address = "10.0.0.1"
tags = ["prod"]

[[instances]]
id = 10
name = "billing_1"
server_id = 1
ip = "10.0.0.1"
port = 8080

[[instances]]
id = 11
name = "legacy"
app_name = "billing"
server_id = 1
removed_at = 5

[[load_balancer]]
entity_id = "m1"
name = "srv01_billing_1"
backend = "be_billing"
api_url = "http://lb1:5555/v3"

[[registry]]
entity_id = "r1"
service_name = "BILLING"
instance_id = "srv01:billing:8080"
address = "10.0.0.1:8080"
"#;

    #[test]
    fn parses_and_applies_inventory() {
        let inventory: Inventory = toml::from_str(SAMPLE).unwrap();
        let store = StateStore::open_in_memory().unwrap();
        let summary = inventory.apply(&store).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                servers: 1,
                instances: 2,
                entities: 2,
            }
        );

        let server = store.get_server(1).unwrap().unwrap();
        assert_eq!(server.tags, vec!["prod"]);

        let billing = store.get_instance(10).unwrap().unwrap();
        assert_eq!(billing.app_name, "billing");
        assert_eq!(billing.port, Some(8080));

        let legacy = store.get_instance(11).unwrap().unwrap();
        assert_eq!(legacy.app_name, "billing");
        assert!(!legacy.is_live());

        let member = store
            .get_entity(EntityType::LoadBalancerServer, "m1")
            .unwrap()
            .unwrap();
        assert_eq!(member.backend(), Some(("be_billing", Some("http://lb1:5555/v3"))));

        let reg = store
            .get_entity(EntityType::ServiceRegistryInstance, "r1")
            .unwrap()
            .unwrap();
        assert_eq!(reg.host_port(), Some(("10.0.0.1", Some(8080))));
    }

    #[test]
    fn rejects_unknown_sections() {
        let err = toml::from_str::<Inventory>("[[routers]]\nid = 1\n").unwrap_err();
        assert!(err.to_string().contains("routers"));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let inventory = Inventory::from_file(&path).unwrap();
        assert_eq!(inventory.servers.len(), 1);
        assert_eq!(inventory.registry.len(), 1);

        assert!(Inventory::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
