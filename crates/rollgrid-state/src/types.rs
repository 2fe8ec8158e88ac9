//! Domain types for the rollgrid state store.
//!
//! Servers and instances are the fleet inventory; external entities are
//! the load-balancer pool members and service-registry instances that
//! front them; mappings associate the two. All types serialize to JSON
//! for storage in redb tables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rollgrid_core::Tagged;
use serde::{Deserialize, Serialize};

pub type ServerId = u64;
pub type InstanceId = u64;
pub type MappingId = u64;
pub type HistoryId = u64;

/// Soft-deletion marker shared by every inventory record.
///
/// `is_live` is the one predicate used by all candidate queries.
pub trait SoftDelete {
    fn removed_at(&self) -> Option<u64>;

    fn is_live(&self) -> bool {
        self.removed_at().is_none()
    }
}

// ── Server ────────────────────────────────────────────────────────

/// A host in the fleet inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub id: ServerId,
    /// Human name, often an FQDN (`srv01.dc1.example.com`).
    pub name: String,
    /// Network address (usually an IP).
    pub address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub removed_at: Option<u64>,
}

impl Server {
    pub fn new(id: ServerId, name: &str, address: Option<&str>) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: address.map(str::to_string),
            tags: Vec::new(),
            removed_at: None,
        }
    }

    /// Name up to the first `.` (`srv01.dc1.example.com` → `srv01`).
    pub fn short_name(&self) -> &str {
        short_host(&self.name)
    }
}

/// Host part of a possibly fully-qualified name.
pub fn short_host(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

impl SoftDelete for Server {
    fn removed_at(&self) -> Option<u64> {
        self.removed_at
    }
}

impl Tagged for Server {
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// One deployable unit of an application on one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    /// Instance name, e.g. `billing_2`.
    pub name: String,
    /// Logical application name shared by all replicas, e.g. `billing`.
    pub app_name: String,
    pub server_id: ServerId,
    pub ip: Option<String>,
    pub port: Option<u16>,
    /// URL advertised to the service registry, if any.
    pub discovery_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub removed_at: Option<u64>,
}

impl Instance {
    /// New instance whose application name is `name` without a trailing `_N`.
    pub fn new(id: InstanceId, name: &str, server_id: ServerId) -> Self {
        let (app_name, _) = split_instance_suffix(name);
        Self {
            id,
            name: name.to_string(),
            app_name: app_name.to_string(),
            server_id,
            ip: None,
            port: None,
            discovery_url: None,
            tags: Vec::new(),
            removed_at: None,
        }
    }

    pub fn with_endpoint(mut self, ip: &str, port: Option<u16>) -> Self {
        self.ip = Some(ip.to_string());
        self.port = port;
        self
    }

    pub fn with_discovery_url(mut self, url: &str) -> Self {
        self.discovery_url = Some(url.to_string());
        self
    }
}

/// Split `billing_2` into (`billing`, Some(2)); names without a numeric
/// suffix come back whole.
pub fn split_instance_suffix(name: &str) -> (&str, Option<u32>) {
    let Some((base, suffix)) = name.rsplit_once('_') else {
        return (name, None);
    };
    if base.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return (name, None);
    }
    match suffix.parse::<u32>() {
        Ok(number) => (base, Some(number)),
        Err(_) => (name, None),
    }
}

impl SoftDelete for Instance {
    fn removed_at(&self) -> Option<u64> {
        self.removed_at
    }
}

impl Tagged for Instance {
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

// ── External entities ─────────────────────────────────────────────

/// Kind of traffic-layer record an instance can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    LoadBalancerServer,
    ServiceRegistryInstance,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [
        EntityType::LoadBalancerServer,
        EntityType::ServiceRegistryInstance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::LoadBalancerServer => "load_balancer_server",
            EntityType::ServiceRegistryInstance => "service_registry_instance",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load_balancer_server" | "lb" | "haproxy" => Ok(EntityType::LoadBalancerServer),
            "service_registry_instance" | "registry" | "eureka" => {
                Ok(EntityType::ServiceRegistryInstance)
            }
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Type-specific attributes of an external entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetail {
    /// A member of a load-balancer backend pool.
    LoadBalancer {
        /// Backend / pool name.
        backend: String,
        /// API base URL of the load balancer hosting the pool.
        api_url: Option<String>,
    },
    /// An instance advertised by the service registry.
    ServiceRegistry {
        service_name: String,
        /// Registry-side instance id.
        instance_id: String,
        discovery_url: Option<String>,
    },
}

/// A load-balancer pool member or service-registry instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalEntity {
    pub entity_id: String,
    /// Display name: the pool member name, or the registry instance id.
    pub name: String,
    /// `host` or `host:port` when known.
    pub address: Option<String>,
    pub detail: EntityDetail,
    #[serde(default)]
    pub removed_at: Option<u64>,
}

impl ExternalEntity {
    pub fn load_balancer(entity_id: &str, name: &str, backend: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            name: name.to_string(),
            address: None,
            detail: EntityDetail::LoadBalancer {
                backend: backend.to_string(),
                api_url: None,
            },
            removed_at: None,
        }
    }

    pub fn service_registry(entity_id: &str, service_name: &str, instance_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            name: instance_id.to_string(),
            address: None,
            detail: EntityDetail::ServiceRegistry {
                service_name: service_name.to_string(),
                instance_id: instance_id.to_string(),
                discovery_url: None,
            },
            removed_at: None,
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Set the API URL (load balancer) or discovery URL (registry).
    pub fn with_url(mut self, url: &str) -> Self {
        match &mut self.detail {
            EntityDetail::LoadBalancer { api_url, .. } => *api_url = Some(url.to_string()),
            EntityDetail::ServiceRegistry { discovery_url, .. } => {
                *discovery_url = Some(url.to_string())
            }
        }
        self
    }

    pub fn entity_type(&self) -> EntityType {
        match self.detail {
            EntityDetail::LoadBalancer { .. } => EntityType::LoadBalancerServer,
            EntityDetail::ServiceRegistry { .. } => EntityType::ServiceRegistryInstance,
        }
    }

    /// Build the composite key for the entities table.
    pub fn table_key(&self) -> String {
        entity_key(self.entity_type(), &self.entity_id)
    }

    /// Service name for registry entities.
    pub fn service_name(&self) -> Option<&str> {
        match &self.detail {
            EntityDetail::ServiceRegistry { service_name, .. } => Some(service_name),
            EntityDetail::LoadBalancer { .. } => None,
        }
    }

    pub fn discovery_url(&self) -> Option<&str> {
        match &self.detail {
            EntityDetail::ServiceRegistry { discovery_url, .. } => discovery_url.as_deref(),
            EntityDetail::LoadBalancer { .. } => None,
        }
    }

    /// Backend name and API URL for load-balancer entities.
    pub fn backend(&self) -> Option<(&str, Option<&str>)> {
        match &self.detail {
            EntityDetail::LoadBalancer { backend, api_url } => {
                Some((backend.as_str(), api_url.as_deref()))
            }
            EntityDetail::ServiceRegistry { .. } => None,
        }
    }

    /// Split `address` into host and optional port.
    ///
    /// Accepts `host`, `host:port` and `[v6]:port`; a bare IPv6 address is
    /// returned whole as the host.
    pub fn host_port(&self) -> Option<(&str, Option<u16>)> {
        let address = self.address.as_deref()?.trim();
        if address.is_empty() {
            return None;
        }
        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return Some((host, port));
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => Some((host, Some(port))),
                Err(_) => Some((host, None)),
            },
            _ => Some((address, None)),
        }
    }
}

impl SoftDelete for ExternalEntity {
    fn removed_at(&self) -> Option<u64> {
        self.removed_at
    }
}

/// Key for the entities table.
pub fn entity_key(entity_type: EntityType, entity_id: &str) -> String {
    format!("{entity_type}/{entity_id}")
}

// ── Mapping ───────────────────────────────────────────────────────

/// Association between one instance and one external entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mapping {
    pub id: MappingId,
    pub instance_id: InstanceId,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Pinned by an operator; automatic reconciliation never overwrites it.
    pub is_manual: bool,
    pub mapped_by: String,
    pub mapped_at: u64,
    pub notes: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Mapping {
    /// Build the composite key for the mappings table.
    pub fn table_key(&self) -> String {
        mapping_key(self.entity_type, &self.entity_id, self.instance_id)
    }

    pub fn is_automatic(&self) -> bool {
        !self.is_manual
    }
}

/// Key for the mappings table.
pub fn mapping_key(entity_type: EntityType, entity_id: &str, instance_id: InstanceId) -> String {
    format!("{entity_type}/{entity_id}/{instance_id}")
}

// ── Mapping history ───────────────────────────────────────────────

/// What happened to a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Deactivated,
    Deleted,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Deactivated => "deactivated",
            HistoryAction::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Append-only audit record. Never consulted by matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingHistory {
    pub id: HistoryId,
    /// Cleared when the mapping row is hard-deleted.
    pub mapping_id: Option<MappingId>,
    pub instance_id: InstanceId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: HistoryAction,
    pub before: Option<Mapping>,
    pub after: Option<Mapping>,
    pub changed_by: String,
    pub changed_at: u64,
    pub reason: String,
}

impl MappingHistory {
    /// Build the key for the history table (sorts by id).
    pub fn table_key(&self) -> String {
        history_key(self.id)
    }
}

pub fn history_key(id: HistoryId) -> String {
    format!("{id:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_domain() {
        let server = Server::new(1, "srv01.dc1.example.com", None);
        assert_eq!(server.short_name(), "srv01");
        assert_eq!(short_host("plain"), "plain");
    }

    #[test]
    fn instance_suffix_split() {
        assert_eq!(split_instance_suffix("billing_2"), ("billing", Some(2)));
        assert_eq!(split_instance_suffix("my_app_10"), ("my_app", Some(10)));
        assert_eq!(split_instance_suffix("billing"), ("billing", None));
        assert_eq!(split_instance_suffix("billing_"), ("billing_", None));
        assert_eq!(split_instance_suffix("_3"), ("_3", None));
        assert_eq!(split_instance_suffix("app_v2"), ("app_v2", None));
    }

    #[test]
    fn instance_new_derives_app_name() {
        let inst = Instance::new(7, "jurws_1", 1);
        assert_eq!(inst.app_name, "jurws");
        assert!(inst.is_live());
    }

    #[test]
    fn entity_type_parse_and_display() {
        assert_eq!("lb".parse::<EntityType>(), Ok(EntityType::LoadBalancerServer));
        assert_eq!(
            "Service_Registry_Instance".parse::<EntityType>(),
            Ok(EntityType::ServiceRegistryInstance)
        );
        assert!("dns".parse::<EntityType>().is_err());
        assert_eq!(EntityType::LoadBalancerServer.to_string(), "load_balancer_server");
    }

    #[test]
    fn entity_host_port_forms() {
        let e = |addr: &str| ExternalEntity::load_balancer("1", "m", "b").with_address(addr);

        assert_eq!(e("10.0.0.1:8080").host_port(), Some(("10.0.0.1", Some(8080))));
        assert_eq!(e("10.0.0.1").host_port(), Some(("10.0.0.1", None)));
        assert_eq!(e("[fe80::1]:443").host_port(), Some(("fe80::1", Some(443))));
        assert_eq!(e("fe80::1").host_port(), Some(("fe80::1", None)));
        assert_eq!(e("host:http").host_port(), Some(("host", None)));
        assert_eq!(ExternalEntity::load_balancer("1", "m", "b").host_port(), None);
    }

    #[test]
    fn entity_detail_accessors() {
        let lb = ExternalEntity::load_balancer("7", "srv01_billing_2", "be_billing")
            .with_url("http://lb1:5555/v3");
        assert_eq!(lb.entity_type(), EntityType::LoadBalancerServer);
        assert_eq!(lb.backend(), Some(("be_billing", Some("http://lb1:5555/v3"))));
        assert_eq!(lb.service_name(), None);
        assert_eq!(lb.table_key(), "load_balancer_server/7");

        let reg = ExternalEntity::service_registry("r1", "BILLING", "srv01:billing:8080")
            .with_url("http://10.0.0.1:8080/");
        assert_eq!(reg.entity_type(), EntityType::ServiceRegistryInstance);
        assert_eq!(reg.service_name(), Some("BILLING"));
        assert_eq!(reg.discovery_url(), Some("http://10.0.0.1:8080/"));
        assert_eq!(reg.name, "srv01:billing:8080");
    }

    #[test]
    fn keys_are_stable() {
        assert_eq!(
            mapping_key(EntityType::ServiceRegistryInstance, "r1", 42),
            "service_registry_instance/r1/42"
        );
        assert_eq!(history_key(7), "00000000000000000007");
    }
}
