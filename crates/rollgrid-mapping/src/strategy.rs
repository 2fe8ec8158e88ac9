//! Matching strategies.
//!
//! Each strategy looks at one external entity and a [`FleetSnapshot`] of the
//! live inventory and either names exactly one instance or gives up. The
//! strategies never write; the reconciler decides what to do with a match.

use std::collections::HashMap;
use std::fmt;

use rollgrid_core::MappingSettings;
use rollgrid_state::{
    EntityType, ExternalEntity, Instance, InstanceId, Server, ServerId, SoftDelete, StateResult,
    StateStore, short_host, split_instance_suffix,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::similarity::name_score;

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Address,
    NamePattern,
    FuzzyName,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::Address => "address",
            MatchStrategy::NamePattern => "name_pattern",
            MatchStrategy::FuzzyName => "fuzzy_name",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate instance chosen by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyMatch {
    pub instance_id: InstanceId,
    pub strategy: MatchStrategy,
    /// Similarity score, fuzzy strategy only.
    pub score: Option<f64>,
}

impl StrategyMatch {
    fn new(instance_id: InstanceId, strategy: MatchStrategy) -> Self {
        Self {
            instance_id,
            strategy,
            score: None,
        }
    }
}

/// Live servers and instances, loaded once and shared across many
/// reconciliations.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    servers: HashMap<ServerId, Server>,
    instances: Vec<Instance>,
}

impl FleetSnapshot {
    /// Load the live inventory from the store.
    pub fn load(store: &StateStore) -> StateResult<Self> {
        let servers = store.list_servers()?;
        let live: Vec<ServerId> = servers.iter().filter(|s| s.is_live()).map(|s| s.id).collect();
        let instances = store.list_instances_on_servers(&live)?;
        Ok(Self::from_parts(servers, instances))
    }

    /// Build a snapshot from already-loaded records. Removed servers and
    /// instances, and instances on removed servers, are dropped here.
    pub fn from_parts(servers: Vec<Server>, instances: Vec<Instance>) -> Self {
        let servers: HashMap<ServerId, Server> = servers
            .into_iter()
            .filter(|s| s.is_live())
            .map(|s| (s.id, s))
            .collect();
        let instances = instances
            .into_iter()
            .filter(|i| i.is_live() && servers.contains_key(&i.server_id))
            .collect();
        Self { servers, instances }
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn server(&self, id: ServerId) -> Option<&Server> {
        self.servers.get(&id)
    }

    pub fn is_live_instance(&self, id: InstanceId) -> bool {
        self.instances.iter().any(|i| i.id == id)
    }

    fn instances_on<'a>(&'a self, server_ids: &'a [ServerId]) -> impl Iterator<Item = &'a Instance> {
        self.instances
            .iter()
            .filter(move |i| server_ids.contains(&i.server_id))
    }
}

/// Run the strategy chain for one entity: address, then name pattern, then
/// (service registry only) fuzzy name.
pub fn find_match(
    entity: &ExternalEntity,
    fleet: &FleetSnapshot,
    settings: &MappingSettings,
) -> Option<StrategyMatch> {
    match_by_address(entity, fleet)
        .or_else(|| match_by_name_pattern(entity, fleet))
        .or_else(|| match entity.entity_type() {
            EntityType::ServiceRegistryInstance => match_by_fuzzy_name(entity, fleet, settings),
            EntityType::LoadBalancerServer => None,
        })
}

// ── Address ───────────────────────────────────────────────────────

/// Match on the registry discovery URL, then on `host[:port]`.
pub fn match_by_address(entity: &ExternalEntity, fleet: &FleetSnapshot) -> Option<StrategyMatch> {
    if let Some(url) = entity.discovery_url() {
        let wanted = normalize_url(url);
        let hits: Vec<&Instance> = fleet
            .instances()
            .iter()
            .filter(|i| i.discovery_url.as_deref().map(normalize_url) == Some(wanted.clone()))
            .collect();
        if let Some(instance) = single(entity, MatchStrategy::Address, &hits) {
            return Some(StrategyMatch::new(instance.id, MatchStrategy::Address));
        }
    }

    let (host, port) = entity.host_port()?;
    let hits: Vec<&Instance> = fleet
        .instances()
        .iter()
        .filter(|i| i.ip.as_deref() == Some(host))
        .filter(|i| port.is_none() || i.port == port)
        .collect();
    single(entity, MatchStrategy::Address, &hits)
        .map(|instance| StrategyMatch::new(instance.id, MatchStrategy::Address))
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

// ── Name pattern ──────────────────────────────────────────────────

/// An entity display name decomposed as `host_app[_N]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberName<'a> {
    pub host: &'a str,
    pub app: &'a str,
    /// Trailing instance number; 0 when absent.
    pub number: u32,
    has_number: bool,
}

impl<'a> MemberName<'a> {
    /// Parse `srv01_billing_2`. The host is everything before the first `_`;
    /// both host and app must be non-empty.
    pub fn parse(name: &'a str) -> Option<Self> {
        let (rest, number) = split_instance_suffix(name.trim());
        let (host, app) = rest.split_once('_')?;
        if host.is_empty() || app.is_empty() {
            return None;
        }
        Some(Self {
            host,
            app,
            number: number.unwrap_or(0),
            has_number: number.is_some(),
        })
    }

    /// Instance names to look for, in order: `app_N`, then bare `app` when
    /// N is nonzero. Without a suffix only `app` is tried.
    pub fn candidate_names(&self) -> Vec<String> {
        if !self.has_number {
            return vec![self.app.to_string()];
        }
        let mut names = vec![format!("{}_{}", self.app, self.number)];
        if self.number != 0 {
            names.push(self.app.to_string());
        }
        names
    }
}

/// Match on the `host_app[_N]` convention for pool member names.
pub fn match_by_name_pattern(
    entity: &ExternalEntity,
    fleet: &FleetSnapshot,
) -> Option<StrategyMatch> {
    let member = MemberName::parse(&entity.name)?;
    let server_ids = servers_for_host(fleet, member.host);
    if server_ids.is_empty() {
        debug!(entity_id = %entity.entity_id, host = member.host, "no server matches member host");
        return None;
    }

    for candidate in member.candidate_names() {
        let hits: Vec<&Instance> = fleet
            .instances_on(&server_ids)
            .filter(|i| i.name == candidate)
            .collect();
        if hits.is_empty() {
            continue;
        }
        return single(entity, MatchStrategy::NamePattern, &hits)
            .map(|instance| StrategyMatch::new(instance.id, MatchStrategy::NamePattern));
    }
    None
}

/// Servers whose name contains `host`. When some of them have exactly that
/// short name, only those are returned.
fn servers_for_host(fleet: &FleetSnapshot, host: &str) -> Vec<ServerId> {
    let host = host.to_ascii_lowercase();
    let mut containing: Vec<&Server> = fleet
        .servers
        .values()
        .filter(|s| s.name.to_ascii_lowercase().contains(&host))
        .collect();
    containing.sort_by_key(|s| s.id);

    let exact: Vec<ServerId> = containing
        .iter()
        .filter(|s| short_host(&s.name).eq_ignore_ascii_case(&host))
        .map(|s| s.id)
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    containing.into_iter().map(|s| s.id).collect()
}

// ── Fuzzy name ────────────────────────────────────────────────────

/// Best name-similarity match among instances on the server whose address
/// equals the entity's host.
pub fn match_by_fuzzy_name(
    entity: &ExternalEntity,
    fleet: &FleetSnapshot,
    settings: &MappingSettings,
) -> Option<StrategyMatch> {
    let service = entity.service_name()?;
    let (host, _) = entity.host_port()?;

    let server_ids: Vec<ServerId> = fleet
        .servers
        .values()
        .filter(|s| s.address.as_deref() == Some(host))
        .map(|s| s.id)
        .collect();

    let mut best: Option<(f64, &Instance)> = None;
    for instance in fleet.instances_on(&server_ids) {
        let score = name_score(service, &instance.name, settings.fuzzy_containment_bonus);
        let better = match best {
            None => true,
            Some((top, current)) => {
                score > top || (score == top && instance.id < current.id)
            }
        };
        if better {
            best = Some((score, instance));
        }
    }

    let (score, instance) = best?;
    if score < settings.fuzzy_min_score {
        debug!(
            entity_id = %entity.entity_id,
            instance_id = instance.id,
            score,
            "best fuzzy candidate below threshold"
        );
        return None;
    }
    Some(StrategyMatch {
        instance_id: instance.id,
        strategy: MatchStrategy::FuzzyName,
        score: Some(score),
    })
}

/// The only element of `hits`, or `None` (with a warning when ambiguous).
fn single<'a>(
    entity: &ExternalEntity,
    strategy: MatchStrategy,
    hits: &[&'a Instance],
) -> Option<&'a Instance> {
    match hits {
        [one] => Some(*one),
        [] => None,
        many => {
            warn!(
                entity_type = %entity.entity_type(),
                entity_id = %entity.entity_id,
                %strategy,
                candidates = many.len(),
                "ambiguous match; leaving unmapped"
            );
            None
        }
    }
}
