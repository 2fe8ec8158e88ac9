//! The mapping reconciler.
//!
//! Wraps a [`StateStore`] and keeps each external entity associated with at
//! most one active instance. Every multi-row change runs inside one
//! [`StateStore::write`] transaction, so a failure leaves the entity exactly
//! as it was.

use std::collections::{BTreeMap, HashMap};

use rollgrid_core::{MappingSettings, SharedClock};
use rollgrid_state::tables::SEQ_MAPPING;
use rollgrid_state::{
    EntityType, ExternalEntity, HistoryAction, InstanceId, Mapping, MappingHistory, MappingWriter,
    SoftDelete, StateResult, StateStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MappingError, MappingResult};
use crate::strategy::{FleetSnapshot, MatchStrategy, StrategyMatch, find_match};

/// Actor recorded for automatic changes.
pub const SYSTEM_ACTOR: &str = "system";

/// Result of reconciling one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The entity carries a manual mapping; nothing was changed.
    Pinned { mapping: Mapping },
    /// A strategy found an instance. `written` is false when the active
    /// mapping already pointed there.
    Matched {
        mapping: Mapping,
        strategy: MatchStrategy,
        written: bool,
    },
    /// No strategy matched, but the existing automatic mapping still
    /// points at a live instance and stays active.
    Kept { mapping: Mapping },
    /// No strategy found a unique candidate.
    Unmapped,
}

impl ReconcileOutcome {
    pub fn mapping(&self) -> Option<&Mapping> {
        match self {
            ReconcileOutcome::Pinned { mapping }
            | ReconcileOutcome::Matched { mapping, .. }
            | ReconcileOutcome::Kept { mapping } => Some(mapping),
            ReconcileOutcome::Unmapped => None,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, ReconcileOutcome::Unmapped)
    }
}

/// Counters returned by [`Reconciler::remap_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// Mapping coverage for one entity type. Removed entities are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub total: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub manual: usize,
    pub automatic: usize,
}

/// Attributes of a mapping row about to be activated.
struct Activation<'a> {
    instance_id: InstanceId,
    manual: bool,
    actor: &'a str,
    notes: Option<String>,
    metadata: BTreeMap<String, String>,
    reason: &'a str,
}

pub struct Reconciler {
    store: StateStore,
    settings: MappingSettings,
    clock: SharedClock,
}

impl Reconciler {
    pub fn new(store: StateStore, settings: MappingSettings, clock: SharedClock) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    /// Reconcile one entity against the current live inventory.
    pub fn reconcile(&self, entity: &ExternalEntity) -> MappingResult<ReconcileOutcome> {
        let fleet = FleetSnapshot::load(&self.store)?;
        self.reconcile_in(&fleet, entity)
    }

    /// Load an entity by id and reconcile it.
    pub fn reconcile_id(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> MappingResult<ReconcileOutcome> {
        let entity = self.load_entity(entity_type, entity_id)?;
        self.reconcile(&entity)
    }

    fn reconcile_in(
        &self,
        fleet: &FleetSnapshot,
        entity: &ExternalEntity,
    ) -> MappingResult<ReconcileOutcome> {
        let entity_type = entity.entity_type();
        let entity_id = entity.entity_id.as_str();

        let current = self.store.active_mappings_for_entity(entity_type, entity_id)?;
        if let Some(pinned) = current.iter().find(|m| m.is_manual) {
            debug!(%entity_type, entity_id, instance_id = pinned.instance_id, "manual mapping; skipping");
            return Ok(ReconcileOutcome::Pinned {
                mapping: pinned.clone(),
            });
        }
        if !entity.is_live() {
            debug!(%entity_type, entity_id, "entity removed; skipping");
            return Ok(ReconcileOutcome::Unmapped);
        }

        let Some(found) = find_match(entity, fleet, &self.settings) else {
            debug!(%entity_type, entity_id, "no match");
            return match self.retire_stale(fleet, entity_type, entity_id, current)? {
                Some(mapping) => Ok(ReconcileOutcome::Kept { mapping }),
                None => Ok(ReconcileOutcome::Unmapped),
            };
        };

        let now = self.clock.now_secs();
        self.store.write(|w| -> MappingResult<ReconcileOutcome> {
            let current = w.active_for_entity(entity_type, entity_id)?;
            if let Some(pinned) = current.iter().find(|m| m.is_manual) {
                debug!(%entity_type, entity_id, "manual mapping appeared; skipping");
                return Ok(ReconcileOutcome::Pinned {
                    mapping: pinned.clone(),
                });
            }

            let keep = current
                .iter()
                .find(|m| m.instance_id == found.instance_id)
                .cloned();
            let stale: Vec<&Mapping> = current
                .iter()
                .filter(|m| m.instance_id != found.instance_id)
                .collect();

            if let Some(existing) = &keep {
                if stale.is_empty() {
                    debug!(%entity_type, entity_id, instance_id = existing.instance_id, "mapping unchanged");
                    return Ok(ReconcileOutcome::Matched {
                        mapping: existing.clone(),
                        strategy: found.strategy,
                        written: false,
                    });
                }
            }

            for mapping in stale {
                deactivate(w, mapping, SYSTEM_ACTOR, now, "superseded by automatic match")?;
            }
            let mapping = match keep {
                Some(existing) => existing,
                None => activate(
                    w,
                    entity_type,
                    entity_id,
                    Activation {
                        instance_id: found.instance_id,
                        manual: false,
                        actor: SYSTEM_ACTOR,
                        notes: None,
                        metadata: match_metadata(&found),
                        reason: "automatic match",
                    },
                    now,
                )?,
            };

            info!(
                %entity_type,
                entity_id,
                instance_id = mapping.instance_id,
                strategy = %found.strategy,
                "entity mapped"
            );
            Ok(ReconcileOutcome::Matched {
                mapping,
                strategy: found.strategy,
                written: true,
            })
        })
    }

    /// Deactivate automatic mappings whose instance is no longer live.
    /// Returns the mapping left active, if any. `current` is the entity's
    /// active set as last read; nothing is written when none of it is stale.
    fn retire_stale(
        &self,
        fleet: &FleetSnapshot,
        entity_type: EntityType,
        entity_id: &str,
        current: Vec<Mapping>,
    ) -> MappingResult<Option<Mapping>> {
        let (kept, stale) = split_stale(fleet, current);
        if stale.is_empty() {
            return Ok(kept);
        }

        let now = self.clock.now_secs();
        self.store.write(|w| -> MappingResult<Option<Mapping>> {
            let (kept, stale) = split_stale(fleet, w.active_for_entity(entity_type, entity_id)?);
            for mapping in &stale {
                deactivate(w, mapping, SYSTEM_ACTOR, now, "instance removed")?;
                info!(%entity_type, entity_id, instance_id = mapping.instance_id, "stale mapping deactivated");
            }
            Ok(kept)
        })
    }

    /// Operator override. With an instance, pins the entity to it; with
    /// `None`, deactivates every mapping of the entity without reconciling.
    pub fn set_manual_mapping(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        instance_id: Option<InstanceId>,
        actor: &str,
        note: Option<&str>,
    ) -> MappingResult<Option<Mapping>> {
        let now = self.clock.now_secs();
        self.store.write(|w| -> MappingResult<Option<Mapping>> {
            let Some(entity) = w.entity(entity_type, entity_id)? else {
                return Err(MappingError::entity_not_found(entity_type, entity_id));
            };
            let current = w.active_for_entity(entity_type, entity_id)?;

            let Some(instance_id) = instance_id else {
                for mapping in &current {
                    deactivate(w, mapping, actor, now, "manually unmapped")?;
                }
                info!(%entity_type, entity_id, actor, "entity manually unmapped");
                return Ok(None);
            };

            if !entity.is_live() {
                return Err(MappingError::entity_not_found(entity_type, entity_id));
            }
            let instance_live = match w.instance(instance_id)? {
                Some(instance) if instance.is_live() => w
                    .server(instance.server_id)?
                    .is_some_and(|server| server.is_live()),
                _ => false,
            };
            if !instance_live {
                return Err(MappingError::InstanceNotFound(instance_id));
            }
            for mapping in current.iter().filter(|m| m.instance_id != instance_id) {
                deactivate(w, mapping, actor, now, "superseded by manual mapping")?;
            }
            let mapping = activate(
                w,
                entity_type,
                entity_id,
                Activation {
                    instance_id,
                    manual: true,
                    actor,
                    notes: note.map(str::to_string),
                    metadata: BTreeMap::from([("strategy".to_string(), "manual".to_string())]),
                    reason: "manual mapping",
                },
                now,
            )?;
            info!(%entity_type, entity_id, instance_id, actor, "entity pinned");
            Ok(Some(mapping))
        })
    }

    /// Drop the manual flag from the entity's active mapping, then reconcile.
    pub fn clear_manual_mapping(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        actor: &str,
    ) -> MappingResult<ReconcileOutcome> {
        let entity = self.load_entity(entity_type, entity_id)?;
        let now = self.clock.now_secs();

        self.store.write(|w| -> MappingResult<()> {
            for before in w.active_for_entity(entity_type, entity_id)? {
                if !before.is_manual {
                    continue;
                }
                let mut after = before.clone();
                after.is_manual = false;
                w.put_mapping(&after)?;
                w.append_history(record(
                    HistoryAction::Updated,
                    &after,
                    Some(before),
                    actor,
                    now,
                    "manual flag cleared",
                ))?;
            }
            Ok(())
        })?;
        info!(%entity_type, entity_id, actor, "manual flag cleared");

        self.reconcile(&entity)
    }

    /// Hard-delete one mapping row. History keeps the record with its
    /// mapping link cleared.
    pub fn delete_mapping(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        instance_id: InstanceId,
        actor: &str,
    ) -> MappingResult<Mapping> {
        let now = self.clock.now_secs();
        self.store.write(|w| -> MappingResult<Mapping> {
            let Some(mapping) = w.find(entity_type, entity_id, instance_id)? else {
                return Err(MappingError::MappingNotFound {
                    entity_type,
                    entity_id: entity_id.to_string(),
                    instance_id,
                });
            };
            w.delete_mapping(&mapping)?;
            let mut entry = record(
                HistoryAction::Deleted,
                &mapping,
                Some(mapping.clone()),
                actor,
                now,
                "mapping deleted",
            );
            entry.mapping_id = None;
            entry.after = None;
            w.append_history(entry)?;
            info!(%entity_type, entity_id, instance_id, actor, "mapping deleted");
            Ok(mapping)
        })
    }

    /// Reconcile every live, currently unmapped entity of one type. A
    /// failing entity is counted and logged; the rest are still processed.
    pub fn remap_all(&self, entity_type: EntityType) -> MappingResult<RemapSummary> {
        let fleet = FleetSnapshot::load(&self.store)?;
        let pending = self.list_unmapped(entity_type)?;
        Ok(remap_each(entity_type, &pending, |entity| {
            self.reconcile_in(&fleet, entity)
        }))
    }

    /// Live entities of one type without an active mapping.
    pub fn list_unmapped(&self, entity_type: EntityType) -> MappingResult<Vec<ExternalEntity>> {
        let active = self.active_by_entity(entity_type)?;
        Ok(self
            .store
            .list_entities(entity_type)?
            .into_iter()
            .filter(|e| e.is_live() && !active.contains_key(&e.entity_id))
            .collect())
    }

    pub fn stats(&self, entity_type: EntityType) -> MappingResult<MappingStats> {
        let active = self.active_by_entity(entity_type)?;
        let mut stats = MappingStats::default();

        for entity in self.store.list_entities(entity_type)? {
            if !entity.is_live() {
                continue;
            }
            stats.total += 1;
            match active.get(&entity.entity_id) {
                None => stats.unmapped += 1,
                Some(manual) => {
                    stats.mapped += 1;
                    if *manual {
                        stats.manual += 1;
                    } else {
                        stats.automatic += 1;
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Entity ids with an active mapping, and whether any of them is manual.
    fn active_by_entity(&self, entity_type: EntityType) -> StateResult<HashMap<String, bool>> {
        let mut active: HashMap<String, bool> = HashMap::new();
        for mapping in self.store.list_mappings_of_type(entity_type)? {
            if mapping.is_active {
                *active.entry(mapping.entity_id).or_default() |= mapping.is_manual;
            }
        }
        Ok(active)
    }

    fn load_entity(&self, entity_type: EntityType, entity_id: &str) -> MappingResult<ExternalEntity> {
        self.store
            .get_entity(entity_type, entity_id)?
            .ok_or_else(|| MappingError::entity_not_found(entity_type, entity_id))
    }
}

/// Run `reconcile` over every entity, tallying outcomes. Errors are
/// counted and logged, never propagated.
fn remap_each<F>(entity_type: EntityType, pending: &[ExternalEntity], mut reconcile: F) -> RemapSummary
where
    F: FnMut(&ExternalEntity) -> MappingResult<ReconcileOutcome>,
{
    let mut summary = RemapSummary::default();

    for entity in pending {
        summary.attempted += 1;
        match reconcile(entity) {
            Ok(ReconcileOutcome::Unmapped | ReconcileOutcome::Kept { .. }) => summary.unmatched += 1,
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(%entity_type, entity_id = %entity.entity_id, error = %e, "reconcile failed");
            }
        }
    }

    info!(
        %entity_type,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        unmatched = summary.unmatched,
        failed = summary.failed,
        "remap finished"
    );
    summary
}

/// Split an entity's active mappings into the one to keep and the
/// automatic ones pointing at instances that are gone.
fn split_stale(fleet: &FleetSnapshot, current: Vec<Mapping>) -> (Option<Mapping>, Vec<Mapping>) {
    let mut kept = None;
    let mut stale = Vec::new();
    for mapping in current {
        if mapping.is_automatic() && !fleet.is_live_instance(mapping.instance_id) {
            stale.push(mapping);
        } else if kept.is_none() {
            kept = Some(mapping);
        }
    }
    (kept, stale)
}

fn match_metadata(found: &StrategyMatch) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::from([("strategy".to_string(), found.strategy.to_string())]);
    if let Some(score) = found.score {
        metadata.insert("score".to_string(), format!("{score:.3}"));
    }
    metadata
}

/// Create the row for (entity, instance), or reactivate and update the
/// existing one.
fn activate(
    w: &MappingWriter,
    entity_type: EntityType,
    entity_id: &str,
    activation: Activation<'_>,
    now: u64,
) -> StateResult<Mapping> {
    match w.find(entity_type, entity_id, activation.instance_id)? {
        Some(before) => {
            let after = Mapping {
                is_manual: activation.manual,
                mapped_by: activation.actor.to_string(),
                mapped_at: now,
                notes: activation.notes.or_else(|| before.notes.clone()),
                is_active: true,
                metadata: activation.metadata,
                ..before.clone()
            };
            w.put_mapping(&after)?;
            w.append_history(record(
                HistoryAction::Updated,
                &after,
                Some(before),
                activation.actor,
                now,
                activation.reason,
            ))?;
            Ok(after)
        }
        None => {
            let mapping = Mapping {
                id: w.next_id(SEQ_MAPPING)?,
                instance_id: activation.instance_id,
                entity_type,
                entity_id: entity_id.to_string(),
                is_manual: activation.manual,
                mapped_by: activation.actor.to_string(),
                mapped_at: now,
                notes: activation.notes,
                is_active: true,
                metadata: activation.metadata,
            };
            w.put_mapping(&mapping)?;
            w.append_history(record(
                HistoryAction::Created,
                &mapping,
                None,
                activation.actor,
                now,
                activation.reason,
            ))?;
            Ok(mapping)
        }
    }
}

fn deactivate(
    w: &MappingWriter,
    mapping: &Mapping,
    actor: &str,
    now: u64,
    reason: &str,
) -> StateResult<()> {
    let mut after = mapping.clone();
    after.is_active = false;
    w.put_mapping(&after)?;
    w.append_history(record(
        HistoryAction::Deactivated,
        &after,
        Some(mapping.clone()),
        actor,
        now,
        reason,
    ))?;
    Ok(())
}

/// History entry for `after`, the state of the row once the change applies.
fn record(
    action: HistoryAction,
    after: &Mapping,
    before: Option<Mapping>,
    actor: &str,
    now: u64,
    reason: &str,
) -> MappingHistory {
    MappingHistory {
        id: 0,
        mapping_id: Some(after.id),
        instance_id: after.instance_id,
        entity_type: after.entity_type,
        entity_id: after.entity_id.clone(),
        action,
        before,
        after: Some(after.clone()),
        changed_by: actor.to_string(),
        changed_at: now,
        reason: reason.to_string(),
    }
}
