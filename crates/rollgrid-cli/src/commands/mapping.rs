//! Mapping commands: reconcile, remap, stats, pin/unpin and history.

use rollgrid_mapping::ReconcileOutcome;
use rollgrid_state::{EntityType, ExternalEntity, InstanceId, Mapping, MappingHistory};

use super::Context;

pub fn reconcile(ctx: &Context, entity_type: EntityType, entity_id: &str) -> anyhow::Result<()> {
    let outcome = ctx.reconciler()?.reconcile_id(entity_type, entity_id)?;
    ctx.emit(&outcome, print_outcome)
}

pub fn remap(ctx: &Context, entity_type: EntityType) -> anyhow::Result<()> {
    let summary = ctx.reconciler()?.remap_all(entity_type)?;
    ctx.emit(&summary, |s| {
        println!(
            "{entity_type}: attempted {}, mapped {}, unmatched {}, failed {}",
            s.attempted, s.succeeded, s.unmatched, s.failed
        );
    })
}

pub fn stats(ctx: &Context, entity_type: EntityType) -> anyhow::Result<()> {
    let stats = ctx.reconciler()?.stats(entity_type)?;
    ctx.emit(&stats, |s| {
        println!("{entity_type}");
        println!("  total:     {}", s.total);
        println!("  mapped:    {} ({} manual, {} automatic)", s.mapped, s.manual, s.automatic);
        println!("  unmapped:  {}", s.unmapped);
    })
}

pub fn unmapped(ctx: &Context, entity_type: EntityType) -> anyhow::Result<()> {
    let entities = ctx.reconciler()?.list_unmapped(entity_type)?;
    ctx.emit(&entities, |entities| {
        if entities.is_empty() {
            println!("No unmapped {entity_type} entities.");
        }
        for entity in entities {
            println!("{}", describe_entity(entity));
        }
    })
}

/// `pin` with an instance, `unmap` without one.
pub fn pin(
    ctx: &Context,
    entity_type: EntityType,
    entity_id: &str,
    instance_id: Option<InstanceId>,
    actor: &str,
    note: Option<&str>,
) -> anyhow::Result<()> {
    let mapping =
        ctx.reconciler()?
            .set_manual_mapping(entity_type, entity_id, instance_id, actor, note)?;
    ctx.emit(&mapping, |mapping| match mapping {
        Some(m) => println!("✓ Pinned {}", describe_mapping(m)),
        None => println!("✓ Unmapped {entity_type}/{entity_id}"),
    })
}

pub fn unpin(
    ctx: &Context,
    entity_type: EntityType,
    entity_id: &str,
    actor: &str,
) -> anyhow::Result<()> {
    let outcome = ctx
        .reconciler()?
        .clear_manual_mapping(entity_type, entity_id, actor)?;
    ctx.emit(&outcome, print_outcome)
}

pub fn history(ctx: &Context, limit: usize) -> anyhow::Result<()> {
    let records = ctx.open_store()?.history(limit)?;
    ctx.emit(&records, |records| {
        for record in records {
            println!("{}", describe_history(record));
        }
    })
}

fn print_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Pinned { mapping } => {
            println!("= Pinned (manual) {}", describe_mapping(mapping));
        }
        ReconcileOutcome::Matched {
            mapping,
            strategy,
            written,
        } => {
            let verb = if *written { "Mapped" } else { "Unchanged" };
            println!("✓ {verb} via {strategy}: {}", describe_mapping(mapping));
        }
        ReconcileOutcome::Kept { mapping } => {
            println!("~ No match; keeping {}", describe_mapping(mapping));
        }
        ReconcileOutcome::Unmapped => println!("✗ No match"),
    }
}

fn describe_mapping(m: &Mapping) -> String {
    format!("{}/{} -> instance {}", m.entity_type, m.entity_id, m.instance_id)
}

fn describe_entity(e: &ExternalEntity) -> String {
    let address = e.address.as_deref().unwrap_or("-");
    format!("{}  {}  {}", e.entity_id, e.name, address)
}

fn describe_history(h: &MappingHistory) -> String {
    format!(
        "#{} @{} {} {}/{} instance {} by {} ({})",
        h.id, h.changed_at, h.action, h.entity_type, h.entity_id, h.instance_id, h.changed_by, h.reason
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rollgrid_state::HistoryAction;

    use super::*;

    #[test]
    fn history_line() {
        let record = MappingHistory {
            id: 3,
            mapping_id: Some(1),
            instance_id: 10,
            entity_type: EntityType::LoadBalancerServer,
            entity_id: "m1".into(),
            action: HistoryAction::Deactivated,
            before: None,
            after: None,
            changed_by: "alice".into(),
            changed_at: 1_700_000_000,
            reason: "manually unmapped".into(),
        };
        assert_eq!(
            describe_history(&record),
            "#3 @1700000000 deactivated load_balancer_server/m1 instance 10 by alice (manually unmapped)"
        );
    }

    #[test]
    fn mapping_line() {
        let mapping = Mapping {
            id: 1,
            instance_id: 10,
            entity_type: EntityType::ServiceRegistryInstance,
            entity_id: "r1".into(),
            is_manual: false,
            mapped_by: "system".into(),
            mapped_at: 0,
            notes: None,
            is_active: true,
            metadata: BTreeMap::new(),
        };
        assert_eq!(
            describe_mapping(&mapping),
            "service_registry_instance/r1 -> instance 10"
        );
    }
}
