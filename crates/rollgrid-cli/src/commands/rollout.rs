//! `plan` and `assemble`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use rollgrid_core::{SystemClock, Tagged};
use rollgrid_rollout::{
    Assembler, Invocation, OrchestrationRequest, RolloutStrategy, RolloutTarget, TargetDirectory,
    plan_batches, split_waves,
};
use rollgrid_state::{InstanceId, SoftDelete};
use serde::Serialize;

use super::Context;
use crate::directory::CachedDirectory;

#[derive(Debug, Serialize)]
struct PlanOutput {
    strategy: RolloutStrategy,
    order: Vec<String>,
    first_wave: Vec<String>,
    second_wave: Vec<String>,
}

pub fn plan(ctx: &Context, instance_ids: &[InstanceId], tags: &[String]) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let directory = CachedDirectory::new(&store, Arc::new(SystemClock));

    let ids: Vec<InstanceId> = if instance_ids.is_empty() {
        store
            .list_instances()?
            .into_iter()
            .filter(|i| i.is_live())
            .map(|i| i.id)
            .collect()
    } else {
        instance_ids.to_vec()
    };

    let mut targets = Vec::with_capacity(ids.len());
    for id in ids {
        let target = directory.target(id)?;
        if matches_tags(&target, tags) {
            targets.push(target);
        }
    }
    directory.log_stats();

    let ordered = plan_batches(targets);
    let strategy = RolloutStrategy::for_targets(&ordered);
    let order: Vec<String> = ordered.iter().map(|t| t.composite_id(strategy)).collect();
    let (first_wave, second_wave) = split_waves(order.clone());
    let output = PlanOutput {
        strategy,
        order,
        first_wave,
        second_wave,
    };

    ctx.emit(&output, |out| {
        println!("strategy: {}", out.strategy);
        println!("wave 1:");
        for id in &out.first_wave {
            println!("  {id}");
        }
        println!("wave 2:");
        for id in &out.second_wave {
            println!("  {id}");
        }
    })
}

pub fn assemble(ctx: &Context, request_path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let request: OrchestrationRequest = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", request_path.display()))?;

    let store = ctx.open_store()?;
    let directory = CachedDirectory::new(&store, Arc::new(SystemClock));
    let invocation = Assembler::new(&directory, ctx.config.assembler_settings()).assemble(&request)?;
    directory.log_stats();

    ctx.emit(&invocation, print_invocation)
}

/// Every wanted tag must be on the instance or on its server.
fn matches_tags(target: &RolloutTarget, tags: &[String]) -> bool {
    tags.iter()
        .all(|tag| target.instance.has_tag(tag) || target.server.has_tag(tag))
}

fn print_invocation(inv: &Invocation) {
    println!("task:     {}", inv.task_id);
    println!("strategy: {}", inv.strategy);
    println!("path:     {}", inv.path);
    println!("extra vars:");
    for (name, value) in &inv.extra_vars {
        println!("  {name} = {value}");
    }
    for target in &inv.unmapped {
        println!("! no load-balancer member for {target}");
    }
    for name in &inv.missing_required {
        println!("! required parameter unresolved: {name}");
    }
}
