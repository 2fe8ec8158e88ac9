//! Orchestration assembler: combines the batch planner, the mapping data
//! and the parameter model into one automation-tool invocation.

use std::collections::BTreeMap;

use rollgrid_core::AssemblerSettings;
use rollgrid_params::{build_path, parse, stringify_value};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::batch::{plan_batches, split_waves};
use crate::directory::{RolloutTarget, TargetDirectory};
use crate::error::RolloutResult;
use crate::request::OrchestrationRequest;
use crate::strategy::RolloutStrategy;

/// The assembled invocation: a playbook path with inline parameters plus
/// the matching extra vars.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Invocation {
    pub task_id: String,
    pub strategy: RolloutStrategy,
    pub path: String,
    pub extra_vars: BTreeMap<String, String>,
    /// Composite target ids in planned order.
    pub targets: Vec<String>,
    /// Targets at even positions, updated first.
    pub first_wave: Vec<String>,
    pub second_wave: Vec<String>,
    /// Load-balancer-aware targets without a mapped pool member.
    pub unmapped: Vec<String>,
    /// Required parameters with no resolved value; emitted as placeholders.
    pub missing_required: Vec<String>,
}

pub struct Assembler<'a, D: TargetDirectory> {
    directory: &'a D,
    settings: AssemblerSettings,
}

impl<'a, D: TargetDirectory> Assembler<'a, D> {
    pub fn new(directory: &'a D, settings: AssemblerSettings) -> Self {
        Self {
            directory,
            settings,
        }
    }

    pub fn assemble(&self, request: &OrchestrationRequest) -> RolloutResult<Invocation> {
        let targets = request
            .instances
            .iter()
            .map(|id| self.directory.target(*id))
            .collect::<RolloutResult<Vec<_>>>()?;
        let ordered = plan_batches(targets);
        let strategy = RolloutStrategy::for_targets(&ordered);

        let mut composite = Vec::with_capacity(ordered.len());
        let mut unmapped = Vec::new();
        for target in &ordered {
            let id = target.composite_id(strategy);
            if strategy == RolloutStrategy::LoadBalancerAware && target.member.is_none() {
                warn!(
                    task_id = %request.task_id,
                    instance_id = target.instance.id,
                    target = %id,
                    "no load-balancer member mapped; using fallback id"
                );
                unmapped.push(id.clone());
            }
            composite.push(id);
        }

        let mut values = self.base_values(request, strategy, &ordered, &composite);
        let original = parse(&request.original_update_playbook_path);
        for (name, value) in original.explicit() {
            values.insert(name.to_string(), Value::String(value.to_string()));
        }

        let mut explicit: Vec<(String, Value)> = Vec::new();
        let mut placeholders: Vec<&str> = Vec::new();
        let mut extra_vars = BTreeMap::new();
        for (name, required) in request.parameter_order() {
            match values.get(name) {
                Some(value) => {
                    extra_vars.insert(name.to_string(), stringify_value(value));
                    explicit.push((name.to_string(), value.clone()));
                }
                None if required => {
                    warn!(task_id = %request.task_id, param = name, "required parameter unresolved");
                    placeholders.push(name);
                }
                None => {}
            }
        }
        let path = build_path(&request.orchestrator_playbook, &explicit, &placeholders);

        let (first_wave, second_wave) = split_waves(composite.clone());
        info!(
            task_id = %request.task_id,
            %strategy,
            targets = composite.len(),
            unmapped = unmapped.len(),
            "invocation assembled"
        );

        Ok(Invocation {
            task_id: request.task_id.clone(),
            strategy,
            path,
            extra_vars,
            targets: composite,
            first_wave,
            second_wave,
            unmapped,
            missing_required: placeholders.into_iter().map(str::to_string).collect(),
        })
    }

    /// Values every invocation can draw on, before explicit overrides.
    fn base_values(
        &self,
        request: &OrchestrationRequest,
        strategy: RolloutStrategy,
        ordered: &[RolloutTarget],
        composite: &[String],
    ) -> Map<String, Value> {
        let drain_delay = request
            .drain_wait_minutes
            .map(|minutes| minutes.saturating_mul(60))
            .unwrap_or(self.settings.default_drain_delay_secs);
        let update_playbook = parse(&request.original_update_playbook_path)
            .file_name()
            .to_string();

        let mut values = Map::new();
        values.insert("task_id".into(), json!(request.task_id));
        values.insert("app_instances".into(), json!(composite.join(",")));
        values.insert("drain_delay".into(), json!(drain_delay));
        values.insert("update_playbook".into(), json!(update_playbook));
        values.insert("distr_url".into(), json!(request.distribution_url));
        values.insert("image_url".into(), json!(request.distribution_url));

        if strategy == RolloutStrategy::LoadBalancerAware {
            let first_backend = ordered
                .iter()
                .filter_map(|t| t.member.as_ref())
                .find_map(|m| m.backend());
            if let Some((backend, api_url)) = first_backend {
                values.insert("haproxy_backend".into(), json!(backend));
                if let Some(url) = api_url {
                    values.insert("haproxy_api_url".into(), json!(url));
                }
            }
        }
        values
    }
}
