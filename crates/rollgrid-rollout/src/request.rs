//! Orchestration requests.

use rollgrid_state::InstanceId;

/// Everything needed to assemble one rolling-update invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrchestrationRequest {
    pub task_id: String,
    /// Instances to update, in caller order; the planner reorders them.
    pub instances: Vec<InstanceId>,
    /// Artifact URL handed to the playbook as `distr_url` / `image_url`.
    pub distribution_url: String,
    /// Path of the rolling-update orchestrator playbook; the invocation
    /// path is built on top of it.
    pub orchestrator_playbook: String,
    /// Per-instance update playbook, possibly carrying `{name=value}` groups.
    pub original_update_playbook_path: String,
    #[serde(default)]
    pub drain_wait_minutes: Option<u64>,
    /// Parameter names the orchestrator playbook declares as required.
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default)]
    pub optional_params: Vec<String>,
}

impl OrchestrationRequest {
    /// Required names followed by optional ones, first occurrence wins.
    /// The flag is true for required names.
    pub fn parameter_order(&self) -> Vec<(&str, bool)> {
        let mut seen = std::collections::HashSet::new();
        let required = self.required_params.iter().map(|n| (n.as_str(), true));
        let optional = self.optional_params.iter().map(|n| (n.as_str(), false));
        required
            .chain(optional)
            .filter(|(name, _)| seen.insert(*name))
            .collect()
    }
}
