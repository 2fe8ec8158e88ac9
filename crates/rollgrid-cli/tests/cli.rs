//! End-to-end tests of the `rollgrid` binary against a temporary store.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const INVENTORY: &str = r#"
[[servers]]
id = 1
name = "srv01.dc1.example.com"
address = "10.0.0.1"
tags = ["prod"]

[[servers]]
id = 2
name = "srv02.dc1.example.com"
address = "10.0.0.2"
tags = ["prod"]

[[instances]]
id = 10
name = "billing_1"
server_id = 1
ip = "10.0.0.1"
port = 8080

[[instances]]
id = 11
name = "billing_2"
server_id = 2
ip = "10.0.0.2"
port = 8080

[[load_balancer]]
entity_id = "m1"
name = "srv01_billing_1"
backend = "be_billing"
api_url = "http://lb1:5555/v3"

[[load_balancer]]
entity_id = "m2"
name = "srv02_billing_2"
backend = "be_billing"

[[load_balancer]]
entity_id = "m3"
name = "web99_unknown_1"
backend = "be_other"
"#;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = format!(
            "[store]\npath = {:?}\n\n[logging]\nfilter = \"warn\"\n",
            dir.path().join("state/rollgrid.redb")
        );
        fs::write(dir.path().join("rollgrid.toml"), config).expect("write config");
        fs::write(dir.path().join("inventory.toml"), INVENTORY).expect("write inventory");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_rollgrid"))
            .arg("--config")
            .arg(self.path("rollgrid.toml"))
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("run rollgrid")
    }

    fn json(&self, args: &[&str]) -> Value {
        let mut full = args.to_vec();
        full.push("--json");
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "rollgrid {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid JSON output")
    }

    fn import(&self) {
        let file = self.path("inventory.toml");
        self.json(&["import", path_str(&file)]);
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn import_remap_and_stats() {
    let env = Env::new();
    let file = env.path("inventory.toml");
    let summary = env.json(&["import", path_str(&file)]);
    assert_eq!(summary["servers"], 2);
    assert_eq!(summary["instances"], 2);
    assert_eq!(summary["entities"], 3);

    let remap = env.json(&["remap", "lb"]);
    assert_eq!(remap["attempted"], 3);
    assert_eq!(remap["succeeded"], 2);
    assert_eq!(remap["unmatched"], 1);

    let stats = env.json(&["stats", "lb"]);
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["mapped"], 2);
    assert_eq!(stats["automatic"], 2);

    let unmapped = env.json(&["unmapped", "lb"]);
    assert_eq!(unmapped.as_array().map(Vec::len), Some(1));
    assert_eq!(unmapped[0]["entity_id"], "m3");
}

#[test]
fn pin_unpin_and_history() {
    let env = Env::new();
    env.import();

    let pinned = env.json(&["pin", "lb", "m3", "11", "--actor", "alice", "--note", "by hand"]);
    assert_eq!(pinned["instance_id"], 11);
    assert_eq!(pinned["is_manual"], true);

    let outcome = env.json(&["reconcile", "lb", "m3"]);
    assert_eq!(outcome["outcome"], "pinned");

    // No strategy matches m3, so the now-automatic mapping is kept.
    let outcome = env.json(&["unpin", "lb", "m3"]);
    assert_eq!(outcome["outcome"], "kept");
    assert_eq!(outcome["mapping"]["is_manual"], false);

    let history = env.json(&["history", "--limit", "5"]);
    let history = history.as_array().expect("history array");
    assert_eq!(history[0]["action"], "updated");
    assert_eq!(history[0]["reason"], "manual flag cleared");
    assert_eq!(history[1]["changed_by"], "alice");
}

#[test]
fn not_found_exit_code() {
    let env = Env::new();
    env.import();
    let output = env.run(&["pin", "lb", "ghost", "10"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("entity not found"));
}

#[test]
fn params_parse_and_validate() {
    let env = Env::new();
    let parsed = env.json(&[
        "params",
        "parse",
        "/etc/ansible/update.yml {server} {app} {unpack=true}",
    ]);
    assert_eq!(parsed["path"], "/etc/ansible/update.yml");
    assert_eq!(parsed["parameters"].as_array().map(Vec::len), Some(3));

    let ok = env.run(&["params", "validate", "x.yml {server} {unpack=true}"]);
    assert!(ok.status.success());

    let bad = env.run(&["params", "validate", "x.yml {server;rm -rf /}"]);
    assert_eq!(bad.status.code(), Some(2));

    let strict = env.run(&["params", "validate", "--strict", "x.yml {my_custom_var}"]);
    assert_eq!(strict.status.code(), Some(2));
}

#[test]
fn plan_and_assemble() {
    let env = Env::new();
    env.import();
    env.json(&["remap", "lb"]);

    let plan = env.json(&["plan", "11", "10"]);
    assert_eq!(plan["strategy"], "load_balancer_aware");
    assert_eq!(plan["first_wave"][0], "srv01::billing_1::srv01_billing_1");
    assert_eq!(plan["second_wave"][0], "srv02::billing_2::srv02_billing_2");

    let tagged = env.json(&["plan", "--tag", "staging"]);
    assert_eq!(tagged["order"].as_array().map(Vec::len), Some(0));

    let request = serde_json::json!({
        "task_id": "t-1",
        "instances": [10, 11],
        "distribution_url": "http://repo/billing-2.0.tar.gz",
        "orchestrator_playbook": "/etc/ansible/rolling.yml",
        "original_update_playbook_path": "/etc/ansible/update_billing.yml {unpack=true}",
        "drain_wait_minutes": 1,
        "required_params": ["app_instances", "drain_delay", "haproxy_backend"],
        "optional_params": ["unpack"]
    });
    let request_path = env.path("request.json");
    fs::write(&request_path, request.to_string()).expect("write request");

    let inv = env.json(&["assemble", path_str(&request_path)]);
    assert_eq!(inv["strategy"], "load_balancer_aware");
    assert_eq!(inv["extra_vars"]["drain_delay"], "60");
    assert_eq!(inv["extra_vars"]["haproxy_backend"], "be_billing");
    assert_eq!(inv["extra_vars"]["unpack"], "true");
    assert_eq!(
        inv["extra_vars"]["app_instances"],
        "srv01::billing_1::srv01_billing_1,srv02::billing_2::srv02_billing_2"
    );
}
