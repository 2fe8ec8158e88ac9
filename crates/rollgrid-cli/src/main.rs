//! rollgrid: operator CLI for mapping reconciliation and rolling updates.
//!
//! ```text
//! rollgrid --store ./rollgrid.redb import inventory.toml
//! rollgrid remap lb
//! rollgrid assemble request.json --json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rollgrid_core::{ErrorCategory, RollgridConfig};
use rollgrid_state::{EntityType, InstanceId};
use tracing_subscriber::EnvFilter;

mod commands;
mod directory;

use commands::Context;

#[derive(Parser)]
#[command(
    name = "rollgrid",
    about = "rollgrid: entity mapping and two-wave rolling updates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (default: ./rollgrid.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State database path; overrides [store].path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load servers, instances and external entities from a TOML inventory.
    Import { file: PathBuf },
    /// Reconcile one entity.
    Reconcile {
        /// Entity type: lb / load_balancer_server, registry / service_registry_instance.
        entity_type: EntityType,
        entity_id: String,
    },
    /// Reconcile every live, unmapped entity of a type.
    Remap { entity_type: EntityType },
    /// Mapping coverage counters.
    Stats { entity_type: EntityType },
    /// List live entities without an active mapping.
    Unmapped { entity_type: EntityType },
    /// Pin an entity to an instance.
    Pin {
        entity_type: EntityType,
        entity_id: String,
        instance_id: InstanceId,
        #[arg(long, default_value = "operator")]
        actor: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Deactivate every mapping of an entity without reconciling.
    Unmap {
        entity_type: EntityType,
        entity_id: String,
        #[arg(long, default_value = "operator")]
        actor: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Clear the manual flag and reconcile again.
    Unpin {
        entity_type: EntityType,
        entity_id: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Mapping history, newest first.
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Plan the two update waves for a set of instances.
    ///
    /// Without instance ids every live instance is considered.
    Plan {
        instance_ids: Vec<InstanceId>,
        /// Only targets whose instance or server carries this tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Assemble the automation invocation for a JSON orchestration request.
    Assemble { request: PathBuf },
    /// Parameter expression tools.
    Params {
        #[command(subcommand)]
        action: ParamsAction,
    },
}

#[derive(Subcommand)]
enum ParamsAction {
    /// Split a playbook path into clean path and parameters.
    Parse { text: String },
    /// Check parameter names and values against the allow-lists.
    Validate {
        text: String,
        /// Reject dynamic parameters missing from the known-variables registry.
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    if let Err(e) = run(cli, config) {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<RollgridConfig> {
    match path {
        Some(path) => RollgridConfig::from_file(path),
        None => {
            let local = std::path::Path::new("rollgrid.toml");
            if local.is_file() {
                RollgridConfig::from_file(local)
            } else {
                Ok(RollgridConfig::default())
            }
        }
    }
}

fn init_tracing(config: &RollgridConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli, config: RollgridConfig) -> anyhow::Result<()> {
    let ctx = Context::new(config, cli.store, cli.json);

    match cli.command {
        Commands::Import { file } => commands::inventory::import(&ctx, &file),
        Commands::Reconcile {
            entity_type,
            entity_id,
        } => commands::mapping::reconcile(&ctx, entity_type, &entity_id),
        Commands::Remap { entity_type } => commands::mapping::remap(&ctx, entity_type),
        Commands::Stats { entity_type } => commands::mapping::stats(&ctx, entity_type),
        Commands::Unmapped { entity_type } => commands::mapping::unmapped(&ctx, entity_type),
        Commands::Pin {
            entity_type,
            entity_id,
            instance_id,
            actor,
            note,
        } => commands::mapping::pin(
            &ctx,
            entity_type,
            &entity_id,
            Some(instance_id),
            &actor,
            note.as_deref(),
        ),
        Commands::Unmap {
            entity_type,
            entity_id,
            actor,
            note,
        } => commands::mapping::pin(&ctx, entity_type, &entity_id, None, &actor, note.as_deref()),
        Commands::Unpin {
            entity_type,
            entity_id,
            actor,
        } => commands::mapping::unpin(&ctx, entity_type, &entity_id, &actor),
        Commands::History { limit } => commands::mapping::history(&ctx, limit),
        Commands::Plan { instance_ids, tags } => commands::rollout::plan(&ctx, &instance_ids, &tags),
        Commands::Assemble { request } => commands::rollout::assemble(&ctx, &request),
        Commands::Params { action } => match action {
            ParamsAction::Parse { text } => commands::params::parse(&ctx, &text),
            ParamsAction::Validate { text, strict } => {
                commands::params::validate(&ctx, &text, strict)
            }
        },
    }
}

/// Map an error to the process exit code of its category.
fn exit_code(err: &anyhow::Error) -> i32 {
    let category = if let Some(e) = err.downcast_ref::<rollgrid_mapping::MappingError>() {
        e.category()
    } else if let Some(e) = err.downcast_ref::<rollgrid_rollout::RolloutError>() {
        e.category()
    } else if let Some(e) = err.downcast_ref::<rollgrid_state::StateError>() {
        e.category()
    } else if err.downcast_ref::<commands::ValidationFailed>().is_some() {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Internal
    };
    category.exit_code()
}
