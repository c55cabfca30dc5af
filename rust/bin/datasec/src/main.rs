//! `datasec`: administer RLS policies and session properties from the
//! command line.
//!
//! Every command prints JSON on stdout. Failures print
//! `{"code": ..., "message": ...}` on stderr and exit non-zero: 2 for
//! request errors, 1 for storage and internal failures.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use datasec_core::ServiceError;
use datasec_sql::{SQLStore, SqliteStore};
use rls::RlsModule;

use config::CliConfig;

/// Row-level security administration.
#[derive(Parser, Debug)]
#[command(name = "datasec", about = "RLS policy and session property admin")]
struct Cli {
    /// Path to config file (default: ./datasec.toml).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file).
    #[arg(long = "db", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Session property definitions.
    Property {
        #[command(subcommand)]
        action: PropertyAction,
    },

    /// RLS policies.
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Per-user session property values.
    Value {
        #[command(subcommand)]
        action: ValueAction,
    },

    /// Models policies can apply to.
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Print the effective session property bindings for a user.
    Resolve {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        user: i64,
    },
}

#[derive(Subcommand, Debug)]
enum PropertyAction {
    List {
        #[arg(long)]
        project: i64,
    },
    Get {
        #[arg(long)]
        project: i64,
        id: i64,
    },
    /// Create from a JSON body, e.g. `{"name":"region","defaultExpr":"'us'"}`.
    Create {
        #[arg(long)]
        project: i64,
        #[arg(long = "json")]
        json_body: String,
    },
    /// Partial update from a JSON body; `"defaultExpr": null` clears the default.
    Update {
        #[arg(long)]
        project: i64,
        id: i64,
        #[arg(long = "json")]
        json_body: String,
    },
    Delete {
        #[arg(long)]
        project: i64,
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyAction {
    List {
        #[arg(long)]
        project: i64,
        /// Only policies applied to this model.
        #[arg(long)]
        model: Option<i64>,
    },
    Get {
        #[arg(long)]
        project: i64,
        id: i64,
    },
    /// Create from a JSON body with `name`, `condition`, `modelIds`,
    /// `sessionPropertyIds`.
    Create {
        #[arg(long)]
        project: i64,
        #[arg(long = "json")]
        json_body: String,
    },
    /// Update from a JSON body. Omitted id lists are left as they are.
    Update {
        #[arg(long)]
        project: i64,
        id: i64,
        #[arg(long = "json")]
        json_body: String,
    },
    Delete {
        #[arg(long)]
        project: i64,
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ValueAction {
    /// List values of a user, or of one property with `--project` and `--property`.
    List {
        #[arg(long, required_unless_present = "property")]
        user: Option<i64>,
        #[arg(long, requires = "property")]
        project: Option<i64>,
        #[arg(long, requires = "project")]
        property: Option<i64>,
    },
    /// Assign from a JSON object or array of
    /// `{"userId", "sessionPropertyId", "value"}`.
    Assign {
        #[arg(long)]
        project: i64,
        #[arg(long = "json")]
        json_body: String,
    },
    Unassign {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        property: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ModelAction {
    List {
        #[arg(long)]
        project: i64,
    },
    Register {
        #[arg(long)]
        project: i64,
        name: String,
    },
    Delete {
        #[arg(long)]
        project: i64,
        id: i64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        match e.downcast_ref::<ServiceError>() {
            Some(service) => eprintln!("{}", service.to_json()),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(exit_code(&e));
    }
}

/// 2 when the request itself was wrong (not found, conflict, invalid input),
/// 1 for everything else.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<ServiceError>() {
        Some(service) if service.is_client_error() => 2,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(CliConfig::default_path);
    let config = CliConfig::load(&config_path)?;

    let db_path = cli
        .db
        .unwrap_or_else(|| config.service.resolve_sqlite_path());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    debug!("opening {}", db_path.display());

    let sql: Arc<dyn SQLStore> = Arc::new(
        SqliteStore::open(&db_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let module = RlsModule::new(sql, config.rls).map_err(ServiceError::from)?;
    let svc = module.service();

    let output = match cli.command {
        Commands::Property { action } => match action {
            PropertyAction::List { project } => commands::json(svc.list_session_properties(project))?,
            PropertyAction::Get { project, id } => commands::json(svc.get_session_property(project, id))?,
            PropertyAction::Create { project, json_body } => {
                commands::json(svc.create_session_property(project, commands::parse(&json_body)?))?
            }
            PropertyAction::Update { project, id, json_body } => commands::json(
                svc.update_session_property(project, id, commands::parse(&json_body)?),
            )?,
            PropertyAction::Delete { project, id } => {
                commands::deleted(svc.delete_session_property(project, id), id)?
            }
        },

        Commands::Policy { action } => match action {
            PolicyAction::List { project, model: None } => commands::json(svc.list_policies(project))?,
            PolicyAction::List { project, model: Some(model) } => {
                commands::json(svc.list_policies_for_model(project, model))?
            }
            PolicyAction::Get { project, id } => commands::json(svc.get_policy(project, id))?,
            PolicyAction::Create { project, json_body } => {
                commands::json(svc.create_policy(project, commands::parse(&json_body)?))?
            }
            PolicyAction::Update { project, id, json_body } => {
                commands::json(svc.update_policy(project, id, commands::parse(&json_body)?))?
            }
            PolicyAction::Delete { project, id } => {
                commands::deleted(svc.delete_policy(project, id), id)?
            }
        },

        Commands::Value { action } => match action {
            ValueAction::List { project: Some(project), property: Some(property), .. } => {
                commands::json(svc.list_values_for_property(project, property))?
            }
            ValueAction::List { user: Some(user), .. } => commands::json(svc.list_user_values(user))?,
            ValueAction::List { .. } => anyhow::bail!("pass --user, or --project with --property"),
            ValueAction::Assign { project, json_body } => commands::assign(&svc, project, &json_body)?,
            ValueAction::Unassign { project, user, property } => {
                commands::deleted(svc.unassign_value(project, user, property), property)?
            }
        },

        Commands::Model { action } => match action {
            ModelAction::List { project } => commands::json(svc.list_models(project))?,
            ModelAction::Register { project, name } => {
                commands::json(svc.register_model(project, rls::model::NewModel { name }))?
            }
            ModelAction::Delete { project, id } => commands::deleted(svc.delete_model(project, id), id)?,
        },

        Commands::Resolve { project, user } => {
            commands::json(module.resolver().resolve(project, user))?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found = anyhow::Error::from(ServiceError::NotFound("rls policy 1".into()));
        assert_eq!(exit_code(&not_found), 2);

        let storage = anyhow::Error::from(ServiceError::Storage("disk".into()));
        assert_eq!(exit_code(&storage), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("bad config")), 1);
    }
}
