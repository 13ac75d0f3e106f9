use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tablevault::config::overlay_env;
use tablevault::{
    BackupService, BackupTarget, Error, ErrorKind, OperationResponse, RestoreService, Result,
    VaultConfig,
};

#[derive(Parser, Debug)]
#[command(version, about = "Back up and restore tables as avro containers")]
struct Args {
    /// TOML file with `tablevault.*` keys.
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up one table.
    Backup { table: String },
    /// Restore one table from its latest backup.
    Restore { table: String },
    /// Restore every known table, parents first.
    RestoreAll,
    /// Create missing reference tables.
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let responses = match load_config(&args.config) {
        Ok(config) => run(&config, args.command).await,
        Err(e) => vec![OperationResponse::failure(e.to_string())],
    };

    let mut failed = false;
    for response in &responses {
        failed |= response.error;
        match serde_json::to_string(response) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("Failed to print response: {}", e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(config: &VaultConfig, command: Command) -> Vec<OperationResponse> {
    match command {
        Command::Backup { table } => match BackupService::from_config(config) {
            Ok(service) => vec![service.backup(&table).await],
            Err(e) => vec![OperationResponse::failure(e.to_string())],
        },
        Command::Restore { table } => match RestoreService::from_config(config) {
            Ok(service) => vec![service.restore(&table).await],
            Err(e) => vec![OperationResponse::failure(e.to_string())],
        },
        Command::RestoreAll => match RestoreService::from_config(config) {
            Ok(service) => service
                .restore_all()
                .await
                .into_iter()
                .map(|(_, response)| response)
                .collect(),
            Err(e) => vec![OperationResponse::failure(e.to_string())],
        },
        Command::Init => vec![init(config).into()],
    }
}

fn init(config: &VaultConfig) -> Result<String> {
    let mut db = config.connection_creator().connect()?;
    for target in BackupTarget::restore_order() {
        db.execute_ddl(&target.create_table_sql())?;
    }
    Ok(format!(
        "Created reference tables in {}.",
        config.database_path.display()
    ))
}

/// Load config keys from a TOML file, then apply environment overrides.
///
/// Nested tables are flattened into dotted keys, so `[tablevault.store]`
/// with `location = "..."` yields `tablevault.store.location`.
fn load_config(path: &Path) -> Result<VaultConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::new(ErrorKind::ConfigInvalid, "failed to read config file")
            .with_context("path", path.display().to_string())
            .set_source(e)
    })?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| {
        Error::new(ErrorKind::ConfigInvalid, "failed to parse config file")
            .with_context("path", path.display().to_string())
            .set_source(e)
    })?;

    let mut keys = HashMap::new();
    flatten("", &table, &mut keys);
    overlay_env(&mut keys, std::env::vars());

    VaultConfig::try_from(&keys)
}

fn flatten(prefix: &str, table: &toml::Table, keys: &mut HashMap<String, String>) {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::Table(nested) => flatten(&key, nested, keys),
            toml::Value::String(s) => {
                keys.insert(key, s.clone());
            }
            other => {
                keys.insert(key, other.to_string());
            }
        }
    }
}
