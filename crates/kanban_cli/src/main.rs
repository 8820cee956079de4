//! `kanban` command: health probes and maintenance passes over one database.
//!
//! Every command prints one JSON document on stdout. Failures go to stderr
//! with a non-zero exit status.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use kanban_core::db::open_db;
use kanban_core::{
    default_log_level, init_logging, EntityKind, HierarchyApi, HierarchyConfig,
    SiblingSetKey, SqliteHierarchyStore,
};
use serde_json::{json, Value};
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok((payload, healthy)) => {
            println!("{payload}");
            if healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            eprintln!("kanban: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Returns the payload to print and whether the command found the data healthy.
fn run(cli: Cli) -> CliResult<(Value, bool)> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    match cli.command {
        Commands::Ping => Ok((json!({ "ping": kanban_core::ping() }), true)),
        Commands::Version => Ok((json!({ "version": kanban_core::core_version() }), true)),
        Commands::Stats { db } => {
            let api = open_api(&db, cli.config.as_deref())?;
            Ok((serde_json::to_value(api.statistics()?)?, true))
        }
        Commands::Renumber { db, kind, parent } => {
            let api = open_api(&db, cli.config.as_deref())?;
            match (kind, parent) {
                (Some(kind), Some(parent)) => {
                    let kind = EntityKind::parse(&kind)
                        .ok_or_else(|| format!("unknown entity kind `{kind}`"))?;
                    let key = SiblingSetKey::new(kind, parent);
                    let renumbered = api.renumber_set(key)?;
                    Ok((json!({ "set": key, "members_renumbered": renumbered }), true))
                }
                _ => {
                    let sets = api.renumber_all()?;
                    log::info!("event=cli_renumber_all module=cli status=ok sets={sets}");
                    Ok((json!({ "sets_renumbered": sets }), true))
                }
            }
        }
        Commands::Check { db } => {
            let api = open_api(&db, cli.config.as_deref())?;
            let duplicates = api.integrity_report()?;
            let healthy = duplicates.is_empty();
            Ok((json!({ "ok": healthy, "duplicates": duplicates }), healthy))
        }
    }
}

fn open_api(db: &Path, config: Option<&Path>) -> CliResult<HierarchyApi<SqliteHierarchyStore>> {
    let config = match config {
        Some(path) => HierarchyConfig::load(path)?,
        None => HierarchyConfig::default(),
    };
    let store = SqliteHierarchyStore::try_new(open_db(db)?)?;
    Ok(HierarchyApi::new(store, config)?)
}
