use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use greenroute_core::GreenrouteConfig;
use greenroute_scheduler::{SchedulingSession, SqliteRouteStore};

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenroute=info".into()),
        )
        .init();

    let cli = cli::Cli::parse();

    // load config: --config > GREENROUTE_CONFIG env > ~/.greenroute/greenroute.toml
    let config = GreenrouteConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        GreenrouteConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let backend = SqliteRouteStore::new(db)?;

    // Imports go straight to storage; everything else runs on a hydrated session.
    if let cli::Command::Import { file } = &cli.command {
        let summary = commands::import(&backend, file)?;
        commands::print(&summary)?;
        return Ok(());
    }

    let (mut session, report) = SchedulingSession::hydrate(Arc::new(backend), &config.sync).await?;
    if !report.is_clean() {
        warn!(report = %serde_json::to_string(&report)?, "stored route data was repaired on load");
    }

    let as_of = commands::resolve_as_of(cli.as_of.as_deref())?;
    let result = commands::run(&mut session, cli.command, as_of).await;

    // Mutations were already flushed; this only writes hydration repairs.
    session.shutdown().await;

    match result {
        Ok(output) => commands::print(&output)?,
        Err(e) => {
            commands::print(&serde_json::json!({
                "ok": false,
                "code": e.code(),
                "error": e.to_string(),
            }))?;
            std::process::exit(1);
        }
    }
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
