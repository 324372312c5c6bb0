use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use grcserver::catalogs::import::{apply_import, plan_from_bytes, ImportFormat, ImportOptions};
use grcserver::main_module::{build_app_state, init_logging, load_config, run_axum_server};
use grcserver::notifications::jobs::{run_daily_reminders, run_weekly_digest};
use grcserver::shared::utils::{create_conn, run_db, run_migrations};

/// grcserver - governance, risk and compliance service.
#[derive(Parser, Debug)]
#[command(name = "grcserver")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API with the report worker and scheduler (default)
    Serve,

    /// Import a framework catalog from a JSON or YAML file
    ImportFramework(ImportArgs),

    /// Send due-date reminders for one day
    SendReminders(DateArg),

    /// Send weekly digests to users whose digest day matches
    SendDigest(DateArg),

    /// Apply pending database migrations and exit
    Migrate,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Catalog file; `.yml`/`.yaml` are read as YAML, anything else as JSON
    file: PathBuf,

    /// Replace an existing framework with the same short name and version
    #[arg(long)]
    update: bool,

    /// User recorded as the framework's creator
    #[arg(long)]
    created_by: Option<Uuid>,
}

#[derive(Args, Debug)]
struct DateArg {
    /// Run as if today were this date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,
}

async fn import_framework(args: ImportArgs) -> Result<()> {
    let config = load_config()?;
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let plan = plan_from_bytes(&bytes, ImportFormat::from_path(&args.file))
        .with_context(|| format!("Invalid framework file {}", args.file.display()))?;
    info!(
        "Importing {} {} ({} clauses)",
        plan.short_name,
        plan.version,
        plan.clauses.len()
    );

    let pool = create_conn(&config.database)?;
    let options = ImportOptions {
        update: args.update,
        created_by: args.created_by,
    };
    let outcome = run_db(&pool, move |conn| {
        apply_import(conn, &plan, &options).map_err(anyhow::Error::from)
    })
    .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn send_reminders(date: Option<NaiveDate>, digest: bool) -> Result<()> {
    let config = load_config()?;
    let (state, _report_rx) =
        tokio::task::spawn_blocking(move || build_app_state(config)).await??;
    let state = Arc::new(state);
    let today = date.unwrap_or_else(|| Utc::now().date_naive());

    let summary = if digest {
        run_weekly_digest(state, today).await
    } else {
        run_daily_reminders(state, today).await
    }
    .context("Reminder run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn migrate() -> Result<()> {
    let config = load_config()?;
    let pool = create_conn(&config.database)?;
    tokio::task::spawn_blocking(move || run_migrations(&pool)).await??;
    Ok(())
}

async fn serve() -> Result<()> {
    let config = load_config()?;
    info!(
        "Starting grcserver {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );
    let (state, report_rx) =
        tokio::task::spawn_blocking(move || build_app_state(config)).await??;
    run_axum_server(Arc::new(state), report_rx).await
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::ImportFramework(args) => import_framework(args).await,
        Commands::SendReminders(args) => send_reminders(args.date, false).await,
        Commands::SendDigest(args) => send_reminders(args.date, true).await,
        Commands::Migrate => migrate().await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grcserver::catalogs::CatalogError;

    #[test]
    fn test_cli_parses_import() {
        let cli = Cli::parse_from([
            "grcserver",
            "import-framework",
            "iso27001.yaml",
            "--update",
        ]);
        match cli.command {
            Some(Commands::ImportFramework(args)) => {
                assert!(args.update);
                assert_eq!(args.file, PathBuf::from("iso27001.yaml"));
                assert!(args.created_by.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_reminder_date() {
        let cli = Cli::parse_from(["grcserver", "send-reminders", "--date", "2026-03-02"]);
        match cli.command {
            Some(Commands::SendReminders(args)) => {
                assert_eq!(args.date, NaiveDate::from_ymd_opt(2026, 3, 2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::parse_from(["grcserver"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_catalog_error_converts_to_anyhow() {
        let err: anyhow::Error = CatalogError::Validation("bad".into()).into();
        assert!(err.to_string().contains("bad"));
    }
}
