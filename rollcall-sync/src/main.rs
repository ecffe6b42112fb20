//! rollcall - SIS sync command line
//!
//! Loads configuration (CLI > `ROLLCALL_*` env > TOML file), installs
//! logging and runs one command. Ctrl+C / SIGTERM cancel in-flight requests
//! and backoff waits.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_common::config::{
    ensure_directories, LoggingConfig, ScopeSetting, Settings, TomlConfig, CONFIG_FILE_NAME,
};
use rollcall_common::db::init_database;
use rollcall_sync::report::ReportGenerator;
use rollcall_sync::sis::{SisClient, SisService};
use rollcall_sync::sync::{resolve_homeroom_id, resolve_scope, select_students, SyncOptions, SyncOrchestrator};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for rollcall
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Incremental SIS sync into a local SQLite store")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full sync
    Sync {
        /// Skip report generation
        #[arg(long)]
        no_reports: bool,
    },
    /// Create the database schema and exit
    InitDb,
    /// Resolve a homeroom (year group) id by name
    ResolveHomeroom {
        /// Homeroom name (defaults to sync.homeroom_name)
        name: Option<String>,
    },
    /// Show the resolved student scope
    Scope,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .with_env_overrides()
        .context("Invalid environment override")?;
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }

    init_logging(&config.logging)?;
    info!("Starting rollcall {}", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => warn!("No {} found, relying on environment variables", CONFIG_FILE_NAME),
    }

    if let Command::InitDb = args.command {
        let db_path = config.database_path();
        init_database(&db_path)
            .await
            .with_context(|| format!("Failed to initialize database {}", db_path.display()))?;
        println!("Database ready: {}", db_path.display());
        return Ok(());
    }

    let require_term = matches!(args.command, Command::Sync { .. });
    let settings = Settings::resolve(config, require_term).context("Invalid configuration")?;
    ensure_directories(&settings.database_path, &settings.output_dir, &settings.logging)
        .context("Failed to create data directories")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let client = SisClient::from_settings(&settings, cancel).context("Failed to build SIS client")?;
    let service = Arc::new(SisService::new(client, settings.endpoints.clone()));

    match args.command {
        Command::Sync { no_reports } => {
            let pool = init_database(&settings.database_path)
                .await
                .context("Failed to open database")?;
            let scope = resolve_scope(service.as_ref(), &settings.scope)
                .await
                .context("Failed to resolve student scope")?;
            let options = SyncOptions::from_settings(&settings, scope)?;

            let mut orchestrator = SyncOrchestrator::new(pool, service, options);
            if !no_reports {
                orchestrator = orchestrator.with_reports(ReportGenerator::new(&settings.output_dir, settings.utc_offset));
            }

            let counts = orchestrator.run().await.context("Sync failed")?;
            println!(
                "students={} snapshots={} behaviour={} attendance={} reports={}",
                counts.students, counts.snapshots, counts.behaviour, counts.attendance, counts.reports
            );
        }
        Command::ResolveHomeroom { name } => {
            let (id, configured_name) = match &settings.scope {
                ScopeSetting::Homeroom { id, name } => (*id, name.clone()),
                ScopeSetting::Advisor(_) => (None, None),
            };
            // A name on the command line always triggers a lookup
            let (id, name) = match name {
                Some(name) => (None, Some(name)),
                None => (id, configured_name),
            };
            let homeroom_id = resolve_homeroom_id(service.as_ref(), id, name.as_deref())
                .await
                .context("Failed to resolve homeroom")?;
            println!("{}", homeroom_id);
        }
        Command::Scope => {
            let scope = resolve_scope(service.as_ref(), &settings.scope)
                .await
                .context("Failed to resolve student scope")?;
            let students = select_students(service.as_ref(), scope, settings.cohort_year, settings.per_page)
                .await
                .context("Failed to fetch students")?;
            println!(
                "scope={} cohort_year={} students={} sample_student_id={}",
                scope,
                settings.cohort_year,
                students.len(),
                students
                    .first()
                    .map(|s| s.student_id.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Command::InitDb => {}
    }

    Ok(())
}

/// stderr output filtered by `RUST_LOG` (or the configured level), plus an
/// optional append-only log file
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rollcall={level},rollcall_sync={level},rollcall_common={level}",
            level = logging.level
        ))
    });

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling");
        },
    }

    token.cancel();
}
