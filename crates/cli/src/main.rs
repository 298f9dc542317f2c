mod sample;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use db::{PersistenceStore, SqliteStore};
use orchestrator::ConnectorRegistry;
use pipes_core::RunStatus;
use serde::Deserialize;
use server::config::{ServerConfig, CONFIG_DIR, CONFIG_FILE};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sample::SampleConnector;

const STATUS_RUN_LIMIT: u32 = 5;

#[derive(Parser)]
#[command(name = "data-pipes")]
#[command(about = "Run data pipes and follow their progress", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .data-pipes with a default config and an empty database
    Init,
    /// Start the HTTP and WebSocket server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Write trace level lines to run logs
        #[arg(long)]
        debug: bool,
    },
    /// Show pipes, recent runs and whether a server is running
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => init_project().await,
        Some(Commands::Serve { port, host, debug }) => serve(port, host, debug).await,
        Some(Commands::Status) => status().await,
        None => serve(None, None, false).await,
    }
}

fn connector_registry() -> ConnectorRegistry {
    ConnectorRegistry::new().with(Arc::new(SampleConnector))
}

async fn init_project() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = ServerConfig::config_path(&cwd);

    if config_path.exists() {
        println!("Project already initialized at {}", cwd.join(CONFIG_DIR).display());
        return Ok(());
    }

    println!("Initializing Data Pipes in {}", cwd.display());

    let config = ServerConfig::default();
    config
        .write(&cwd)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tokio::fs::create_dir_all(cwd.join(&config.log_dir)).await?;

    let pool = db::create_pool(&config.database_url(&cwd))
        .await
        .context("Failed to create database")?;
    db::run_migrations(&pool).await?;

    println!();
    println!("{}", "Initialized Data Pipes".green());
    println!();
    println!("Created:");
    println!("  {}/", CONFIG_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  ├── {}", file_name(&config.database));
    println!("  └── {}/", file_name(&config.log_dir));
    println!();
    println!("Next steps:");
    println!("  Run 'data-pipes serve' to start the server");

    Ok(())
}

async fn serve(port: Option<u16>, host: Option<String>, debug: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;

    init_tracing();

    if !ServerConfig::config_path(&cwd).exists() {
        println!("No {} directory found.", CONFIG_DIR);
        println!("Run 'data-pipes init' first, or using default configuration.");
        println!();
    }

    let mut config = ServerConfig::read(&cwd).await;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(host) = host {
        config.host = host;
    }
    config.debug |= debug;

    let database_url = config.database_url(&cwd);
    tracing::info!(database = %database_url, "Opening database");

    if let Some(parent) = cwd.join(&config.database).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let engine_config = config.engine_config(&cwd);
    tracing::info!(
        log_dir = %engine_config.log_dir.display(),
        debug = engine_config.debug,
        "Run logs"
    );

    let state = AppState::new(pool, connector_registry(), engine_config);
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    println!();
    println!("{}", "Data Pipes".bold());
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", config.port);
    println!("  Run updates: ws://localhost:{}/ws/runs", config.port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", config.port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

/// The part of `GET /health` the status command prints.
#[derive(Deserialize)]
struct Health {
    version: String,
    active_run: Option<String>,
}

async fn status() -> Result<()> {
    let cwd = std::env::current_dir()?;

    if !ServerConfig::config_path(&cwd).exists() {
        println!("Not a Data Pipes project.");
        println!("Run 'data-pipes init' to initialize.");
        return Ok(());
    }

    let config = ServerConfig::read(&cwd).await;
    if !cwd.join(&config.database).exists() {
        println!("Database not initialized. Run 'data-pipes init'.");
        return Ok(());
    }

    let pool = db::create_pool(&config.database_url(&cwd)).await?;
    let store = SqliteStore::new(pool);
    let pipes = store.list_pipes().await?;
    let runs = store.list_recent_runs(STATUS_RUN_LIMIT).await?;

    println!();
    println!("Path:    {}", cwd.display());
    println!("Server:  {}", server_status(&config).await);
    println!();

    if pipes.is_empty() {
        println!("No pipes yet.");
    } else {
        println!("Pipes ({}):", pipes.len());
        for pipe in &pipes {
            let tables = pipe.tables.as_ref().map_or(0, |t| t.len());
            println!(
                "  {} [{}] {} tables",
                pipe.name.bold(),
                pipe.connector_id,
                tables
            );
        }
    }

    println!();

    if !runs.is_empty() {
        println!("Recent runs:");
        for run in &runs {
            let pipe_name = pipes
                .iter()
                .find(|p| p.id == run.pipe_id)
                .map_or("(deleted pipe)", |p| p.name.as_str());
            println!(
                "  {} {} {} records {}",
                status_label(run.status),
                pipe_name,
                run.num_records,
                run.elapsed_time.as_deref().unwrap_or_default().dimmed()
            );
        }
        println!();
    }

    Ok(())
}

async fn server_status(config: &ServerConfig) -> String {
    let url = format!("http://localhost:{}/health", config.port);
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(e) => return format!("unknown ({})", e),
    };

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Health check failed");
            return "not running".dimmed().to_string();
        }
    };

    match response.json::<Health>().await {
        Ok(Health {
            version,
            active_run: Some(run),
        }) => format!("{} v{}, run {} in progress", "running".green(), version, run),
        Ok(Health { version, .. }) => format!("{} v{}, idle", "running".green(), version),
        Err(e) => format!("unexpected health response ({})", e),
    }
}

fn status_label(status: RunStatus) -> String {
    let label = format!("[{}]", status);
    match status {
        RunStatus::Finished => label.green().to_string(),
        RunStatus::Error => label.red().to_string(),
        RunStatus::Running => label.yellow().to_string(),
        RunStatus::NotStarted | RunStatus::Stopped => label.dimmed().to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();
}
