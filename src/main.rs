use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use placement_crm_api::activity::{ActivityLog, StoreActivityLog, TracingActivityLog};
use placement_crm_api::config::CONFIG;
use placement_crm_api::database::{DatabaseManager, MemoryStore, PgStore, RecordStore};
use placement_crm_api::routes;
use placement_crm_api::scope::{PgDirectory, PgPermissionOracle, StaticDirectory, StaticPermissionOracle};
use placement_crm_api::state::AppState;

#[derive(Parser)]
#[command(name = "placement-crm-api")]
#[command(about = "Back office API for the placement CRM")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP API (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (falls back to CRM_API_PORT, PORT, then 3000)")]
        port: Option<u16>,
        #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
        bind: String,
        #[arg(long, help = "Serve from an empty in-memory store instead of Postgres")]
        memory: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and JWT_SECRET are picked up locally
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let command = Cli::parse().command.unwrap_or(Commands::Serve {
        port: None,
        bind: "0.0.0.0".to_string(),
        memory: false,
    });

    match command {
        Commands::Serve { port, bind, memory } => serve(port, bind, memory).await,
    }
}

async fn serve(port: Option<u16>, bind: String, memory: bool) -> anyhow::Result<()> {
    tracing::info!("Starting placement CRM API in {:?} mode", CONFIG.environment);

    if CONFIG.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in {:?}", CONFIG.environment);
    }

    let state = if memory {
        tracing::warn!("serving from the in-memory store; data is lost on exit");
        memory_state()
    } else {
        postgres_state().await?
    };

    let port = port
        .or_else(|| std::env::var("CRM_API_PORT").ok().and_then(|s| s.parse().ok()))
        .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(3000);
    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Placement CRM API listening on http://{}", bind_addr);
    axum::serve(listener, routes::app(state)).await?;
    Ok(())
}

fn memory_state() -> AppState {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    AppState::new(
        store.clone(),
        Arc::new(StaticPermissionOracle::new()),
        Arc::new(StaticDirectory::new()),
        Arc::new(StoreActivityLog::new(store)),
    )
}

async fn postgres_state() -> anyhow::Result<AppState> {
    let pool = DatabaseManager::connect().await?;
    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(pool.clone()));
    let activity: Arc<dyn ActivityLog> = if CONFIG.security.enable_audit_logging {
        Arc::new(StoreActivityLog::new(store.clone()))
    } else {
        Arc::new(TracingActivityLog)
    };
    Ok(AppState::new(
        store,
        Arc::new(PgPermissionOracle::new(pool.clone())),
        Arc::new(PgDirectory::new(pool)),
        activity,
    ))
}
