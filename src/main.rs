use std::net::SocketAddr;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyway::config::Config;
use keyway::db::{AppState, create_pool, init_db, queries};
use keyway::handlers;
use keyway::licensing::{self, DEFAULT_VALID_DAYS, IssueKey};

const SEED_EMAIL: &str = "dev@keyway.local";

#[derive(Parser, Debug)]
#[command(name = "keyway")]
#[command(about = "Premium key issuance and validation driven by payment webhooks")]
struct Cli {
    /// Issue a demo key for dev@keyway.local (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Issues (or reuses) a demo key so the validate endpoint can be tried
/// without a payment provider.
fn seed_dev_data(state: &AppState) -> anyhow::Result<()> {
    let mut conn = state.db.get()?;
    let issued = licensing::issue_key(
        &mut conn,
        &IssueKey {
            email: SEED_EMAIL.to_string(),
            valid_days: Some(DEFAULT_VALID_DAYS),
            ..Default::default()
        },
    )?;

    tracing::info!("============================================");
    tracing::info!(
        "DEV KEY {}",
        if issued.reused { "ALREADY PRESENT" } else { "SEEDED" }
    );
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  email: {}", issued.license.email);
    println!("  key: {}", issued.license.key);
    println!("--- END COPY ---");
    println!();

    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.allows_any_origin() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Credentials cannot be combined with wildcard headers/methods.
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(true))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set: webhook deliveries will be refused");
    }
    if config.admin_secret.is_none() {
        tracing::warn!("ADMIN_SECRET not set: admin API will be refused");
    }

    let db_pool = create_pool(&config.database_path).context("Failed to create database pool")?;
    {
        let conn = db_pool.get().context("Failed to get connection")?;
        init_db(&conn).context("Failed to initialize database")?;
    }

    let state = AppState {
        db: db_pool,
        webhook_secret: config.webhook_secret.clone(),
        admin_secret: config.admin_secret.clone(),
    };

    // Purge old webhook events on startup (0 = never purge)
    if config.webhook_event_retention_days > 0 {
        let conn = state.db.get().context("Failed to get connection for purge")?;
        match queries::purge_old_webhook_events(&conn, config.webhook_event_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} webhook events older than {} days",
                    count,
                    config.webhook_event_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old webhook events: {}", e);
            }
        }
    }

    {
        let conn = state.db.get().context("Failed to get connection")?;
        match queries::count_webhook_events(&conn) {
            Ok(count) => tracing::info!("Webhook event log holds {} deliveries", count),
            Err(e) => tracing::warn!("Failed to count webhook events: {}", e),
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set KEYWAY_ENV=dev)");
        } else {
            seed_dev_data(&state)?;
        }
    }

    let app = handlers::router(state.clone(), config.validate_rate_limit_rpm)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cli.ephemeral && !config.dev_mode {
        tracing::warn!("--ephemeral flag ignored: not in dev mode (set KEYWAY_ENV=dev)");
    }
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Keyway server listening on {}", addr);

    // Peer address is needed for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if cleanup_on_exit {
        let db_path = &config.database_path;
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
