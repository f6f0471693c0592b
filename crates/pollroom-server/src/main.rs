use anyhow::Result;
use clap::Parser;
use pollroom_core::store::{NullStore, PollStore, SqlPollStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pollroom=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    ensure_data_dir(&config.database.url);
    let store = open_store(&config.database).await;
    let store_status = if store.connected() { "Connected" } else { "In-memory only" };

    let app_config = config.app_config();
    let cors = pollroom_api::cors_layer(&app_config);
    let state = pollroom_core::AppState::new(store, app_config);
    let coordinator = state.coordinator.clone();

    let app = pollroom_api::build_router()
        .merge(pollroom_ws::gateway_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind = %config.server.bind_address,
        store = store_status,
        "Pollroom server listening"
    );

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if tokio::time::timeout(Duration::from_secs(5), coordinator.reconciler().flush())
        .await
        .is_err()
    {
        tracing::warn!("Gave up waiting for pending tally writes");
    }

    Ok(())
}

/// Pick the durable store once at startup. Any failure leaves the server
/// running on the in-memory history.
async fn open_store(database: &config::DatabaseConfig) -> Arc<dyn PollStore> {
    if database.url.is_empty() {
        tracing::info!("No database URL configured, polls are kept in memory");
        return Arc::new(NullStore);
    }

    let pool = match pollroom_db::create_pool(&database.url, database.max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!("Database connection failed, falling back to memory: {e}");
            return Arc::new(NullStore);
        }
    };
    if let Err(e) = pollroom_db::run_migrations(&pool).await {
        tracing::warn!("Database migrations failed, falling back to memory: {e}");
        pool.close().await;
        return Arc::new(NullStore);
    }

    tracing::info!("Database connected");
    Arc::new(SqlPollStore::new(pool))
}

/// SQLite will not create missing parent directories for a file database.
fn ensure_data_dir(database_url: &str) {
    if let Some(db_path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}
