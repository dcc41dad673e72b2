//! Process entry point: load configuration, apply migrations, start the
//! scheduling engine and serve the HTTP API until a shutdown signal arrives.

use std::time::Duration;

use anyhow::{Context, Result};
use dts::api::{self, AppState};
use dts::config::Config;
use dts::engine::Scheduler;
use dts_store::{schema, Store};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config.log_level);

    let store = Store::new(&config.db_path);
    {
        let mut conn = store.connect()?;
        let applied = schema::apply_migrations(&mut conn, schema::migrations_dir())?;
        info!(applied, db_path = %config.db_path.display(), "schema up to date");
    }

    let scheduler = Scheduler::spawn(store.clone(), config.clone())?;

    let state = AppState {
        store: store.clone(),
        default_max_attempts: config.max_attempts,
    };
    let router = api::create_router(state);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server stopped unexpectedly")?;

    info!("shutting down scheduler");
    scheduler.stop(SHUTDOWN_TIMEOUT);

    Ok(())
}

fn init_tracing(configured_level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(configured_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install the Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install the SIGTERM signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
