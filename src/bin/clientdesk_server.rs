//! clientdesk-server: client intake and staff onboarding REST service.
//!
//! ## Configuration
//! - `clientdesk.yaml` in the working directory, if present
//! - `--config <path>` or CLIENTDESK_CONFIG: additional YAML file
//! - CLIENTDESK__SECTION__KEY environment overrides
//! - CLIENTDESK_LOG: tracing filter (default: info)

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use clientdesk::config::Config;
use clientdesk::handlers::rest::{self, AppState};
use clientdesk::storage::{connect, init_schema};
use clientdesk::utils::bootstrap::{init_tracing, parse_config_path};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!(
        environment = ?config.environment,
        storage = %config.storage.path,
        "starting clientdesk-server"
    );

    let pool = connect(&config.storage).await?;
    init_schema(&pool).await?;

    let state = Arc::new(AppState::new(pool.clone(), &config));
    let seeded = state
        .auth
        .seed_users(&config.auth, config.environment.is_production())
        .await?;
    info!(users = seeded, "user accounts provisioned");

    let app = rest::router(
        state,
        &config.server,
        config.environment.is_production(),
    );
    let listener = TcpListener::bind(config.server.bind_address()).await?;

    let result = rest::serve(listener, app, shutdown_signal()).await;
    pool.close().await;
    info!("clientdesk-server stopped");
    result
}
