//! Registrar HTTP/JSON API binary.

use std::sync::Arc;

use clap::Parser;
use registrar_core::{Database, Role};
use registrar_server::{create_router, AppState, Args};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registrar_server=info,registrar_core=info".into()),
        )
        .init();

    let config = Args::parse().into_config();

    info!(
        listen = %config.listen_addr,
        data_path = %config.data_path.display(),
        temporary = config.temporary,
        hook_enabled = config.has_hook(),
        "starting registrar server"
    );

    if config.jwt_secret.is_none() {
        anyhow::bail!("no JWT secret configured (set REGISTRAR_JWT_SECRET or --jwt-secret)");
    }

    let db = Arc::new(Database::open(config.storage_config())?);
    info!("database opened");

    if let Some(identity) = config.bootstrap_admin {
        if db.bootstrap_role(identity, Role::Admin)? {
            info!(%identity, "bootstrap admin granted");
        } else {
            info!(%identity, "bootstrap admin already holds the admin role");
        }
    }

    let state = AppState::from_config(db.clone(), &config)
        .ok_or_else(|| anyhow::anyhow!("no JWT secret configured"))?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("received shutdown signal");
        })
        .await?;

    db.flush()?;
    info!("server shutdown complete");
    Ok(())
}
