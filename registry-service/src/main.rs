use registry_service::{
    build_router,
    config::RegistryConfig,
    db::Database,
    services::{encryption::load_data_key, settings::init_settings, NativeKeyProvider},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = RegistryConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting registry service"
    );

    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;

    // The server must not start with sealed fields it cannot read
    let provider = NativeKeyProvider::new(config.encryption.key_directory.clone());
    let data_key = load_data_key(&db, &provider, &config.encryption.root_key_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load database encryption key");
            e
        })?;

    let settings = init_settings(&db, &data_key, &config.password_policy).await?;
    if settings.setup_required {
        tracing::warn!("setup required: POST /api/setup to create the admin identity");
    }

    let addr: SocketAddr = config.common.bind_address().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("invalid bind address: {}", e))
    })?;

    let state = AppState::new(config, db, data_key);
    let app = build_router(state);

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
