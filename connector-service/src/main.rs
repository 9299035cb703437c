use connector_service::{
    build_router, certs::CertCache, config::ConnectorConfig, tls, AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ConnectorConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        upstream = %config.upstream_url,
        "Starting connector service"
    );

    let ca_cert = tokio::fs::read_to_string(&config.ca_cert_path).await.map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "failed to read CA certificate {}: {}",
            config.ca_cert_path.display(),
            e
        ))
    })?;
    let ca_key = tokio::fs::read_to_string(&config.ca_key_path).await.map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "failed to read CA key {}: {}",
            config.ca_key_path.display(),
            e
        ))
    })?;

    let certs = CertCache::new(&ca_cert, &ca_key)?;
    for host in &config.hostnames {
        certs.add_host(host)?;
    }
    tracing::info!(hosts = ?certs.hosts(), "certificate cache ready");

    let addr: SocketAddr = config.common.bind_address().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("invalid bind address: {}", e))
    })?;

    let state = AppState::new(config, certs)?;
    let tls_config = tls::server_config(state.certs.clone())?;
    let app = build_router(state);

    tracing::info!(address = %addr, "Listening (tls)");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tls::serve(listener, tls_config, app, shutdown_signal()).await?;

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
