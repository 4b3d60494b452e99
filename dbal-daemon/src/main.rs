use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dbal_daemon::config::{Cli, DaemonConfig, ServiceConfig};
use dbal_daemon::{build_router, AppState, SERVICE_VERSION};

fn init_tracing() {
    let level = std::env::var("DBAL_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn log_startup(config: &DaemonConfig, service: &ServiceConfig) {
    tracing::info!("DBAL daemon v{SERVICE_VERSION} - database abstraction layer server");
    tracing::info!("Configuration file: {}", config.config_file);
    tracing::info!(
        "Run mode: {}",
        if config.development_mode { "development" } else { "production" }
    );
    tracing::info!("Client configuration:");
    tracing::info!("  adapter: '{}'", service.client.adapter);
    tracing::info!(
        "  database_url: '{}'",
        dbal_daemon::state::redact_database_url(&service.client.database_url)
    );
    tracing::info!("  mode: '{}'", service.client.mode);
    if !service.client.endpoint.is_empty() {
        tracing::info!("  endpoint: '{}'", service.client.endpoint);
    }
}

fn log_endpoints() {
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  GET  /version     - Version information");
    tracing::info!("  GET  /status      - Server status");
    tracing::info!("  *    /{{tenant}}/{{package}}/{{entity}} - Entity CRUD");
    tracing::info!("  *    /{{tenant}}/{{package}}/blob      - Blob storage");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let mut config = DaemonConfig::from_env();
    config.apply_cli(&cli);

    let service = ServiceConfig::from_env(&config);
    log_startup(&config, &service);

    let blob = dbal_blob::BlobConfig::from_env().build();
    let state = AppState::new(service, blob);
    let router = build_router(state);

    let address = config.address();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%address, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on {address}");
    log_endpoints();
    if config.daemon_mode {
        tracing::info!("Daemon mode: running until SIGINT/SIGTERM");
    }

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = serve.await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
    tracing::info!("Daemon stopped.");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("Shutting down DBAL daemon...");
}
