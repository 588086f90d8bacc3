use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use push_dispatch_service::config::{LogConfig, Settings};
use push_dispatch_service::notification::ProtocolRegistry;
use push_dispatch_service::postgres::PostgresPool;
use push_dispatch_service::server::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!("Configuration loaded");

    // Connect to PostgreSQL when it backs the stores
    let postgres_pool = match (settings.store.backend.as_str(), &settings.database) {
        ("postgres", Some(database)) => {
            let pool = PostgresPool::new(database).await?;
            pool.ensure_schema().await?;
            Some(Arc::new(pool))
        }
        ("postgres", None) => {
            tracing::warn!("store.backend is postgres but no [database] section is configured");
            None
        }
        _ => None,
    };

    // Create application state
    let registry = Arc::new(ProtocolRegistry::default());
    let state = AppState::with_backends(settings.clone(), postgres_pool.clone(), registry);
    tracing::info!(
        store = state.store.backend_type(),
        sms = settings.transport.sms_enabled,
        email = settings.transport.email_enabled,
        "Application state initialized"
    );

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
