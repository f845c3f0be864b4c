//! Settlement engine HTTP server.
//!
//! Order lifecycle and payment settlement over Postgres, with a hosted
//! payment gateway at the boundary.

use boxoffice::config::Config;
use boxoffice::payment_gateway::{MockPaymentGateway, PaymentGateway};
use boxoffice::server::{build_router, AppState};
use boxoffice::store::PostgresStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting settlement engine HTTP server");

    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.url,
        "Configuration loaded"
    );

    boxoffice::metrics::register_business_metrics();

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Duration::from_secs(config.postgres.idle_timeout))
        .connect(&config.postgres.url)
        .await?;

    let store = PostgresStore::new(pool);
    store.migrate().await?;
    info!("Database connected, schema ready");

    let gateway: Arc<dyn PaymentGateway> = if config.gateway.secret_key.is_some() {
        // A real adapter would be constructed here from the secret key and
        // `config.gateway.request_timeout`; the mock takes neither and
        // stands in until one is wired up.
        tracing::warn!("GATEWAY_SECRET_KEY set but no live adapter built, using mock gateway");
        MockPaymentGateway::shared()
    } else {
        info!("No gateway credentials configured, using mock gateway");
        MockPaymentGateway::shared()
    };

    let state = AppState::new(
        Arc::new(store),
        gateway,
        Duration::from_secs(config.fees.tier_cache_ttl),
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for:
/// - Ctrl+C (SIGINT)
/// - SIGTERM (in production environments)
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
