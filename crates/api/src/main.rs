//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use projections::{InMemoryAllocationsView, PostgresAllocationsView};
use service_layer::{BroadcastPublisher, Dependencies, LoggingNotifier};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Logs every published event; stands in for an external message broker.
fn spawn_publish_logger(publisher: &BroadcastPublisher) {
    let mut receiver = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    tracing::info!(channel = %message.channel, payload = %message.payload, "event published");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "publish logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and the allocations view
    let deps = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            Dependencies::new(
                Arc::new(store),
                Arc::new(PostgresAllocationsView::new(pool)),
            )
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Dependencies::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryAllocationsView::new()),
            )
        }
    };

    // 4. Wire external collaborators and build the message bus
    let publisher = BroadcastPublisher::default();
    spawn_publish_logger(&publisher);
    let deps = deps
        .with_notifier(Arc::new(LoggingNotifier::new()))
        .with_publisher(Arc::new(publisher))
        .with_alert_recipient(config.alert_recipient.clone());
    let state = api::create_state(deps);

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
