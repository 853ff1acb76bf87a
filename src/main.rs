use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use nimbus_files::{EnvValues, FileStore, LocalFileStore, StoreConfig};

/// Main entry point for the nimbus file store
///
/// Serves the REST API until Ctrl-C, then drains in-flight requests and removes the backing
/// directory along with every file still stored in it.
///
/// # Environment Variables
/// - `NIMBUS_REST_ADDR`: REST server address (default: "0.0.0.0:5000")
/// - `NIMBUS_STORE_DIR`: backing directory (default: ".nimbus_tmp")
/// - `NIMBUS_MAX_UPLOAD_BYTES`, `NIMBUS_CHUNK_SIZE`, `NIMBUS_FILE_FIELD`,
///   `NIMBUS_ALLOWED_EXTENSIONS`, `NIMBUS_ALLOW_NO_EXT`: see `StoreConfig::from_env_values`
///
/// # Returns
/// * `Ok(())` - If the server ran and the store was torn down
/// * `Err(anyhow::Error)` - If configuration, startup, serving or teardown fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nimbus=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("NIMBUS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".into());

    let config = StoreConfig::from_env_values(EnvValues::from_process_env())?;
    let store = Arc::new(LocalFileStore::new(config)?);

    tracing::info!("++ Starting nimbus REST on {}", rest_addr);
    tracing::info!("++ Storing files in {}", store.directory().display());

    let app = api_rest::router(AppState::new(store.clone()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Shutting down, removing stored files");
    let cleanup = Arc::clone(&store);
    tokio::task::spawn_blocking(move || cleanup.teardown()).await??;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
        std::future::pending::<()>().await;
    }
}
