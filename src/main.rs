use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use folder_store::{
    api,
    config::{Config, StorageBackend, StorageConfig},
    object_store::{GcsStore, LocalStore, ObjectStore},
    service::{FileService, FolderService},
    storage::{Database, MetadataStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "folder-store starting");

    let config = Config::load()?;

    let db = Database::open(&config.server.data_dir)?;
    info!(data_dir = %config.server.data_dir, "Metadata database ready");

    let objects = open_object_store(&config.storage).await?;

    let metadata: Arc<dyn MetadataStore> = Arc::new(db.clone());
    let files = FileService::new(Arc::clone(&metadata), Arc::clone(&objects));
    let folders = FolderService::new(metadata, objects, files.clone());

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState {
        config,
        db,
        files,
        folders,
    });

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Listening");

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn open_object_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match storage.backend {
        StorageBackend::Local => {
            let store = LocalStore::new(&storage.local_storage_path)?;
            info!(root = %storage.local_storage_path, "Using local object storage");
            Ok(Arc::new(store))
        }
        StorageBackend::Gcs => {
            let Some(bucket) = storage.gcs_bucket.as_deref() else {
                anyhow::bail!("GCS_BUCKET is required when STORAGE_BACKEND=gcs");
            };
            let store = GcsStore::new(bucket, storage.gcs_credentials_file.as_deref()).await?;
            info!(bucket, "Using GCS object storage");
            Ok(Arc::new(store))
        }
    }
}

/// `LOG_FORMAT=gcp` emits Cloud Logging records, `json` plain JSON lines,
/// anything else human-readable output.
fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let output: Box<dyn Layer<Registry> + Send + Sync> = match format.to_lowercase().as_str() {
        "gcp" => tracing_stackdriver::layer().boxed(),
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry().with(output).with(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
