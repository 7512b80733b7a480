//! drop-store server binary.
//!
//! A flat-directory file store over HTTP: multipart uploads, a JSON listing,
//! deletion by name and static fetch of stored bytes. The directory is the
//! only source of truth; nothing else is persisted.

mod background;
mod config;
mod error;
mod etag;
mod files;
mod http;
mod logging;
mod mimetype;
mod routes;
mod staging;
mod storage;
mod upload;

#[cfg(test)]
mod test_support;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::signal;
use tracing::info;

use crate::background::spawn_background_tasks;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::routes::build_router;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let env_file = config::load_env_file(None);
    logging::init_logging();
    if let Some(path) = env_file {
        info!(path = %path.display(), "loaded environment file");
    }

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.store_dir)));
    let upload_config = Arc::new(UploadConfig {
        staging_dir: PathBuf::from(&args.staging_dir),
        staging_ttl: Duration::from_secs(args.staging_ttl_secs),
    });
    storage.ensure_root().await?;
    fs::create_dir_all(&upload_config.staging_dir).await?;

    let app = build_router(
        storage.clone(),
        upload_config.clone(),
        args.cors_origins.as_deref(),
    );

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    let store_dir = fs::canonicalize(storage.root_path())
        .await
        .unwrap_or_else(|_| storage.root_path().to_path_buf());
    info!("Server running on {}", addr);
    info!("Uploads directory: {}", store_dir.display());

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(upload_config);
    tokio::spawn(shutdown_signal(handle));
    server.await
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
