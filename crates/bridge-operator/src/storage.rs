//! Storage tier subcommand

use std::sync::Arc;

use kube::Client;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bridge_common::config::{StorageBackendKind, StorageServerConfig};
use bridge_storage::configmap::ConfigMapStorage;
use bridge_storage::server::serve;
use bridge_storage::{
    BridgeStorage, CatalogNotifier, LocationNotifier, MemoryStorage, NoopNotifier, StorageState,
};

/// Serve the storage tier until SIGTERM or ctrl-c
pub async fn run(config: &StorageServerConfig) -> anyhow::Result<()> {
    let storage: Arc<dyn BridgeStorage> = match config.backend {
        StorageBackendKind::Memory => Arc::new(MemoryStorage::new()),
        StorageBackendKind::ConfigMap => {
            let client = Client::try_default().await?;
            Arc::new(ConfigMapStorage::new(client, &config.namespace))
        }
    };

    let notifier: Arc<dyn CatalogNotifier> = match &config.location_url {
        Some(url) => {
            info!(
                location_url = %url,
                public_url = %config.public_url,
                "Notifying location service"
            );
            Arc::new(LocationNotifier::new(url, &config.public_url, config.http_timeout)?)
        }
        None => {
            warn!("LOCATION_URL not set, imports and removals will not be announced");
            Arc::new(NoopNotifier)
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    serve(config, Arc::new(StorageState::new(storage, notifier)), shutdown).await?;
    Ok(())
}

/// Cancel `token` on SIGTERM or ctrl-c
async fn cancel_on_signal(token: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, only ctrl-c stops the server");
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
            return;
        }
    };
    tokio::select! {
        _ = terminate.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received ctrl-c"),
    }
    token.cancel();
}
