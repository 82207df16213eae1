//! Controller runner - wires the normalizer into a kube controller
//!
//! Three tasks share one [`Normalizer`]:
//! - the InferenceService controller, one reconcile cycle per event
//! - a deletion watcher, since the controller never sees deleted objects
//! - the periodic full pass, which is the only deletion path

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bridge_common::config::{NormalizerConfig, NormalizerSettings};
use bridge_common::crd::InferenceService;
use bridge_normalizer::controller::{error_policy, reconcile, run_pass_loop, Context};
use bridge_normalizer::{KubeDeploymentSource, Normalizer};
use bridge_registry::discovery::KubeRouteResolver;
use bridge_storage::StorageRestClient;

use crate::startup::wait_for_inference_services;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the normalizer until a shutdown signal arrives
pub async fn run(settings: &NormalizerSettings) -> anyhow::Result<()> {
    let config = NormalizerConfig::from_settings(settings)?;
    info!(
        format = %config.format,
        polling_interval = ?config.polling_interval,
        storage_url = %config.storage_url,
        registry_routes = config.route_hints.len(),
        registry_urls = config.registry_urls.len(),
        "Starting normalizer"
    );

    let client = Client::try_default().await?;
    wait_for_inference_services(&client).await?;

    let normalizer = Arc::new(
        Normalizer::from_config(
            &config,
            Arc::new(KubeRouteResolver::new(client.clone())),
            Arc::new(KubeDeploymentSource::new(client.clone())),
            Arc::new(StorageRestClient::new(&config.storage_url, config.http_timeout)?),
        )
        .await,
    );

    let cancel = CancellationToken::new();
    let passes = tokio::spawn(run_pass_loop(
        normalizer.clone(),
        config.polling_interval,
        cancel.clone(),
    ));
    let deletions = tokio::spawn(watch_deletions(
        Api::all(client.clone()),
        normalizer.clone(),
        cancel.clone(),
    ));

    run_controller(client, normalizer, cancel.clone(), config.max_concurrent_reconciles).await;

    info!("Controller stopped, shutting down background tasks");
    cancel.cancel();
    passes.await?;
    deletions.await?;
    Ok(())
}

/// Run the InferenceService controller until a shutdown signal arrives
async fn run_controller(
    client: Client,
    normalizer: Arc<Normalizer>,
    cancel: CancellationToken,
    concurrency: u16,
) {
    let ctx = Arc::new(Context::new(normalizer, cancel));
    let services: Api<InferenceService> = Api::all(client);

    info!(concurrency, "- InferenceService controller");

    Controller::new(services, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("InferenceService"))
        .await;
}

/// Request a full pass for every deleted InferenceService
async fn watch_deletions(
    api: Api<InferenceService>,
    normalizer: Arc<Normalizer>,
    cancel: CancellationToken,
) {
    let mut events =
        pin!(watcher::watcher(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .default_backoff());

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(Event::Delete(isvc))) => {
                info!(
                    name = %isvc.name_any(),
                    namespace = ?isvc.namespace(),
                    "InferenceService deleted, requesting full pass"
                );
                normalizer.request_pass();
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(error = %e, "InferenceService deletion watch error"),
            None => break,
        }
    }
    debug!("Deletion watcher stopped");
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
