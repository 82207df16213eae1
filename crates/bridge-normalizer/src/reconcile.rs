//! Per-deployment reconciliation
//!
//! [`Normalizer`] owns everything a reconcile cycle needs: the registry
//! client set, the deployment source and the storage client. A cycle reads
//! one deployment, correlates it, builds and encodes its catalog entry and
//! upserts it. Deletions never delete directly; they request a full pass,
//! whose key-set submission is the only deletion path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_common::config::{NormalizerConfig, NormalizerFormat};
use bridge_common::{Error, ImportKey};
use bridge_registry::discovery::{build_client_set, RouteResolver};
use bridge_registry::{ModelRegistry, RegistryClientSet};
use bridge_storage::{PostBody, StorageClient};

use crate::context::{CorrelationContext, Defaults};
use crate::correlator::{
    correlate, deployment_for_version, serving_environment_names, Correlation, RegistryMatch,
};
use crate::deployment::{DeploymentRef, Readiness, ServingDetails};
use crate::encode::encode;
use crate::merge::build_entity;
use crate::source::DeploymentSource;

/// Requeue delay for a deployment that is not ready yet
pub const NOT_READY_REQUEUE: Duration = Duration::from_secs(10);

/// Result of one reconcile cycle
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Nothing further to do until the deployment changes
    Done,
    /// Try again after the delay
    Requeue(Duration),
    /// Hard failure, surfaced to the caller
    Error(Error),
}

impl ReconcileOutcome {
    /// Whether the cycle completed without further work
    pub fn is_done(&self) -> bool {
        matches!(self, ReconcileOutcome::Done)
    }
}

impl From<Result<(), Error>> for ReconcileOutcome {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => ReconcileOutcome::Done,
            Err(e) => ReconcileOutcome::Error(e),
        }
    }
}

/// Where a configuration refresh rebuilds the registry client set from
struct RegistryRefresh {
    config: NormalizerConfig,
    resolver: Arc<dyn RouteResolver>,
}

/// The reconciliation core
pub struct Normalizer {
    registries: RwLock<Arc<RegistryClientSet>>,
    refresh: Option<RegistryRefresh>,
    pub(crate) deployments: Arc<dyn DeploymentSource>,
    pub(crate) storage: Arc<dyn StorageClient>,
    pub(crate) format: NormalizerFormat,
    pub(crate) defaults: Defaults,
    pass_trigger: Notify,
    pub(crate) pass_lock: Mutex<()>,
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("format", &self.format)
            .field("defaults", &self.defaults)
            .field("refreshes_registries", &self.refresh.is_some())
            .finish()
    }
}

impl Normalizer {
    /// A normalizer over a fixed registry client set
    pub fn new(
        deployments: Arc<dyn DeploymentSource>,
        storage: Arc<dyn StorageClient>,
        registries: RegistryClientSet,
    ) -> Self {
        Self {
            registries: RwLock::new(Arc::new(registries)),
            refresh: None,
            deployments,
            storage,
            format: NormalizerFormat::default(),
            defaults: Defaults::default(),
            pass_trigger: Notify::new(),
            pass_lock: Mutex::new(()),
        }
    }

    /// A normalizer configured from `config`, discovering registries through `resolver`.
    ///
    /// The client set is rebuilt at the start of every full pass.
    pub async fn from_config(
        config: &NormalizerConfig,
        resolver: Arc<dyn RouteResolver>,
        deployments: Arc<dyn DeploymentSource>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let registries = build_client_set(config, resolver.as_ref()).await;
        info!(endpoints = registries.len(), "Built registry client set");
        let mut normalizer = Self::new(deployments, storage, registries)
            .with_format(config.format)
            .with_defaults(Defaults {
                owner: config.default_owner.clone(),
                lifecycle: config.default_lifecycle.clone(),
            });
        normalizer.refresh = Some(RegistryRefresh {
            config: config.clone(),
            resolver,
        });
        normalizer
    }

    /// Set the output encoding
    pub fn with_format(mut self, format: NormalizerFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the owner/lifecycle fallbacks
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Snapshot of the current registry client set
    pub async fn registries(&self) -> Arc<RegistryClientSet> {
        self.registries.read().await.clone()
    }

    /// Rebuild the registry client set from configuration, if configured to
    pub async fn refresh_registries(&self) {
        let Some(refresh) = &self.refresh else {
            return;
        };
        let set = build_client_set(&refresh.config, refresh.resolver.as_ref()).await;
        debug!(endpoints = set.len(), "Refreshed registry client set");
        *self.registries.write().await = Arc::new(set);
    }

    /// Ask the periodic task to run a full pass as soon as it can
    pub fn request_pass(&self) {
        self.pass_trigger.notify_one();
    }

    /// Resolves once a full pass has been requested
    pub async fn pass_requested(&self) {
        self.pass_trigger.notified().await;
    }

    /// Reconcile one deployment.
    ///
    /// Cancelling `cancel` abandons the cycle before its upsert completes.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                ReconcileOutcome::Error(Error::cancelled(format!("reconcile {namespace}/{name}")))
            }
            outcome = self.reconcile_deployment(namespace, name) => outcome,
        }
    }

    async fn reconcile_deployment(&self, namespace: &str, name: &str) -> ReconcileOutcome {
        let deployment = match self.deployments.get(namespace, name).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) => {
                info!(
                    namespace = %namespace,
                    name = %name,
                    "Deployment gone, requesting cleanup pass"
                );
                self.request_pass();
                return ReconcileOutcome::Done;
            }
            Err(e) => return ReconcileOutcome::Error(e),
        };

        let registries = self.registries().await;
        match correlate(&registries, &deployment).await {
            Correlation::Matched(found) => {
                let registry = registries.get(&found.endpoint).map(|r| r.as_ref());
                let server = match registry {
                    Some(registry) => {
                        match self.server_deployment(registry, &found, deployment).await {
                            Ok(server) => server,
                            Err(e) => return ReconcileOutcome::Error(e),
                        }
                    }
                    None => deployment,
                };
                let serving = self.serving_details(&server).await;
                let ctx =
                    CorrelationContext::matched(&found, &server, serving.as_ref(), &self.defaults);
                self.publish(&ctx, registry).await.map(|_| ()).into()
            }
            Correlation::NoMatch if deployment.is_registry_managed() => {
                debug!(
                    deployment = %deployment.display_name(),
                    "Registry-managed deployment has no live version, leaving it to the full pass"
                );
                ReconcileOutcome::Done
            }
            Correlation::NoMatch => {
                if let Readiness::NotReady(reason) = deployment.readiness() {
                    debug!(
                        deployment = %deployment.display_name(),
                        reason,
                        "Deployment not ready, requeueing"
                    );
                    return ReconcileOutcome::Requeue(NOT_READY_REQUEUE);
                }
                let serving = self.serving_details(&deployment).await;
                let ctx =
                    CorrelationContext::cluster_only(&deployment, serving.as_ref(), &self.defaults);
                self.publish(&ctx, None).await.map(|_| ()).into()
            }
        }
    }

    /// The deployment whose server a version's entry describes.
    ///
    /// Several deployments can serve one version but the version has a
    /// single key, so per-event cycles pick the same deployment the full
    /// pass does.
    async fn server_deployment(
        &self,
        registry: &dyn ModelRegistry,
        found: &RegistryMatch,
        deployment: DeploymentRef,
    ) -> Result<DeploymentRef, Error> {
        let mut candidates = self.deployments.list().await?;
        match candidates
            .iter_mut()
            .find(|d| d.namespace == deployment.namespace && d.name == deployment.name)
        {
            Some(listed) => *listed = deployment.clone(),
            None => candidates.push(deployment.clone()),
        }
        let records = registry.list_inference_services().await?;
        let environment_names = serving_environment_names(registry, &records).await?;

        let chosen = deployment_for_version(
            &candidates,
            &found.registered_model,
            &found.model_version,
            &records,
            &environment_names,
        );
        match chosen {
            Some(chosen)
                if chosen.namespace != deployment.namespace || chosen.name != deployment.name =>
            {
                debug!(
                    deployment = %deployment.display_name(),
                    server = %chosen.display_name(),
                    model_version = %found.model_version.id,
                    "Another deployment serves this version's entry"
                );
                Ok(chosen.clone())
            }
            _ => Ok(deployment),
        }
    }

    /// Serving details of a URL-bearing deployment; lookup failures leave them out
    pub(crate) async fn serving_details(
        &self,
        deployment: &DeploymentRef,
    ) -> Option<ServingDetails> {
        deployment.status_url.as_ref()?;
        match self.deployments.serving_details(deployment).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(
                    deployment = %deployment.display_name(),
                    error = %e,
                    "Failed to read predictor service and service accounts"
                );
                None
            }
        }
    }

    /// Build, encode and upsert one catalog entry
    pub(crate) async fn publish(
        &self,
        ctx: &CorrelationContext<'_>,
        registry: Option<&dyn ModelRegistry>,
    ) -> Result<ImportKey, Error> {
        let entity = build_entity(ctx)?;
        let mut body = PostBody {
            body: encode(&entity, self.format)?,
            last_update_time_since_epoch: entity.last_update.to_string(),
            ..Default::default()
        };

        if let (Some(source), Some(registry)) = (&entity.model_card_source, registry) {
            match registry
                .get_model_card(&source.source, &source.repository, &source.model)
                .await
            {
                Ok(Some(card)) => {
                    body.model_card_key = entity.key.as_str().to_string();
                    body.model_card = card;
                }
                Ok(None) => debug!(
                    key = %entity.key,
                    model = %source.model,
                    "No model card in catalog"
                ),
                Err(e) => warn!(
                    key = %entity.key,
                    model = %source.model,
                    error = %e,
                    "Failed to fetch model card, publishing without it"
                ),
            }
        }

        let outcome = self
            .storage
            .upsert(&entity.key, entity.provenance, &body)
            .await?;
        info!(
            key = %entity.key,
            provenance = entity.provenance.as_str(),
            served = entity.server.is_some(),
            ?outcome,
            "Published catalog entry"
        );
        Ok(entity.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::fixtures::{labelled, ready_deployment};
    use crate::source::MockDeploymentSource;
    use crate::testing::{FakeDeployments, FakeRegistry, RecordingStorage};
    use bridge_common::properties;
    use bridge_registry::CustomProperties;
    use bridge_storage::Provenance;

    fn registry() -> FakeRegistry {
        FakeRegistry::new("https://registry")
            .with_model("1", "mnist")
            .with_version("2", "1", "v1")
            .with_artifact("2", "https://host/mnist.onnx")
    }

    fn normalizer(
        deployments: Vec<DeploymentRef>,
        registry: FakeRegistry,
    ) -> (Normalizer, Arc<RecordingStorage>) {
        let storage = Arc::new(RecordingStorage::default());
        let normalizer = Normalizer::new(
            Arc::new(FakeDeployments::new(deployments)),
            storage.clone(),
            RegistryClientSet::from_clients([Arc::new(registry) as Arc<dyn ModelRegistry>]),
        )
        .with_format(NormalizerFormat::JsonArray);
        (normalizer, storage)
    }

    #[tokio::test]
    async fn correlated_deployment_is_published_under_registry_key() {
        let deployment =
            labelled(ready_deployment("ns", "mnist-v1", "https://kserve.example"), "1", "2");
        let (normalizer, storage) = normalizer(vec![deployment], registry());

        let outcome = normalizer
            .reconcile("ns", "mnist-v1", &CancellationToken::new())
            .await;
        assert!(outcome.is_done(), "unexpected outcome: {outcome:?}");

        let upserts = storage.upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].key.as_str(), "mnist_v1");
        assert_eq!(upserts[0].provenance, Provenance::Registry);
        assert_eq!(upserts[0].body.last_update_time_since_epoch, "2000");
        let body = String::from_utf8(upserts[0].body.body.clone()).unwrap();
        assert!(body.contains("https://host/mnist.onnx"));
        assert!(body.contains("https://kserve.example"));
    }

    /// Story: a cluster-only deployment waits for readiness
    ///
    /// Until every readiness requirement holds there is no catalog entry,
    /// and the cycle asks to be retried rather than failing.
    #[tokio::test]
    async fn version_served_twice_keeps_one_server() {
        let first = labelled(ready_deployment("aa", "mnist-v1", "https://aa.example"), "1", "2");
        let second = labelled(ready_deployment("zz", "mnist-v1", "https://zz.example"), "1", "2");
        let (normalizer, storage) = normalizer(vec![first, second], registry());
        let cancel = CancellationToken::new();

        normalizer.run_full_pass(&cancel).await.unwrap();
        assert!(normalizer.reconcile("zz", "mnist-v1", &cancel).await.is_done());
        assert!(normalizer.reconcile("aa", "mnist-v1", &cancel).await.is_done());

        let bodies: Vec<String> = storage
            .upserts()
            .into_iter()
            .filter(|u| u.key.as_str() == "mnist_v1")
            .map(|u| String::from_utf8(u.body.body).unwrap())
            .collect();
        assert_eq!(bodies.len(), 3);
        for body in &bodies {
            assert!(body.contains("https://aa.example"), "wrong server in {body}");
            assert!(!body.contains("https://zz.example"), "wrong server in {body}");
        }
    }

    #[tokio::test]
    async fn story_unready_cluster_only_deployment_is_requeued() {
        let mut deployment = ready_deployment("ns", "fraud", "https://kserve.example");
        deployment.status.conditions.retain(|c| c.type_ != "PredictorReady");
        let (normalizer, storage) = normalizer(vec![deployment], registry());

        let outcome = normalizer.reconcile("ns", "fraud", &CancellationToken::new()).await;
        assert!(matches!(outcome, ReconcileOutcome::Requeue(d) if d == NOT_READY_REQUEUE));
        assert!(storage.upserts().is_empty());
    }

    #[tokio::test]
    async fn ready_cluster_only_deployment_is_published() {
        let deployment = ready_deployment("ns", "fraud", "https://kserve.example");
        let (normalizer, storage) = normalizer(vec![deployment], registry());

        let outcome = normalizer.reconcile("ns", "fraud", &CancellationToken::new()).await;
        assert!(outcome.is_done());
        let upserts = storage.upserts();
        assert_eq!(upserts[0].key.as_str(), "ns_fraud");
        assert_eq!(upserts[0].provenance, Provenance::ClusterOnly);
    }

    #[tokio::test]
    async fn missing_deployment_requests_a_pass() {
        let (normalizer, storage) = normalizer(vec![], registry());

        let outcome = normalizer.reconcile("ns", "gone", &CancellationToken::new()).await;
        assert!(outcome.is_done());
        assert!(storage.upserts().is_empty());

        // the stored permit makes this resolve immediately
        tokio::time::timeout(Duration::from_secs(1), normalizer.pass_requested())
            .await
            .expect("pass should have been requested");
    }

    #[tokio::test]
    async fn registry_managed_deployment_without_version_is_left_alone() {
        let deployment = labelled(ready_deployment("ns", "orphan", "https://x"), "9", "9");
        let (normalizer, storage) = normalizer(vec![deployment], registry());

        let outcome = normalizer.reconcile("ns", "orphan", &CancellationToken::new()).await;
        assert!(outcome.is_done());
        assert!(storage.upserts().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_an_error() {
        let storage = Arc::new(RecordingStorage {
            fail_upserts: true,
            ..Default::default()
        });
        let normalizer = Normalizer::new(
            Arc::new(FakeDeployments::new(vec![ready_deployment("ns", "m", "https://x")])),
            storage,
            RegistryClientSet::new(),
        );

        let outcome = normalizer.reconcile("ns", "m", &CancellationToken::new()).await;
        assert!(matches!(outcome, ReconcileOutcome::Error(e) if e.status() == Some(503)));
    }

    #[tokio::test]
    async fn source_failure_is_an_error() {
        let mut source = MockDeploymentSource::new();
        source
            .expect_get()
            .returning(|_, _| Err(Error::internal("api server unavailable")));
        let normalizer = Normalizer::new(
            Arc::new(source),
            Arc::new(RecordingStorage::default()),
            RegistryClientSet::new(),
        );

        let outcome = normalizer.reconcile("ns", "m", &CancellationToken::new()).await;
        assert!(matches!(outcome, ReconcileOutcome::Error(_)));
    }

    #[tokio::test]
    async fn cancelled_cycle_writes_nothing() {
        let (normalizer, storage) = normalizer(
            vec![ready_deployment("ns", "fraud", "https://kserve.example")],
            registry(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = normalizer.reconcile("ns", "fraud", &cancel).await;
        assert!(matches!(outcome, ReconcileOutcome::Error(Error::Cancelled { .. })));
        assert!(storage.upserts().is_empty());
    }

    #[tokio::test]
    async fn model_card_is_attached_when_catalog_has_one() {
        let mut registry = registry().version_properties(
            "2",
            CustomProperties::default()
                .with(properties::CATALOG_SOURCE_NAME, "rhoai")
                .with(properties::CATALOG_REPOSITORY_NAME, "rhelai1")
                .with(properties::CATALOG_MODEL_NAME, "granite"),
        );
        registry
            .model_cards
            .insert("granite".to_string(), "# Granite".to_string());
        let deployment = labelled(ready_deployment("ns", "mnist-v1", "https://x"), "1", "2");
        let (normalizer, storage) = normalizer(vec![deployment], registry);

        normalizer.reconcile("ns", "mnist-v1", &CancellationToken::new()).await;
        let upserts = storage.upserts();
        assert_eq!(upserts[0].body.model_card, "# Granite");
        assert_eq!(upserts[0].body.model_card_key, "mnist_v1");
    }
}
