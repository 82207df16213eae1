//! Periodic full pass
//!
//! Walks every registry endpoint and every live deployment, upserts one
//! record per model version and one per unmanaged deployment, then submits
//! the union of their keys as the current key set. The storage tier deletes
//! whatever is missing from that set.
//!
//! A key set is only submitted when enumeration succeeded everywhere. If a
//! listing fails, the keys it would have contributed are unknown, and
//! submitting a partial set would delete live records.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_common::{Error, ImportKey};
use bridge_registry::ModelRegistry;

use crate::context::CorrelationContext;
use crate::correlator::{
    artifacts_for, deployment_for_version, serving_environment_names, version_match,
};
use crate::deployment::{DeploymentRef, Readiness};
use crate::reconcile::Normalizer;

/// What one full pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records written (including ones the storage tier ignored as stale)
    pub upserted: usize,
    /// Items whose build, encode or upsert failed
    pub failed: usize,
    /// Keys the pass produced, sorted
    pub keys: Vec<ImportKey>,
    /// Keys the storage tier removed after the key-set submission
    pub removed: Vec<ImportKey>,
    /// Whether the key set was submitted
    pub key_set_submitted: bool,
}

#[derive(Default)]
struct PassState {
    summary: PassSummary,
    keys: BTreeSet<ImportKey>,
    // deployments some registry version correlates to
    matched: BTreeSet<(String, String)>,
    complete: bool,
}

impl PassState {
    fn new() -> Self {
        Self {
            complete: true,
            ..Default::default()
        }
    }

    fn incomplete(&mut self, what: &str, error: &Error) {
        warn!(error = %error, "Failed to list {what}, key set will not be submitted this pass");
        self.complete = false;
    }

    fn record(&mut self, published: Result<ImportKey, Error>) {
        match published {
            Ok(_) => self.summary.upserted += 1,
            Err(e) => {
                warn!(error = %e, "Failed to publish catalog entry");
                self.summary.failed += 1;
            }
        }
    }
}

impl Normalizer {
    /// Run one full pass.
    ///
    /// Passes never overlap: a caller arriving while one runs waits for it,
    /// unless `cancel` fires first.
    pub async fn run_full_pass(&self, cancel: &CancellationToken) -> Result<PassSummary, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("full pass")),
            summary = async {
                let _pass = self.pass_lock.lock().await;
                self.full_pass().await
            } => summary,
        }
    }

    async fn full_pass(&self) -> Result<PassSummary, Error> {
        self.refresh_registries().await;
        let mut state = PassState::new();

        let deployments = match self.deployments.list().await {
            Ok(deployments) => deployments,
            Err(e) => {
                state.incomplete("deployments", &e);
                Vec::new()
            }
        };

        let registries = self.registries().await;
        for (endpoint, registry) in registries.iter() {
            debug!(endpoint = %endpoint, "Scanning registry");
            self.registry_half(registry.as_ref(), &deployments, &mut state)
                .await;
        }

        self.cluster_half(&deployments, &mut state).await;

        let PassState {
            mut summary,
            keys,
            complete,
            ..
        } = state;
        summary.keys = keys.into_iter().collect();

        if complete {
            summary.removed = self.storage.post_current_key_set(&summary.keys).await?;
            summary.key_set_submitted = true;
        }

        info!(
            upserted = summary.upserted,
            failed = summary.failed,
            keys = summary.keys.len(),
            removed = summary.removed.len(),
            key_set_submitted = summary.key_set_submitted,
            "Full pass complete"
        );
        Ok(summary)
    }

    /// One write per live model version of one registry
    async fn registry_half(
        &self,
        registry: &dyn ModelRegistry,
        deployments: &[DeploymentRef],
        state: &mut PassState,
    ) {
        let models = match registry.list_registered_models().await {
            Ok(models) => models,
            Err(e) => return state.incomplete("registered models", &e),
        };
        let records = match registry.list_inference_services().await {
            Ok(records) => records,
            Err(e) => return state.incomplete("inference services", &e),
        };
        let environment_names = match serving_environment_names(registry, &records).await {
            Ok(names) => names,
            Err(e) => return state.incomplete("serving environments", &e),
        };

        for rm in models.iter().filter(|rm| !rm.is_archived()) {
            let versions = match registry.list_model_versions(&rm.id).await {
                Ok(versions) => versions,
                Err(e) => {
                    state.incomplete("model versions", &e);
                    continue;
                }
            };

            for mv in versions.iter().filter(|mv| !mv.is_archived()) {
                match ImportKey::for_model_version(&rm.name, &mv.name) {
                    Ok(key) => {
                        state.keys.insert(key);
                    }
                    Err(e) => {
                        warn!(
                            registered_model = %rm.id,
                            model_version = %mv.id,
                            error = %e,
                            "Model version has no usable import key"
                        );
                        state.summary.failed += 1;
                        continue;
                    }
                }

                for d in deployments {
                    if version_match(d, rm, mv, &records, &environment_names).is_some() {
                        state.matched.insert((d.namespace.clone(), d.name.clone()));
                    }
                }

                let deployment =
                    deployment_for_version(deployments, rm, mv, &records, &environment_names);
                let artifacts = artifacts_for(registry, mv).await;
                let serving = match deployment {
                    Some(d) => self.serving_details(d).await,
                    None => None,
                };
                let ctx = CorrelationContext::registry(
                    rm,
                    mv,
                    &artifacts,
                    deployment,
                    serving.as_ref(),
                    &self.defaults,
                );
                state.record(self.publish(&ctx, Some(registry)).await);
            }
        }
    }

    /// One write per ready deployment no registry covers
    async fn cluster_half(&self, deployments: &[DeploymentRef], state: &mut PassState) {
        for d in deployments {
            if d.is_registry_managed()
                || state.matched.contains(&(d.namespace.clone(), d.name.clone()))
            {
                continue;
            }
            match ImportKey::for_deployment(&d.namespace, &d.name) {
                Ok(key) => {
                    state.keys.insert(key);
                }
                Err(e) => {
                    warn!(
                        deployment = %d.display_name(),
                        error = %e,
                        "Deployment has no usable import key"
                    );
                    state.summary.failed += 1;
                    continue;
                }
            }

            // unready deployments keep their key so an existing record survives
            if let Readiness::NotReady(reason) = d.readiness() {
                debug!(deployment = %d.display_name(), reason, "Skipping unready deployment");
                continue;
            }
            let serving = self.serving_details(d).await;
            let ctx = CorrelationContext::cluster_only(d, serving.as_ref(), &self.defaults);
            state.record(self.publish(&ctx, None).await);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::deployment::fixtures::{labelled, ready_deployment};
    use crate::testing::{FakeDeployments, FakeRegistry, RecordingStorage};
    use bridge_common::config::NormalizerFormat;
    use bridge_registry::RegistryClientSet;
    use bridge_storage::Provenance;

    fn registry() -> FakeRegistry {
        FakeRegistry::new("https://registry")
            .with_model("1", "mnist")
            .with_version("2", "1", "v1")
            .with_version("3", "1", "v2")
            .with_artifact("2", "https://host/mnist.onnx")
    }

    fn normalizer(
        deployments: FakeDeployments,
        registries: Vec<FakeRegistry>,
        storage: RecordingStorage,
    ) -> (Normalizer, Arc<RecordingStorage>) {
        let storage = Arc::new(storage);
        let set = RegistryClientSet::from_clients(
            registries
                .into_iter()
                .map(|r| Arc::new(r) as Arc<dyn ModelRegistry>),
        );
        let normalizer = Normalizer::new(Arc::new(deployments), storage.clone(), set)
            .with_format(NormalizerFormat::JsonArray);
        (normalizer, storage)
    }

    fn keys(summary: &PassSummary) -> Vec<&str> {
        summary.keys.iter().map(ImportKey::as_str).collect()
    }

    #[tokio::test]
    async fn key_set_covers_registry_versions_and_cluster_only_deployments() {
        let deployments = FakeDeployments::new(vec![
            labelled(ready_deployment("ns", "mnist-v1", "https://kserve.example"), "1", "2"),
            ready_deployment("ns", "fraud", "https://fraud.example"),
        ]);
        let (normalizer, storage) =
            normalizer(deployments, vec![registry()], RecordingStorage::default());

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();

        assert_eq!(keys(&summary), vec!["mnist_v1", "mnist_v2", "ns_fraud"]);
        assert!(summary.key_set_submitted);
        assert_eq!(summary.upserted, 3);
        assert_eq!(storage.key_sets(), vec![summary.keys.clone()]);

        let upserts = storage.upserts();
        let served = upserts.iter().find(|u| u.key.as_str() == "mnist_v1").unwrap();
        assert_eq!(served.provenance, Provenance::Registry);
        assert!(String::from_utf8_lossy(&served.body.body).contains("https://kserve.example"));
        let unserved = upserts.iter().find(|u| u.key.as_str() == "mnist_v2").unwrap();
        assert!(!String::from_utf8_lossy(&unserved.body.body).contains("modelServer"));
    }

    #[tokio::test]
    async fn archived_versions_are_left_out_of_the_key_set() {
        let (normalizer, storage) = normalizer(
            FakeDeployments::default(),
            vec![registry().archive_version("3")],
            RecordingStorage::default(),
        );

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(keys(&summary), vec!["mnist_v1"]);
        assert_eq!(storage.upserts().len(), 1);
    }

    #[tokio::test]
    async fn failed_listing_withholds_the_key_set() {
        let mut failing = FakeRegistry::new("https://down").with_model("9", "other");
        failing.fail_listing = true;
        let (normalizer, storage) = normalizer(
            FakeDeployments::default(),
            vec![registry(), failing],
            RecordingStorage::default(),
        );

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();
        assert!(!summary.key_set_submitted);
        assert!(storage.key_sets().is_empty());
        // the healthy registry is still published
        assert_eq!(summary.upserted, 2);
    }

    /// Story: one model's versions cannot be listed
    ///
    /// The other model's versions are still published, including the one
    /// whose artifacts could not be fetched, but the pass does not know every
    /// key so it submits no key set.
    #[tokio::test]
    async fn story_partial_registry_data_still_publishes_what_it_can() {
        let registry = registry()
            .with_model("4", "fraud")
            .with_version("5", "4", "v1")
            .failing_versions("4")
            .failing_artifacts("2");
        let (normalizer, storage) = normalizer(
            FakeDeployments::default(),
            vec![registry],
            RecordingStorage::default(),
        );

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();

        assert!(!summary.key_set_submitted);
        assert!(storage.key_sets().is_empty());
        assert_eq!(summary.failed, 0);
        assert_eq!(keys(&summary), vec!["mnist_v1", "mnist_v2"]);

        let upserts = storage.upserts();
        assert_eq!(upserts.len(), 2);
        let without_artifacts = upserts.iter().find(|u| u.key.as_str() == "mnist_v1").unwrap();
        assert_eq!(without_artifacts.provenance, Provenance::Registry);
        assert!(!String::from_utf8_lossy(&without_artifacts.body.body).contains("mnist.onnx"));
    }

    #[tokio::test]
    async fn failed_deployment_listing_withholds_the_key_set() {
        let deployments = FakeDeployments {
            fail_listing: true,
            ..Default::default()
        };
        let (normalizer, storage) =
            normalizer(deployments, vec![registry()], RecordingStorage::default());

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();
        assert!(!summary.key_set_submitted);
        assert!(storage.key_sets().is_empty());
    }

    #[tokio::test]
    async fn failed_upserts_keep_their_keys() {
        let storage = RecordingStorage {
            fail_upserts: true,
            ..Default::default()
        };
        let (normalizer, storage) =
            normalizer(FakeDeployments::default(), vec![registry()], storage);

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.upserted, 0);
        assert_eq!(storage.key_sets()[0].len(), 2);
    }

    /// Story: registry-managed deployments never become cluster-only entries
    ///
    /// A labelled deployment whose version is gone, a deployment matched by
    /// the name heuristic, and an unready unmanaged deployment. Only the last
    /// one contributes a cluster-only key, and it is not written.
    #[tokio::test]
    async fn story_cluster_only_keys_exclude_registry_covered_deployments() {
        let mut unready = ready_deployment("ns", "pending", "https://pending.example");
        unready.status.conditions.clear();
        let deployments = FakeDeployments::new(vec![
            labelled(ready_deployment("ns", "orphan", "https://orphan.example"), "7", "7"),
            ready_deployment("ns", "mnist-v2", "https://v2.example"),
            unready,
        ]);
        let (normalizer, storage) =
            normalizer(deployments, vec![registry()], RecordingStorage::default());

        let summary = normalizer.run_full_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(keys(&summary), vec!["mnist_v1", "mnist_v2", "ns_pending"]);
        assert!(storage.upserts().iter().all(|u| u.key.as_str() != "ns_pending"));

        let v2 = storage
            .upserts()
            .into_iter()
            .find(|u| u.key.as_str() == "mnist_v2")
            .unwrap();
        assert!(String::from_utf8_lossy(&v2.body.body).contains("https://v2.example"));
    }

    #[tokio::test]
    async fn cancelled_pass_submits_nothing() {
        let (normalizer, storage) = normalizer(
            FakeDeployments::default(),
            vec![registry()],
            RecordingStorage::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = normalizer.run_full_pass(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert!(storage.key_sets().is_empty());
        assert!(storage.upserts().is_empty());
    }

    #[tokio::test]
    async fn cancellation_does_not_wait_for_a_running_pass() {
        let (normalizer, storage) = normalizer(
            FakeDeployments::default(),
            vec![registry()],
            RecordingStorage::default(),
        );
        let _running = normalizer.pass_lock.lock().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), normalizer.run_full_pass(&cancel))
            .await
            .expect("cancelled pass should not wait for the lock");
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert!(storage.key_sets().is_empty());
    }
}
