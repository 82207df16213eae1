//! Deployments as the normalizer sees them
//!
//! [`DeploymentRef`] is a read-only snapshot of one InferenceService: its
//! identity, labels and annotations, and the status fields the readiness
//! gate and the field merger need.

use std::collections::BTreeMap;

use chrono::DateTime;
use kube::ResourceExt;

use bridge_common::crd::{
    InferenceService, InferenceServiceStatus, INGRESS_READY, PREDICTOR_READY, READY,
    TRANSITION_UP_TO_DATE,
};
use bridge_common::{Error, ANNOTATION_PREFIX, MODEL_VERSION_ID_LABEL, REGISTERED_MODEL_ID_LABEL};

/// Snapshot of one model-serving deployment
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentRef {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
    /// Labels, possibly carrying registry correlation hints
    pub labels: BTreeMap<String, String>,
    /// Annotations, possibly carrying catalog properties
    pub annotations: BTreeMap<String, String>,
    /// Externally reachable URL reported in status
    pub status_url: Option<String>,
    /// Where the served model was loaded from
    pub artifact_location: Option<String>,
    /// Model framework, lowercased, with version when known
    pub model_format: Option<String>,
    /// Serving status as reported by the runtime
    pub status: InferenceServiceStatus,
}

/// Registry ids carried by a deployment's labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryHints {
    /// Registered model id
    pub registered_model_id: String,
    /// Model version id
    pub model_version_id: String,
}

/// Outcome of the readiness gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Serving and reachable
    Ready,
    /// Not yet usable; the reason names the first unmet requirement
    NotReady(&'static str),
}

/// Cluster-side details looked up next to the deployment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServingDetails {
    /// `http://<svc>.<ns>.svc.cluster.local[:port]` of the predictor service
    pub internal_url: Option<String>,
    /// Whether a service account owned by the deployment exists
    pub authentication: bool,
}

impl DeploymentRef {
    /// Snapshot an InferenceService
    pub fn from_resource(isvc: &InferenceService) -> Result<Self, Error> {
        let name = isvc.name_any();
        let namespace = isvc
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "InferenceService must be namespaced"))?;
        let model = isvc.spec.predictor.model.as_ref();
        let model_format = model.and_then(|m| m.model_format.as_ref()).map(|f| {
            let tag = match &f.version {
                Some(v) if !v.is_empty() => format!("{}-{}", f.name, v),
                _ => f.name.clone(),
            };
            tag.to_ascii_lowercase()
        });

        let status = isvc.status.clone().unwrap_or_default();
        Ok(Self {
            namespace,
            name,
            labels: isvc.labels().clone(),
            annotations: isvc.annotations().clone(),
            status_url: status.url.clone().filter(|u| !u.is_empty()),
            artifact_location: model.and_then(|m| m.artifact_location()),
            model_format,
            status,
        })
    }

    /// `namespace/name`, for logs
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Registry ids from labels, when both are present
    pub fn registry_hints(&self) -> Option<RegistryHints> {
        let rm = self.labels.get(REGISTERED_MODEL_ID_LABEL).filter(|v| !v.is_empty())?;
        let mv = self.labels.get(MODEL_VERSION_ID_LABEL).filter(|v| !v.is_empty())?;
        Some(RegistryHints {
            registered_model_id: rm.clone(),
            model_version_id: mv.clone(),
        })
    }

    /// Whether the registry manages this deployment (either id label is set)
    pub fn is_registry_managed(&self) -> bool {
        self.labels.contains_key(REGISTERED_MODEL_ID_LABEL)
            || self.labels.contains_key(MODEL_VERSION_ID_LABEL)
    }

    /// Catalog property set through an annotation.
    ///
    /// The annotation key is the prefix plus the property name lowercased
    /// with spaces removed, so `How to use` is read from
    /// `rhdh.modelcatalog.io/howtouse`.
    pub fn annotation_property(&self, property: &str) -> Option<String> {
        let key = format!(
            "{ANNOTATION_PREFIX}{}",
            property.to_lowercase().replace(' ', "")
        );
        self.annotations
            .get(&key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Readiness gate for cluster-only catalog entries
    pub fn readiness(&self) -> Readiness {
        if self.status.conditions.is_empty() {
            return Readiness::NotReady("no status conditions");
        }
        let up_to_date = self
            .status
            .model_status
            .as_ref()
            .and_then(|m| m.transition_status.as_deref())
            == Some(TRANSITION_UP_TO_DATE);
        if !up_to_date {
            return Readiness::NotReady("model status not up to date");
        }
        for condition in [INGRESS_READY, PREDICTOR_READY, READY] {
            if !self.status.condition_is_true(condition) {
                return Readiness::NotReady(condition);
            }
        }
        if self.status_url.is_none() {
            return Readiness::NotReady("no status URL");
        }
        Readiness::Ready
    }

    /// Last-modified marker: the latest condition transition, epoch milliseconds
    pub fn last_update_millis(&self) -> u64 {
        self.status
            .conditions
            .iter()
            .filter_map(|c| c.last_transition_time.as_deref())
            .filter_map(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis().max(0) as u64)
            .max()
            .unwrap_or(0)
    }
}

/// External and internal API URLs for a served deployment.
///
/// A status URL that is itself cluster-internal is replaced by the predictor
/// service URL, which then serves as both.
pub fn api_urls(status_url: &str, internal_url: Option<&str>) -> (String, Option<String>) {
    let internal = internal_url.filter(|u| !u.is_empty()).map(str::to_string);
    if status_url.contains("svc.cluster.local") {
        let url = internal.clone().unwrap_or_else(|| status_url.to_string());
        return (url, internal);
    }
    (status_url.to_string(), internal)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use bridge_common::crd::{InferenceServiceSpec, ModelFormat, ModelSpec, PredictorSpec};

    #[test]
    fn snapshot_reads_identity_model_and_status() {
        let mut isvc = InferenceService::new(
            "mnist-v1",
            InferenceServiceSpec {
                predictor: PredictorSpec {
                    model: Some(ModelSpec {
                        model_format: Some(ModelFormat {
                            name: "ONNX".to_string(),
                            version: Some("1".to_string()),
                        }),
                        storage_uri: Some("s3://models/mnist".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            },
        );
        isvc.metadata.namespace = Some("ns".to_string());
        isvc.status = Some(InferenceServiceStatus {
            url: Some("https://kserve.example".to_string()),
            ..Default::default()
        });

        let deployment = DeploymentRef::from_resource(&isvc).unwrap();
        assert_eq!(deployment.display_name(), "ns/mnist-v1");
        assert_eq!(deployment.model_format.as_deref(), Some("onnx-1"));
        assert_eq!(deployment.artifact_location.as_deref(), Some("s3://models/mnist"));
        assert_eq!(deployment.status_url.as_deref(), Some("https://kserve.example"));
    }

    #[test]
    fn cluster_scoped_resource_is_rejected() {
        let isvc = InferenceService::new("mnist", InferenceServiceSpec::default());
        assert!(DeploymentRef::from_resource(&isvc).is_err());
    }

    #[test]
    fn ready_deployment_passes_gate() {
        let deployment = ready_deployment("ns", "mnist-v1", "https://kserve.example");
        assert_eq!(deployment.readiness(), Readiness::Ready);
    }

    #[test]
    fn each_unmet_requirement_blocks_gate() {
        let mut no_conditions = ready_deployment("ns", "m", "https://x");
        no_conditions.status.conditions.clear();
        assert!(matches!(no_conditions.readiness(), Readiness::NotReady(_)));

        let mut stale = ready_deployment("ns", "m", "https://x");
        stale.status.model_status = None;
        assert_eq!(stale.readiness(), Readiness::NotReady("model status not up to date"));

        let mut ingress_down = ready_deployment("ns", "m", "https://x");
        ingress_down.status.conditions[0].status = "False".to_string();
        assert_eq!(ingress_down.readiness(), Readiness::NotReady(INGRESS_READY));

        let mut no_url = ready_deployment("ns", "m", "https://x");
        no_url.status_url = None;
        assert_eq!(no_url.readiness(), Readiness::NotReady("no status URL"));
    }

    #[test]
    fn registry_hints_need_both_labels() {
        let deployment = ready_deployment("ns", "m", "https://x");
        assert!(deployment.registry_hints().is_none());
        assert!(!deployment.is_registry_managed());

        let labelled = labelled(deployment.clone(), "1", "2");
        assert_eq!(
            labelled.registry_hints(),
            Some(RegistryHints {
                registered_model_id: "1".to_string(),
                model_version_id: "2".to_string(),
            })
        );

        let mut half = deployment;
        half.labels
            .insert(REGISTERED_MODEL_ID_LABEL.to_string(), "1".to_string());
        assert!(half.registry_hints().is_none());
        assert!(half.is_registry_managed());
    }

    #[test]
    fn annotation_properties_use_folded_keys() {
        let mut deployment = DeploymentRef::default();
        deployment.annotations.insert(
            "rhdh.modelcatalog.io/howtouse".to_string(),
            "curl it".to_string(),
        );
        deployment
            .annotations
            .insert("rhdh.modelcatalog.io/owner".to_string(), "  ".to_string());
        assert_eq!(deployment.annotation_property("How to use").as_deref(), Some("curl it"));
        assert!(deployment.annotation_property("Owner").is_none());
    }

    #[test]
    fn marker_is_latest_transition() {
        let mut deployment = ready_deployment("ns", "m", "https://x");
        deployment.status.conditions[1].last_transition_time =
            Some("2025-03-01T00:00:00Z".to_string());
        assert_eq!(deployment.last_update_millis(), 1_740_787_200_000);
        assert_eq!(DeploymentRef::default().last_update_millis(), 0);
    }

    #[test]
    fn cluster_local_status_url_is_replaced_by_service_url() {
        let (external, internal) = api_urls(
            "http://mnist.ns.svc.cluster.local",
            Some("http://mnist-predictor.ns.svc.cluster.local:8080"),
        );
        assert_eq!(external, "http://mnist-predictor.ns.svc.cluster.local:8080");
        assert_eq!(internal.as_deref(), Some("http://mnist-predictor.ns.svc.cluster.local:8080"));

        let (external, internal) = api_urls("https://kserve.example", None);
        assert_eq!(external, "https://kserve.example");
        assert!(internal.is_none());
    }
}
