//! Deployment source
//!
//! Where deployments come from. The kube implementation reads
//! InferenceServices plus the Services and ServiceAccounts they own.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use bridge_common::crd::InferenceService;
use bridge_common::Error;

use crate::deployment::{DeploymentRef, ServingDetails};

/// Owner kind linking Services and ServiceAccounts to a deployment
const OWNER_KIND: &str = "InferenceService";

/// Suffix of the predictor Service KServe creates
const PREDICTOR_SERVICE_SUFFIX: &str = "-predictor";

/// Read access to live deployments
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentSource: Send + Sync {
    /// Get one deployment; `None` when it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DeploymentRef>, Error>;

    /// Every deployment in every namespace
    async fn list(&self) -> Result<Vec<DeploymentRef>, Error>;

    /// Predictor service URL and authentication for a deployment
    async fn serving_details(&self, deployment: &DeploymentRef) -> Result<ServingDetails, Error>;
}

/// [`DeploymentSource`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeDeploymentSource {
    client: Client,
}

impl KubeDeploymentSource {
    /// Create a source using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentSource for KubeDeploymentSource {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DeploymentRef>, Error> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await?
            .map(|isvc| DeploymentRef::from_resource(&isvc))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<DeploymentRef>, Error> {
        let api: Api<InferenceService> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .iter()
            .filter_map(|isvc| match DeploymentRef::from_resource(isvc) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(error = %e, "Skipping unusable InferenceService");
                    None
                }
            })
            .collect())
    }

    async fn serving_details(&self, deployment: &DeploymentRef) -> Result<ServingDetails, Error> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &deployment.namespace);
        let accounts: Api<ServiceAccount> =
            Api::namespaced(self.client.clone(), &deployment.namespace);
        let params = ListParams::default();

        let (services, accounts) =
            tokio::try_join!(services.list(&params), accounts.list(&params))?;

        Ok(ServingDetails {
            internal_url: predictor_service_url(&services.items, &deployment.name),
            authentication: accounts
                .items
                .iter()
                .any(|sa| owned_by(&sa.metadata, &deployment.name)),
        })
    }
}

/// Whether an object is owned by the named InferenceService
pub fn owned_by(meta: &ObjectMeta, deployment: &str) -> bool {
    meta.owner_references
        .iter()
        .flatten()
        .any(|o| o.kind == OWNER_KIND && o.name == deployment)
}

/// Cluster-local URL of the deployment's predictor Service.
///
/// Uses the first port, preferring its numeric target port; port 80 is
/// left implicit.
pub fn predictor_service_url(services: &[Service], deployment: &str) -> Option<String> {
    let svc = services.iter().find(|svc| {
        owned_by(&svc.metadata, deployment)
            && svc
                .metadata
                .name
                .as_deref()
                .is_some_and(|n| n.ends_with(PREDICTOR_SERVICE_SUFFIX))
    })?;
    let name = svc.metadata.name.as_deref()?;
    let namespace = svc.metadata.namespace.as_deref()?;

    let port = svc
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|p| match p.target_port {
            Some(IntOrString::Int(target)) => target,
            _ => p.port,
        })
        .unwrap_or(0);

    let port_suffix = match port {
        0 | 80 => String::new(),
        p => format!(":{p}"),
    };
    Some(format!("http://{name}.{namespace}.svc.cluster.local{port_suffix}"))
}
