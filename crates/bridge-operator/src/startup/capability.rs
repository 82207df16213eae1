//! Waiting for the InferenceService capability
//!
//! KServe may still be installing when the bridge starts. Rather than crash
//! loop, poll for the CRD and for a working cluster-wide list, giving up
//! after a bounded time.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::info;

use bridge_common::crd::{InferenceService, INFERENCE_SERVICE_CRD_NAME};
use bridge_common::polling::{wait_for_resource, CAPABILITY_POLL_INTERVAL, CAPABILITY_POLL_TIMEOUT};

/// Block until InferenceServices can be listed cluster-wide
pub async fn wait_for_inference_services(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let services: Api<InferenceService> = Api::all(client.clone());

    wait_for_resource(
        "InferenceService CRD",
        CAPABILITY_POLL_TIMEOUT,
        CAPABILITY_POLL_INTERVAL,
        || {
            let crds = crds.clone();
            async move {
                crds.get_opt(INFERENCE_SERVICE_CRD_NAME)
                    .await
                    .map(|crd| crd.map(|_| ()))
                    .map_err(|e| e.to_string())
            }
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("KServe is not installed: {e}"))?;

    wait_for_resource(
        "InferenceService list",
        CAPABILITY_POLL_TIMEOUT,
        CAPABILITY_POLL_INTERVAL,
        || {
            let services = services.clone();
            async move {
                services
                    .list(&ListParams::default().limit(1))
                    .await
                    .map(|_| Some(()))
                    .map_err(|e| e.to_string())
            }
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("cannot list InferenceServices: {e}"))?;

    info!(crd = INFERENCE_SERVICE_CRD_NAME, "InferenceService capability available");
    Ok(())
}
