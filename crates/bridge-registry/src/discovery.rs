//! Registry endpoint discovery
//!
//! Registry endpoints come from two places: base URLs given directly in
//! configuration, and cluster routes named by route hints. A route is used
//! only once its ingress has been admitted. Every lookup is bounded by the
//! configured HTTP timeout so a slow API server cannot stall startup.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use bridge_common::config::{NormalizerConfig, RouteHint};
use bridge_common::Error;

use crate::client::{ModelRegistry, RegistryRestClient};
use crate::client_set::RegistryClientSet;

/// Resolves a route hint into a registry base URL
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RouteResolver: Send + Sync {
    /// Base URL of the route, or `None` if it does not exist or is not admitted
    async fn resolve(&self, hint: &RouteHint) -> Result<Option<String>, Error>;
}

/// Resolves OpenShift routes through the Kubernetes API
pub struct KubeRouteResolver {
    client: Client,
    resource: ApiResource,
}

impl KubeRouteResolver {
    /// Create a resolver using the given client
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("route.openshift.io", "v1", "Route");
        Self {
            client,
            resource: ApiResource::from_gvk(&gvk),
        }
    }
}

/// Extract the base URL of an admitted route from its JSON body
pub fn admitted_route_url(route: &Value) -> Option<String> {
    let admitted = route
        .pointer("/status/ingress")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|ingress| {
            ingress
                .get("conditions")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
        })
        .any(|c| {
            c.get("type").and_then(Value::as_str) == Some("Admitted")
                && c.get("status").and_then(Value::as_str) == Some("True")
        });
    if !admitted {
        return None;
    }

    let host = route
        .pointer("/spec/host")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())?;
    let scheme = if route.pointer("/spec/tls").is_some_and(|t| !t.is_null()) {
        "https"
    } else {
        "http"
    };
    Some(format!("{scheme}://{host}"))
}

#[async_trait]
impl RouteResolver for KubeRouteResolver {
    async fn resolve(&self, hint: &RouteHint) -> Result<Option<String>, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &hint.namespace, &self.resource);
        let Some(route) = api.get_opt(&hint.name).await? else {
            return Ok(None);
        };
        let body = serde_json::to_value(&route)
            .map_err(|e| Error::serialization(format!("route {}: {e}", hint.name)))?;
        Ok(admitted_route_url(&body))
    }
}

/// Build the client set for a configuration.
///
/// Endpoints that fail to resolve are logged and left out; an empty set is
/// valid and means every deployment is treated as cluster-only.
pub async fn build_client_set(
    config: &NormalizerConfig,
    resolver: &dyn RouteResolver,
) -> RegistryClientSet {
    let mut urls: Vec<String> = config.registry_urls.clone();

    for hint in &config.route_hints {
        match tokio::time::timeout(config.http_timeout, resolver.resolve(hint)).await {
            Ok(Ok(Some(url))) => {
                info!(
                    namespace = %hint.namespace,
                    route = %hint.name,
                    url = %url,
                    "Resolved registry route"
                );
                urls.push(url);
            }
            Ok(Ok(None)) => {
                warn!(
                    namespace = %hint.namespace,
                    route = %hint.name,
                    "Registry route not found or not admitted"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    namespace = %hint.namespace,
                    route = %hint.name,
                    error = %e,
                    "Registry route lookup failed"
                );
            }
            Err(_) => {
                warn!(
                    namespace = %hint.namespace,
                    route = %hint.name,
                    "Registry route lookup timed out"
                );
            }
        }
    }

    let mut set = RegistryClientSet::new();
    for url in urls {
        match RegistryRestClient::new(&url, config.registry_token.clone(), config.http_timeout) {
            Ok(client) => set.insert(Arc::new(client) as Arc<dyn ModelRegistry>),
            Err(e) => warn!(url = %url, error = %e, "Skipping registry endpoint"),
        }
    }
    set
}
