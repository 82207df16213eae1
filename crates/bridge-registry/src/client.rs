//! Model registry client
//!
//! [`ModelRegistry`] is the seam the normalizer depends on; the HTTP
//! implementation talks to one registry endpoint's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use bridge_common::Error;

use crate::types::{
    CatalogModel, InferenceServiceRecord, ListResponse, ModelArtifact, ModelVersion,
    RegisteredModel, ServingEnvironment,
};
use crate::{CATALOG_BASE_PATH, REGISTRY_BASE_PATH};

/// Page size requested from list endpoints
const PAGE_SIZE: u32 = 100;

/// Upper bound on pages fetched from one list endpoint
const MAX_PAGES: usize = 1000;

/// Read access to one model registry endpoint
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Base URL identifying this endpoint
    fn endpoint(&self) -> String;

    /// List every registered model
    async fn list_registered_models(&self) -> Result<Vec<RegisteredModel>, Error>;

    /// Get one registered model
    async fn get_registered_model(&self, id: &str) -> Result<RegisteredModel, Error>;

    /// List the versions of a registered model
    async fn list_model_versions(
        &self,
        registered_model_id: &str,
    ) -> Result<Vec<ModelVersion>, Error>;

    /// Get one model version
    async fn get_model_version(&self, id: &str) -> Result<ModelVersion, Error>;

    /// List the artifacts of a model version
    async fn list_model_artifacts(
        &self,
        model_version_id: &str,
    ) -> Result<Vec<ModelArtifact>, Error>;

    /// List every inference-service record
    async fn list_inference_services(&self) -> Result<Vec<InferenceServiceRecord>, Error>;

    /// Get one serving environment
    async fn get_serving_environment(&self, id: &str) -> Result<ServingEnvironment, Error>;

    /// Fetch the catalog readme for a model registered from the catalog
    async fn get_model_card(
        &self,
        source: &str,
        repository: &str,
        model: &str,
    ) -> Result<Option<String>, Error>;
}

/// HTTP implementation of [`ModelRegistry`]
#[derive(Clone)]
pub struct RegistryRestClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RegistryRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryRestClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RegistryRestClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::registry(&base_url, format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, token, client))
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(
        base_url: impl Into<String>,
        token: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    fn registry_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, REGISTRY_BASE_PATH, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        debug!(url = %url, "Registry GET");
        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::registry(&self.base_url, format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::registry_status(
                &self.base_url,
                status.as_u16(),
                format!("GET {url} returned {status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::registry(&self.base_url, format!("invalid JSON from {url}: {e}")))
    }

    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, Error> {
        let url = self.registry_url(path);
        let mut items = Vec::new();
        let mut token = String::new();

        for _ in 0..MAX_PAGES {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if !token.is_empty() {
                query.push(("nextPageToken", token.clone()));
            }
            let page: ListResponse<T> = self.get_json(&url, &query).await?;
            let page_len = page.items.len();
            items.extend(page.items);
            if page.next_page_token.is_empty() || page.next_page_token == token || page_len == 0 {
                return Ok(items);
            }
            token = page.next_page_token;
        }

        Err(Error::registry(
            &self.base_url,
            format!("GET {url} exceeded {MAX_PAGES} pages"),
        ))
    }
}

#[async_trait]
impl ModelRegistry for RegistryRestClient {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn list_registered_models(&self) -> Result<Vec<RegisteredModel>, Error> {
        self.list_all("/registered_models").await
    }

    async fn get_registered_model(&self, id: &str) -> Result<RegisteredModel, Error> {
        self.get_json(&self.registry_url(&format!("/registered_models/{id}")), &[])
            .await
    }

    async fn list_model_versions(
        &self,
        registered_model_id: &str,
    ) -> Result<Vec<ModelVersion>, Error> {
        self.list_all(&format!("/registered_models/{registered_model_id}/versions"))
            .await
    }

    async fn get_model_version(&self, id: &str) -> Result<ModelVersion, Error> {
        self.get_json(&self.registry_url(&format!("/model_versions/{id}")), &[])
            .await
    }

    async fn list_model_artifacts(
        &self,
        model_version_id: &str,
    ) -> Result<Vec<ModelArtifact>, Error> {
        self.list_all(&format!("/model_versions/{model_version_id}/artifacts"))
            .await
    }

    async fn list_inference_services(&self) -> Result<Vec<InferenceServiceRecord>, Error> {
        self.list_all("/inference_services").await
    }

    async fn get_serving_environment(&self, id: &str) -> Result<ServingEnvironment, Error> {
        self.get_json(&self.registry_url(&format!("/serving_environments/{id}")), &[])
            .await
    }

    async fn get_model_card(
        &self,
        source: &str,
        repository: &str,
        model: &str,
    ) -> Result<Option<String>, Error> {
        let encode = |s: &str| s.replace(' ', "%20");
        let url = format!(
            "{}{}/sources/{}/models/{}/{}",
            self.base_url,
            CATALOG_BASE_PATH,
            encode(source),
            encode(repository),
            encode(model)
        );
        match self.get_json::<CatalogModel>(&url, &[]).await {
            Ok(model) => Ok(model.readme.filter(|r| !r.is_empty())),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
