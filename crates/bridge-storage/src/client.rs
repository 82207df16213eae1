//! Upsert client
//!
//! The normalizer's only handle on the storage tier. Transport failures and
//! 5xx answers are retried with backoff; a 4xx answer fails immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use bridge_common::key::join_key_set;
use bridge_common::retry::{retry_with_backoff_if, RetryConfig};
use bridge_common::{
    Error, ImportKey, CURRENT_KEY_SET_URI, KEY_QUERY_PARAM, LIST_URI, TYPE_QUERY_PARAM, UPSERT_URI,
};

use crate::wire::{DiscoverResponse, KeySetResponse, PostBody, Provenance, UpsertResponse};

pub use crate::wire::WriteOutcome as UpsertOutcome;

/// Write access to the storage tier
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Write one record under `key`
    async fn upsert(
        &self,
        key: &ImportKey,
        provenance: Provenance,
        body: &PostBody,
    ) -> Result<UpsertOutcome, Error>;

    /// Submit the authoritative key set; returns the keys the tier deleted
    async fn post_current_key_set(&self, keys: &[ImportKey]) -> Result<Vec<ImportKey>, Error>;

    /// Every key currently stored
    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error>;
}

/// HTTP implementation of [`StorageClient`]
#[derive(Clone, Debug)]
pub struct StorageRestClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl StorageRestClient {
    /// Client for the storage tier at `base_url`, each request bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Client reusing an existing `reqwest::Client`
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(subject: &str, response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(Error::storage_status(
            subject,
            status.as_u16(),
            format!("storage returned {status}: {}", text.trim()),
        ))
    }

    async fn upsert_once(
        &self,
        key: &ImportKey,
        provenance: Provenance,
        body: &PostBody,
    ) -> Result<UpsertOutcome, Error> {
        let response = self
            .client
            .post(self.url(UPSERT_URI))
            .query(&[
                (KEY_QUERY_PARAM, key.as_str()),
                (TYPE_QUERY_PARAM, provenance.as_str()),
            ])
            .json(body)
            .send()
            .await
            .map_err(|e| Error::storage(key.as_str(), format!("upsert failed: {e}")))?;
        let status = response.status();
        let response = Self::check(key.as_str(), response).await?;

        match response.json::<UpsertResponse>().await {
            Ok(parsed) => Ok(parsed.outcome),
            // older storage tiers answer without a body
            Err(_) if status == StatusCode::CREATED => Ok(UpsertOutcome::Created),
            Err(_) => Ok(UpsertOutcome::Updated),
        }
    }

    async fn post_key_set_once(&self, joined: &str) -> Result<Vec<ImportKey>, Error> {
        let response = self
            .client
            .post(self.url(CURRENT_KEY_SET_URI))
            .query(&[(KEY_QUERY_PARAM, joined)])
            .send()
            .await
            .map_err(|e| {
                Error::storage(CURRENT_KEY_SET_URI, format!("key set submission failed: {e}"))
            })?;
        let response = Self::check(CURRENT_KEY_SET_URI, response).await?;
        let parsed: KeySetResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("key set response: {e}")))?;
        Ok(parsed.removed)
    }

    async fn list_once(&self) -> Result<Vec<ImportKey>, Error> {
        let response = self
            .client
            .get(self.url(LIST_URI))
            .send()
            .await
            .map_err(|e| Error::storage(LIST_URI, format!("list failed: {e}")))?;
        let response = Self::check(LIST_URI, response).await?;
        let parsed: DiscoverResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("list response: {e}")))?;
        parsed.keys.iter().map(|k| ImportKey::parse(k)).collect()
    }
}

#[async_trait]
impl StorageClient for StorageRestClient {
    async fn upsert(
        &self,
        key: &ImportKey,
        provenance: Provenance,
        body: &PostBody,
    ) -> Result<UpsertOutcome, Error> {
        let outcome = retry_with_backoff_if(&self.retry, "storage upsert", Error::is_retryable, || {
            self.upsert_once(key, provenance, body)
        })
        .await?;
        debug!(key = %key, provenance = provenance.as_str(), ?outcome, "Upserted record");
        Ok(outcome)
    }

    async fn post_current_key_set(&self, keys: &[ImportKey]) -> Result<Vec<ImportKey>, Error> {
        let joined = join_key_set(keys);
        let removed = retry_with_backoff_if(
            &self.retry,
            "storage current key set",
            Error::is_retryable,
            || self.post_key_set_once(&joined),
        )
        .await?;
        debug!(submitted = keys.len(), removed = removed.len(), "Submitted current key set");
        Ok(removed)
    }

    async fn list_keys(&self) -> Result<Vec<ImportKey>, Error> {
        retry_with_backoff_if(&self.retry, "storage list", Error::is_retryable, || {
            self.list_once()
        })
        .await
    }
}
