//! Downstream import/removal notifications
//!
//! The catalog importer learns about new records through a location
//! service: a creation registers a location pointing back at this storage
//! tier's fetch route, a deletion removes it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use bridge_common::{Error, ImportKey, FETCH_URI, KEY_QUERY_PARAM, REMOVE_URI, UPSERT_URI};

/// Receives catalog lifecycle notifications from the storage tier
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogNotifier: Send + Sync {
    /// A record was stored for the first time
    async fn imported(&self, key: &ImportKey) -> Result<(), Error>;

    /// A record was deleted
    async fn removed(&self, key: &ImportKey) -> Result<(), Error>;
}

/// Notifier for deployments without a downstream importer
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl CatalogNotifier for NoopNotifier {
    async fn imported(&self, key: &ImportKey) -> Result<(), Error> {
        debug!(key = %key, "No location service configured, skipping import notification");
        Ok(())
    }

    async fn removed(&self, key: &ImportKey) -> Result<(), Error> {
        debug!(key = %key, "No location service configured, skipping removal notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct LocationPost<'a> {
    target: &'a str,
}

/// HTTP notifier talking to the location service
#[derive(Clone, Debug)]
pub struct LocationNotifier {
    location_url: String,
    storage_url: String,
    client: reqwest::Client,
}

impl LocationNotifier {
    /// `location_url` is the location service; `storage_url` is how the
    /// importer reaches this storage tier
    pub fn new(
        location_url: impl Into<String>,
        storage_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let location_url = location_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            location_url,
            storage_url: storage_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Where the importer fetches the record for `key`
    pub fn target_for(&self, key: &ImportKey) -> String {
        format!("{}{}?{}={}", self.storage_url, FETCH_URI, KEY_QUERY_PARAM, key)
    }
}

#[async_trait]
impl CatalogNotifier for LocationNotifier {
    async fn imported(&self, key: &ImportKey) -> Result<(), Error> {
        let url = format!("{}{}", self.location_url, UPSERT_URI);
        let target = self.target_for(key);
        let response = self
            .client
            .post(&url)
            .query(&[(KEY_QUERY_PARAM, key.as_str())])
            .json(&LocationPost { target: &target })
            .send()
            .await
            .map_err(|e| Error::storage(key.as_str(), format!("location upsert failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::storage_status(
                key.as_str(),
                status.as_u16(),
                format!("location upsert returned {status}"),
            ));
        }
        debug!(key = %key, target = %target, "Location registered");
        Ok(())
    }

    async fn removed(&self, key: &ImportKey) -> Result<(), Error> {
        let url = format!("{}{}", self.location_url, REMOVE_URI);
        let response = self
            .client
            .delete(&url)
            .query(&[(KEY_QUERY_PARAM, key.as_str())])
            .send()
            .await
            .map_err(|e| Error::storage(key.as_str(), format!("location remove failed: {e}")))?;
        let status = response.status();
        // already gone downstream
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(Error::storage_status(
                key.as_str(),
                status.as_u16(),
                format!("location remove returned {status}"),
            ));
        }
        debug!(key = %key, "Location removed");
        Ok(())
    }
}
