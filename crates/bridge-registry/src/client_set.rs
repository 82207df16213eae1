//! One registry client per configured endpoint
//!
//! Built once per configuration refresh and handed to the normalizer by
//! reference. Iteration order is stable (sorted by endpoint) but callers
//! must not treat it as a priority.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::ModelRegistry;

/// The registry clients for every configured endpoint
#[derive(Clone, Default)]
pub struct RegistryClientSet {
    clients: BTreeMap<String, Arc<dyn ModelRegistry>>,
}

impl std::fmt::Debug for RegistryClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClientSet")
            .field("endpoints", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RegistryClientSet {
    /// An empty set; correlation then always yields "no match"
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from clients; a later client for the same endpoint replaces an earlier one
    pub fn from_clients(clients: impl IntoIterator<Item = Arc<dyn ModelRegistry>>) -> Self {
        let mut set = Self::new();
        for client in clients {
            set.insert(client);
        }
        set
    }

    /// Add a client keyed by its endpoint
    pub fn insert(&mut self, client: Arc<dyn ModelRegistry>) {
        self.clients.insert(client.endpoint(), client);
    }

    /// Iterate over (endpoint, client) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ModelRegistry>)> {
        self.clients.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Client for one endpoint
    pub fn get(&self, endpoint: &str) -> Option<&Arc<dyn ModelRegistry>> {
        self.clients.get(endpoint)
    }

    /// Endpoints in the set
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no endpoint is configured
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
