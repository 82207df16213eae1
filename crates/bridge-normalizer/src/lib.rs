//! Correlates model-serving deployments with model-registry entities and
//! keeps the catalog storage tier in sync.
//!
//! - [`deployment`]: deployment snapshots and the readiness gate
//! - [`source`]: where deployments are read from
//! - [`correlator`]: matching a deployment to at most one registry version
//! - [`context`] and [`merge`]: building the normalized entity graph
//! - [`encode`]: the two output encodings
//! - [`reconcile`] and [`full_pass`]: per-event and periodic reconciliation
//! - [`controller`]: the kube controller adapter and pass loop

#![deny(missing_docs)]

pub mod context;
pub mod controller;
pub mod correlator;
pub mod deployment;
pub mod encode;
pub mod entity;
pub mod full_pass;
pub mod merge;
pub mod reconcile;
pub mod source;

#[cfg(test)]
mod testing;

pub use context::{CorrelationContext, Defaults};
pub use correlator::{correlate, Correlation, MatchStrategy, RegistryMatch};
pub use deployment::{DeploymentRef, Readiness, ServingDetails};
pub use entity::NormalizedEntity;
pub use full_pass::PassSummary;
pub use reconcile::{Normalizer, ReconcileOutcome};
pub use source::{DeploymentSource, KubeDeploymentSource};
