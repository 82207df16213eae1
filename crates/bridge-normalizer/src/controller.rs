//! Kubernetes controller adapter
//!
//! Maps InferenceService events onto [`Normalizer::reconcile`] and the
//! tri-state outcome onto a controller [`Action`]. Also hosts the periodic
//! pass loop, which owns every full pass the process runs.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_common::crd::InferenceService;
use bridge_common::Error;

use crate::reconcile::{Normalizer, ReconcileOutcome};

/// Delay before a failed reconcile is retried
const ERROR_REQUEUE_SECS: u64 = 30;

/// Context shared by every reconcile cycle
pub struct Context {
    /// The reconciliation core
    pub normalizer: Arc<Normalizer>,
    /// Cancelled on shutdown
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a context
    pub fn new(normalizer: Arc<Normalizer>, cancel: CancellationToken) -> Self {
        Self { normalizer, cancel }
    }
}

/// Reconcile one InferenceService event
pub async fn reconcile(isvc: Arc<InferenceService>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = isvc.name_any();
    let namespace = isvc
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "InferenceService must be namespaced"))?;

    debug!(namespace = %namespace, name = %name, "Reconciling InferenceService");
    into_action(ctx.normalizer.reconcile(&namespace, &name, &ctx.cancel).await)
}

/// Map a reconcile outcome onto a controller action
pub fn into_action(outcome: ReconcileOutcome) -> Result<Action, Error> {
    match outcome {
        ReconcileOutcome::Done => Ok(Action::await_change()),
        ReconcileOutcome::Requeue(delay) => Ok(Action::requeue(delay)),
        ReconcileOutcome::Error(e) => Err(e),
    }
}

/// Error policy: log and retry after 30 seconds
pub fn error_policy(isvc: Arc<InferenceService>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        name = %isvc.name_any(),
        namespace = ?isvc.namespace(),
        error = %error,
        retryable = error.is_retryable(),
        "InferenceService reconcile error, will retry"
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

/// Run full passes until `cancel` fires.
///
/// A pass runs at startup, then on every `interval` tick and whenever
/// [`Normalizer::request_pass`] is called. Ticks missed while a pass runs
/// are skipped rather than queued.
pub async fn run_pass_loop(
    normalizer: Arc<Normalizer>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval = ?interval, "Starting periodic full pass");

    loop {
        let trigger = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = normalizer.pass_requested() => "requested",
            _ = ticker.tick() => "interval",
        };

        debug!(trigger, "Running full pass");
        match normalizer.run_full_pass(&cancel).await {
            Ok(summary) if !summary.key_set_submitted => {
                warn!(failed = summary.failed, "Full pass incomplete, stale records kept");
            }
            Ok(_) => {}
            Err(Error::Cancelled { .. }) => break,
            Err(e) => warn!(error = %e, "Full pass failed"),
        }
    }
    info!("Periodic full pass stopped");
}
