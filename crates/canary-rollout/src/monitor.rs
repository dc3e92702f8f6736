//! Metrics monitor — background task that polls metrics for a session.
//!
//! One tick runs at a time: the ticker delays instead of bursting when
//! a tick overruns, and every query is time-boxed. A failed query only
//! drops that metric from the snapshot; a breach hands off to the
//! rollback manager and ends the loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, Span, debug, info, warn};

use canary_core::MetricSnapshot;
use canary_metrics::MetricsProvider;

use crate::error::RollbackCause;
use crate::rollback::RollbackManager;
use crate::session::DeploymentSession;

/// Handle to a running monitor task.
pub struct MetricsMonitor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MetricsMonitor {
    /// Spawn the polling loop for `session`.
    ///
    /// The first tick fires one check interval after start.
    pub fn start(
        session: Arc<DeploymentSession>,
        provider: Arc<dyn MetricsProvider>,
        rollback: Arc<RollbackManager>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let interval = session.config().metric_check_interval();
        let handle = tokio::spawn(
            run_monitor_loop(session, provider, rollback, stop_rx).instrument(Span::current()),
        );
        info!(interval_secs = interval.as_secs(), "metrics monitor started");
        Self { stop_tx, handle }
    }

    /// Signal the loop to stop. Safe to call any number of times, even
    /// after the loop has ended on its own.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit. Errors if the task
    /// panicked or was aborted instead of returning.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.stop();
        self.handle.await
    }
}

async fn run_monitor_loop(
    session: Arc<DeploymentSession>,
    provider: Arc<dyn MetricsProvider>,
    rollback: Arc<RollbackManager>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let period = session.config().metric_check_interval();
    // An interval too long to schedule never ticks.
    let mut ticker = Instant::now().checked_add(period).map(|start| {
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    if ticker.is_none() {
        warn!(interval_secs = period.as_secs(), "metric check interval out of range, no polls scheduled");
    }

    loop {
        tokio::select! {
            _ = next_tick(ticker.as_mut()) => {}
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                debug!("metrics monitor stopped");
                break;
            }
            _ = session.cancelled() => {
                debug!("metrics monitor stopped by rollback");
                break;
            }
        }

        if session.rollback_initiated() {
            break;
        }

        let snapshot = poll_metrics(&session, provider.as_ref()).await;
        let breach = find_breach(&session, &snapshot);
        session.record_snapshot(snapshot);

        if let Some(cause) = breach {
            warn!(reason = %cause, "metric threshold breached");
            rollback.rollback(&session, cause).await;
            break;
        }
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Query every configured metric once, omitting the ones that fail.
async fn poll_metrics(session: &DeploymentSession, provider: &dyn MetricsProvider) -> MetricSnapshot {
    let config = session.config();
    let timeout = config.query_timeout();
    let mut values = BTreeMap::new();

    for (metric, expression) in &config.metrics.queries {
        match tokio::time::timeout(timeout, provider.query(expression)).await {
            Ok(Ok(Some(value))) => {
                values.insert(metric.clone(), value);
            }
            Ok(Ok(None)) => {
                warn!(%metric, "metric query returned no sample");
            }
            Ok(Err(e)) => {
                warn!(%metric, error = %e, "metric query failed");
            }
            Err(_) => {
                warn!(%metric, timeout_ms = timeout.as_millis() as u64, "metric query timed out");
            }
        }
    }

    debug!(?values, "metrics polled");
    MetricSnapshot::new(values)
}

/// First metric in the snapshot that breaches its threshold.
fn find_breach(session: &DeploymentSession, snapshot: &MetricSnapshot) -> Option<RollbackCause> {
    snapshot.values.iter().find_map(|(metric, &value)| {
        let threshold = session.config().rollback_thresholds.get(metric)?;
        threshold
            .is_breached_by(value)
            .then(|| RollbackCause::MetricThresholdBreach {
                metric: metric.clone(),
                value,
                limit: threshold.limit,
            })
    })
}
