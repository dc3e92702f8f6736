//! Deployment session — the shared state of one rollout attempt.
//!
//! The orchestrator task and the metrics monitor task both hold an
//! `Arc<DeploymentSession>`. Readers get copies; every mutator is
//! crate-private so writes go through the orchestrator or the rollback
//! manager only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use canary_core::{Environment, MetricSnapshot, RolloutConfig, SessionStatus, TrafficSample};

/// Mutable part of the session, guarded by a plain mutex that is never
/// held across an `.await`.
#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    current_traffic_percent: u32,
    max_traffic_percent: u32,
    ended_at: Option<DateTime<Utc>>,
    rollback_reason: Option<String>,
    metric_history: Vec<MetricSnapshot>,
    traffic_history: Vec<TrafficSample>,
}

/// One canary rollout attempt.
#[derive(Debug)]
pub struct DeploymentSession {
    config: RolloutConfig,
    started_at: DateTime<Utc>,
    started: tokio::time::Instant,
    /// Write-once: flipped false → true by the winning rollback only.
    rollback_initiated: AtomicBool,
    state: Mutex<SessionState>,
    /// Cancellation token; fired once a rollback wins.
    cancel: watch::Sender<bool>,
    /// Serializes traffic mutations so a revert cannot be overtaken by
    /// an in-flight ramp step.
    traffic_gate: tokio::sync::Mutex<()>,
}

impl DeploymentSession {
    /// Open a session in `INITIALIZING` with no traffic on the canary.
    pub fn new(config: RolloutConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            config,
            started_at: Utc::now(),
            started: tokio::time::Instant::now(),
            rollback_initiated: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                status: SessionStatus::Initializing,
                current_traffic_percent: 0,
                max_traffic_percent: 0,
                ended_at: None,
                rollback_reason: None,
                metric_history: Vec::new(),
                traffic_history: Vec::new(),
            }),
            cancel,
            traffic_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.deployment_id
    }

    pub fn application(&self) -> &str {
        &self.config.application
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic instant the session was opened at.
    pub fn started(&self) -> tokio::time::Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    pub fn current_traffic_percent(&self) -> u32 {
        self.state().current_traffic_percent
    }

    /// Highest canary percentage ever applied in this session.
    pub fn max_traffic_percent(&self) -> u32 {
        self.state().max_traffic_percent
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state().ended_at
    }

    pub fn rollback_initiated(&self) -> bool {
        self.rollback_initiated.load(Ordering::Acquire)
    }

    pub fn rollback_reason(&self) -> Option<String> {
        self.state().rollback_reason.clone()
    }

    pub fn metric_history(&self) -> Vec<MetricSnapshot> {
        self.state().metric_history.clone()
    }

    pub fn traffic_history(&self) -> Vec<TrafficSample> {
        self.state().traffic_history.clone()
    }

    /// Resolves once a rollback has been initiated.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compare-and-set the rollback flag. Exactly one caller ever wins.
    pub(crate) fn try_begin_rollback(&self) -> bool {
        self.rollback_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Fire the cancellation token. Idempotent.
    pub(crate) fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) async fn traffic_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.traffic_gate.lock().await
    }

    /// Move to a non-terminal status. Ignored once the session has ended.
    pub(crate) fn set_status(&self, status: SessionStatus) {
        let mut state = self.state();
        if state.status.is_terminal() {
            debug!(current = %state.status, requested = %status, "session already ended, status unchanged");
            return;
        }
        debug!(from = %state.status, to = %status, "session status changed");
        state.status = status;
    }

    /// Record that `percent` is now live on the canary.
    ///
    /// Percentages only go up while ramping; a lower value is ignored.
    /// Returns whether the value was recorded.
    pub(crate) fn record_traffic(&self, percent: u32) -> bool {
        let percent = percent.min(100);
        let mut state = self.state();
        if percent < state.current_traffic_percent {
            warn!(
                current = state.current_traffic_percent,
                requested = percent,
                "refusing to lower canary traffic outside a rollback"
            );
            return false;
        }
        state.current_traffic_percent = percent;
        state.max_traffic_percent = state.max_traffic_percent.max(percent);
        state.traffic_history.push(TrafficSample::now(percent));
        true
    }

    /// Record that all traffic is back on the stable version.
    pub(crate) fn record_revert(&self) {
        let mut state = self.state();
        state.current_traffic_percent = 0;
        state.traffic_history.push(TrafficSample::now(0));
    }

    pub(crate) fn record_snapshot(&self, snapshot: MetricSnapshot) {
        self.state().metric_history.push(snapshot);
    }

    /// Enter a terminal status. Only the first call has any effect.
    pub(crate) fn finish(&self, status: SessionStatus, rollback_reason: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state();
        if state.ended_at.is_some() {
            debug!(current = %state.status, requested = %status, "session already ended");
            return false;
        }
        state.status = status;
        state.ended_at = Some(Utc::now());
        if rollback_reason.is_some() {
            state.rollback_reason = rollback_reason;
        }
        true
    }
}
