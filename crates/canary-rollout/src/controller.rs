//! Rollout orchestrator — the session state machine.
//!
//! ```text
//! INITIALIZING ─► DEPLOYED ─► RAMPING ─► FINALIZING ─► PROMOTED
//!       │                        │            │
//!       ▼                        └────────────┴──► ROLLED_BACK | FAILED
//!     FAILED (prerequisites)
//! ```
//!
//! `Orchestrator::run` only returns an error for configuration and
//! prerequisite problems. Everything that goes wrong once traffic has
//! been touched ends in a terminal `DeploymentResult` instead.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use canary_core::{RolloutConfig, SessionStatus};
use canary_health::HealthChecker;
use canary_metrics::MetricsProvider;

use crate::error::{HealthPhase, RollbackCause, RolloutError, RolloutResult};
use crate::monitor::MetricsMonitor;
use crate::notify::{EventKind, LogNotifier, Notification, Notifier, deliver};
use crate::recorder::{DeploymentResult, ResultRecorder};
use crate::rollback::RollbackManager;
use crate::session::DeploymentSession;
use crate::traffic::{DryRunTrafficController, TrafficController};

/// Drives canary sessions against a fixed set of collaborators.
pub struct Orchestrator {
    traffic: Arc<dyn TrafficController>,
    metrics: Arc<dyn MetricsProvider>,
    health: HealthChecker,
    notifier: Arc<dyn Notifier>,
    recorder: Arc<dyn ResultRecorder>,
}

impl Orchestrator {
    pub fn new(
        traffic: Arc<dyn TrafficController>,
        metrics: Arc<dyn MetricsProvider>,
        health: HealthChecker,
        notifier: Arc<dyn Notifier>,
        recorder: Arc<dyn ResultRecorder>,
    ) -> Self {
        Self {
            traffic,
            metrics,
            health,
            notifier,
            recorder,
        }
    }

    /// Run one canary session to a terminal state.
    pub async fn run(&self, config: RolloutConfig) -> RolloutResult<DeploymentResult> {
        config.validate()?;

        let session = Arc::new(DeploymentSession::new(config));
        let span = info_span!(
            "rollout",
            session = %session.id(),
            app = %session.application(),
            env = %session.environment(),
        );
        self.execute(session).instrument(span).await
    }

    async fn execute(&self, session: Arc<DeploymentSession>) -> RolloutResult<DeploymentResult> {
        let config = session.config();

        // The only place dry-run changes which collaborators are used.
        let (traffic, notifier): (Arc<dyn TrafficController>, Arc<dyn Notifier>) = if config.dry_run {
            info!("dry run: traffic changes and notifications are simulated");
            (Arc::new(DryRunTrafficController), Arc::new(LogNotifier))
        } else {
            (self.traffic.clone(), self.notifier.clone())
        };

        info!(
            initial = config.initial_traffic_percent,
            step = config.traffic_step_percent,
            steps = config.ramp_steps(),
            interval_secs = config.step_interval_seconds,
            max_secs = config.max_rollout_seconds,
            dry_run = config.dry_run,
            force = config.force,
            "starting canary rollout"
        );

        if let Err(e) = self.recorder.record_config(config).await {
            warn!(error = %e, "failed to record config snapshot");
        }

        if let Err(e) = self.check_prerequisites(&session, traffic.as_ref()).await {
            if config.force {
                warn!(error = %e, "prerequisite check failed, continuing because force is set");
            } else {
                error!(error = %e, "prerequisite check failed, aborting before deploy");
                session.finish(SessionStatus::Failed, None);
                deliver(
                    notifier.as_ref(),
                    Notification::new(
                        &session,
                        EventKind::Failed,
                        format!("canary deployment of {} aborted: {e}", session.application()),
                    ),
                )
                .await;
                self.record(&session).await;
                return Err(e);
            }
        }

        let rollback = Arc::new(RollbackManager::new(traffic.clone(), notifier.clone()));
        let mut run = SessionRun {
            session: session.clone(),
            traffic,
            notifier: notifier.clone(),
            metrics: self.metrics.clone(),
            health: &self.health,
            rollback: rollback.clone(),
            monitor: None,
        };

        if let Err(e) = run.drive().await {
            error!(error = %e, "rollout aborted");
            rollback.rollback(&session, RollbackCause::from(e)).await;
        }
        if let Err(e) = run.stop_monitor().await {
            error!(error = %e, "rollout aborted");
            rollback.rollback(&session, RollbackCause::from(e)).await;
        }

        if !session.status().is_terminal() {
            error!(status = %session.status(), "rollout ended without a terminal status");
            session.finish(SessionStatus::Failed, None);
            deliver(
                notifier.as_ref(),
                Notification::new(
                    &session,
                    EventKind::Failed,
                    format!("canary deployment of {} failed", session.application()),
                ),
            )
            .await;
        }

        let result = self.record(&session).await;
        info!(
            status = %result.status,
            max_percent = result.max_traffic_percent_reached,
            duration_secs = result.duration_seconds,
            "canary rollout finished"
        );
        Ok(result)
    }

    async fn check_prerequisites(
        &self,
        session: &DeploymentSession,
        traffic: &dyn TrafficController,
    ) -> RolloutResult<()> {
        let config = session.config();
        if !config.metrics.queries.is_empty() {
            match tokio::time::timeout(config.query_timeout(), self.metrics.ready()).await {
                Ok(Ok(())) => debug!("metrics backend reachable"),
                Ok(Err(e)) => {
                    return Err(RolloutError::Prerequisite(format!(
                        "metrics backend unavailable: {e}"
                    )));
                }
                Err(_) => {
                    return Err(RolloutError::Prerequisite(
                        "metrics backend did not answer in time".to_string(),
                    ));
                }
            }
        }
        traffic.ready().await.map_err(|e| {
            RolloutError::Prerequisite(format!("traffic controller unavailable: {e}"))
        })?;
        Ok(())
    }

    async fn record(&self, session: &DeploymentSession) -> DeploymentResult {
        let result = DeploymentResult::from_session(session);
        if let Err(e) = self.recorder.record_result(&result).await {
            warn!(error = %e, "failed to record deployment result");
        }
        result
    }
}

/// Collaborators and per-session state for one `execute` call.
struct SessionRun<'a> {
    session: Arc<DeploymentSession>,
    traffic: Arc<dyn TrafficController>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn MetricsProvider>,
    health: &'a HealthChecker,
    rollback: Arc<RollbackManager>,
    monitor: Option<MetricsMonitor>,
}

impl SessionRun<'_> {
    /// Deploy, ramp, finalize. Returns early, without error, whenever a
    /// rollback has taken over.
    async fn drive(&mut self) -> RolloutResult<()> {
        self.deploy().await?;

        self.session.set_status(SessionStatus::Ramping);
        self.monitor = Some(MetricsMonitor::start(
            self.session.clone(),
            self.metrics.clone(),
            self.rollback.clone(),
        ));

        if !self.health_gate(HealthPhase::Initial).await {
            return Ok(());
        }
        if !self.ramp().await? {
            return Ok(());
        }
        self.finalize().await
    }

    async fn deploy(&self) -> RolloutResult<()> {
        let initial = self.session.config().initial_traffic_percent.min(100);
        {
            let _gate = self.session.traffic_gate().await;
            self.traffic.set_traffic_percent(initial).await?;
            self.session.record_traffic(initial);
        }
        self.session.set_status(SessionStatus::Deployed);
        info!(percent = initial, "canary deployed");

        self.notify(
            EventKind::Started,
            format!(
                "canary deployment of {} started in {} at {initial}% traffic",
                self.session.application(),
                self.session.environment()
            ),
        )
        .await;
        Ok(())
    }

    /// Step traffic up to 100%. Returns `false` if a rollback ended the ramp.
    async fn ramp(&mut self) -> RolloutResult<bool> {
        let session = self.session.clone();
        let config = session.config();
        let steps = config.ramp_steps();
        // A limit too far out to represent means no limit.
        let deadline = session.started().checked_add(config.max_rollout());

        for step in 1..=steps {
            tokio::select! {
                _ = tokio::time::sleep(config.step_interval()) => {}
                _ = self.session.cancelled() => {
                    debug!(step, "ramp interrupted by rollback");
                    return Ok(false);
                }
                _ = sleep_until_deadline(deadline) => {
                    self.rollback
                        .rollback(
                            &self.session,
                            RollbackCause::RolloutTimeout {
                                limit_secs: config.max_rollout_seconds,
                            },
                        )
                        .await;
                    return Ok(false);
                }
            }

            if self.session.rollback_initiated() {
                return Ok(false);
            }
            if self.monitor.as_ref().is_some_and(MetricsMonitor::is_finished) {
                // Only a crash ends the loop without a rollback.
                self.stop_monitor().await?;
            }
            if !self.health_gate(HealthPhase::Ramp { step }).await {
                return Ok(false);
            }
            let Some(percent) = self.step_traffic(config.traffic_step_percent).await? else {
                return Ok(false);
            };

            info!(step, steps, percent, "canary traffic increased");
            self.notify(
                EventKind::TrafficIncreased,
                format!(
                    "canary traffic for {} increased to {percent}%",
                    self.session.application()
                ),
            )
            .await;
        }

        Ok(!self.session.rollback_initiated())
    }

    /// Raise traffic by one step under the gate. `None` if a rollback
    /// got there first.
    async fn step_traffic(&self, step: u32) -> RolloutResult<Option<u32>> {
        let _gate = self.session.traffic_gate().await;
        if self.session.rollback_initiated() {
            return Ok(None);
        }
        let target = self
            .session
            .current_traffic_percent()
            .saturating_add(step)
            .min(100);
        self.traffic.set_traffic_percent(target).await?;
        self.session.record_traffic(target);
        Ok(Some(target))
    }

    async fn finalize(&mut self) -> RolloutResult<()> {
        self.session.set_status(SessionStatus::Finalizing);
        if !self.health_gate(HealthPhase::Final).await {
            return Ok(());
        }

        // No breach may land after promotion.
        self.stop_monitor().await?;

        {
            let _gate = self.session.traffic_gate().await;
            if self.session.rollback_initiated() {
                return Ok(());
            }
            self.traffic.set_traffic_percent(100).await?;
            if self.session.current_traffic_percent() != 100 {
                self.session.record_traffic(100);
            }
            self.session.finish(SessionStatus::Promoted, None);
        }

        let minutes = self.session.elapsed().as_secs_f64() / 60.0;
        info!(minutes, "canary promoted");
        self.notify(
            EventKind::Promoted,
            format!(
                "canary deployment of {} promoted to 100% after {minutes:.1} minutes",
                self.session.application()
            ),
        )
        .await;
        Ok(())
    }

    /// Run the configured health checks. Returns `true` to proceed.
    async fn health_gate(&self, phase: HealthPhase) -> bool {
        let report = self.health.check(&self.session.config().health_checks).await;
        if report.healthy() {
            debug!(%phase, "health checks passed");
            return true;
        }

        let details = report.summary();
        if self.session.config().force {
            warn!(%phase, %details, "health check failed, continuing because force is set");
            return true;
        }

        self.rollback
            .rollback(&self.session, RollbackCause::HealthCheckFailed { phase, details })
            .await;
        false
    }

    async fn stop_monitor(&mut self) -> RolloutResult<()> {
        match self.monitor.take() {
            Some(monitor) => monitor.shutdown().await.map_err(RolloutError::Monitor),
            None => Ok(()),
        }
    }

    async fn notify(&self, kind: EventKind, message: String) {
        deliver(
            self.notifier.as_ref(),
            Notification::new(&self.session, kind, message),
        )
        .await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
