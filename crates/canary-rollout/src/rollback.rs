//! Rollback manager — the single authority that reverts a canary.
//!
//! Both the ramp loop and the metrics monitor may decide a rollback is
//! needed, possibly at the same moment. Whoever wins the session's
//! compare-and-set performs it; everyone else returns immediately.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use canary_core::SessionStatus;

use crate::error::RollbackCause;
use crate::notify::{EventKind, Notification, Notifier, deliver};
use crate::session::DeploymentSession;
use crate::traffic::TrafficController;

/// What a `rollback` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Another caller already owns the rollback.
    AlreadyInitiated,
    /// Traffic is back on stable.
    Reverted,
    /// The revert call failed; the session still ended.
    RevertFailed,
}

pub struct RollbackManager {
    traffic: Arc<dyn TrafficController>,
    notifier: Arc<dyn Notifier>,
}

impl RollbackManager {
    pub fn new(traffic: Arc<dyn TrafficController>, notifier: Arc<dyn Notifier>) -> Self {
        Self { traffic, notifier }
    }

    /// Revert `session` to stable, at most once per session.
    ///
    /// Never fails: a revert error is logged, appended to the reason,
    /// and the session still reaches a terminal status.
    pub async fn rollback(&self, session: &DeploymentSession, cause: RollbackCause) -> RollbackOutcome {
        if !session.try_begin_rollback() {
            debug!(reason = %cause, "rollback already initiated, ignoring");
            return RollbackOutcome::AlreadyInitiated;
        }

        // Stops the monitor and wakes the ramp loop.
        session.cancel();
        warn!(
            percent = session.current_traffic_percent(),
            reason = %cause,
            "rolling back canary"
        );

        let revert = {
            let _gate = session.traffic_gate().await;
            self.traffic.revert_to_stable().await
        };

        let (status, reason, outcome) = match revert {
            Ok(()) => {
                session.record_revert();
                (SessionStatus::RolledBack, cause.to_string(), RollbackOutcome::Reverted)
            }
            Err(e) => {
                error!(error = %e, "revert to stable failed");
                let status = if cause.escalates_on_revert_failure() {
                    SessionStatus::Failed
                } else {
                    SessionStatus::RolledBack
                };
                (
                    status,
                    format!("{cause}; revert failed: {e}"),
                    RollbackOutcome::RevertFailed,
                )
            }
        };

        session.finish(status, Some(reason.clone()));

        deliver(
            self.notifier.as_ref(),
            Notification::new(
                session,
                EventKind::Rollback,
                format!(
                    "canary rollback of {} in {} triggered: {reason}",
                    session.application(),
                    session.environment()
                ),
            ),
        )
        .await;
        if status == SessionStatus::Failed {
            deliver(
                self.notifier.as_ref(),
                Notification::new(
                    session,
                    EventKind::Failed,
                    format!("canary deployment of {} failed: {reason}", session.application()),
                ),
            )
            .await;
        }

        info!(%status, ?outcome, "rollback complete");
        outcome
    }
}
