//! Rollout error types and the rollback trigger taxonomy.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use canary_core::ConfigError;

/// Result type alias for orchestrator operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Result type alias for traffic controller operations.
pub type TrafficResult<T> = Result<T, TrafficError>;

/// Errors that escape the ramp. Only `Config` and `Prerequisite` ever
/// leave `Orchestrator::run`; the rest are turned into a rollback.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("prerequisite check failed: {0}")]
    Prerequisite(String),

    #[error("traffic control failed: {0}")]
    Traffic(#[from] TrafficError),

    #[error("metrics monitor task failed: {0}")]
    Monitor(#[source] tokio::task::JoinError),
}

/// Failures of the traffic router.
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("traffic percent {0} is out of range 0-100")]
    InvalidPercent(u32),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("traffic backend error: {0}")]
    Backend(String),
}

/// Notification delivery failures. Logged, never fatal.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to write notification {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result persistence failures. Logged, never fatal.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which phase ran the failing health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthPhase {
    Initial,
    Ramp { step: u32 },
    Final,
}

impl fmt::Display for HealthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Ramp { step } => write!(f, "ramp step {step}"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// Why a rollback was triggered. `Display` is the recorded reason.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackCause {
    HealthCheckFailed { phase: HealthPhase, details: String },
    MetricThresholdBreach { metric: String, value: f64, limit: f64 },
    RolloutTimeout { limit_secs: u64 },
    TrafficControl(String),
    Internal(String),
}

impl RollbackCause {
    /// Whether a failed revert escalates the session to FAILED.
    ///
    /// Detector verdicts (health, metrics, timeout) always end
    /// ROLLED_BACK; errors that escaped the ramp do not.
    pub fn escalates_on_revert_failure(&self) -> bool {
        matches!(self, Self::TrafficControl(_) | Self::Internal(_))
    }
}

impl fmt::Display for RollbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthCheckFailed { phase, details } => {
                write!(f, "health check failed ({phase}): {details}")
            }
            Self::MetricThresholdBreach {
                metric,
                value,
                limit,
            } => write!(f, "metric {metric} breached threshold: {value:.2} vs limit {limit:.2}"),
            Self::RolloutTimeout { limit_secs } => {
                write!(f, "rollout timeout: exceeded {limit_secs}s")
            }
            Self::TrafficControl(msg) => write!(f, "traffic control error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl From<RolloutError> for RollbackCause {
    fn from(err: RolloutError) -> Self {
        match err {
            RolloutError::Traffic(e) => Self::TrafficControl(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
