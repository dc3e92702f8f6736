//! Data types shared across the rollout crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target environment of a rollout.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a deployment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Initializing,
    Deployed,
    Ramping,
    Finalizing,
    Promoted,
    RolledBack,
    Failed,
}

impl SessionStatus {
    /// Whether the session has reached one of its three end states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Promoted | Self::RolledBack | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "INITIALIZING",
            Self::Deployed => "DEPLOYED",
            Self::Ramping => "RAMPING",
            Self::Finalizing => "FINALIZING",
            Self::Promoted => "PROMOTED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One poll of every configured metric.
///
/// Metrics whose query failed on this tick are simply absent from
/// `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            values,
        }
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }
}

/// A traffic percentage applied at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub timestamp: DateTime<Utc>,
    pub percent: u32,
}

impl TrafficSample {
    pub fn now(percent: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            percent,
        }
    }
}
