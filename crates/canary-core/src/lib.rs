//! canary-core — shared types for progressive canary rollouts.
//!
//! Holds the rollout configuration model (defaults, JSON overlay,
//! validation), the data types recorded in a session's audit trail, and
//! the small HTTP/1 transport used by health probes and metric queries.

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use config::{
    DEFAULT_METRICS_ENDPOINT, EmailChannel, HealthCheck, MetricThreshold, MetricsConfig,
    NotificationsConfig, RolloutConfig, SlackChannel, ThresholdDirection, TrafficCommands,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
