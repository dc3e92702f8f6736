//! The metrics provider seam.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

/// Result type alias for metric queries.
pub type MetricQueryResult<T> = Result<T, MetricQueryError>;

/// A metric could not be read. Never fatal to a rollout on its own.
#[derive(Debug, Error)]
pub enum MetricQueryError {
    #[error("metrics backend unreachable: {0}")]
    Transport(#[from] canary_core::http::HttpError),

    #[error("metrics backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected metrics response: {0}")]
    Decode(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid metrics endpoint: {0}")]
    Endpoint(String),
}

/// Answers point-in-time queries for named metrics.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Evaluate `expression` now. `Ok(None)` means the backend has no
    /// sample for it.
    async fn query(&self, expression: &str) -> MetricQueryResult<Option<f64>>;

    /// Confirm the backend is reachable before a rollout starts.
    async fn ready(&self) -> MetricQueryResult<()> {
        Ok(())
    }
}

/// Serves fixed values keyed by expression.
///
/// Unknown expressions come back as "not found". Values can be changed
/// while a rollout is running.
#[derive(Debug, Default)]
pub struct StaticProvider {
    values: RwLock<HashMap<String, f64>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, expression: impl Into<String>, value: f64) -> Self {
        self.set(expression, value);
        self
    }

    pub fn set(&self, expression: impl Into<String>, value: f64) {
        self.values
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(expression.into(), value);
    }

    /// Healthy-looking values for the stock metric names, keyed by the
    /// expressions the given query table uses.
    pub fn simulated<'a>(queries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let provider = Self::new();
        for (name, expression) in queries {
            let value = match name.as_str() {
                "errorRate" => 0.5,
                "latencyP95" => 1.2,
                "cpuUsage" => 60.0,
                "memoryUsage" => 650.0,
                _ => 0.0,
            };
            provider.set(expression.clone(), value);
        }
        provider
    }
}

#[async_trait]
impl MetricsProvider for StaticProvider {
    async fn query(&self, expression: &str) -> MetricQueryResult<Option<f64>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(expression)
            .copied())
    }
}
