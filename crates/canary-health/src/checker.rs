//! Health check probe logic.
//!
//! Performs HTTP health checks against canary endpoints and aggregates
//! the results into a single verdict.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use canary_core::HealthCheck;

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub endpoint: String,
    pub healthy: bool,
    /// Status code actually returned, if the request got that far.
    pub observed_status: Option<u16>,
    pub expected_status: u16,
    /// Transport error, if the probe never got a response.
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Result for a response with the given status.
    pub fn observed(check: &HealthCheck, status: u16) -> Self {
        Self {
            endpoint: check.endpoint.clone(),
            healthy: status == check.expected_status,
            observed_status: Some(status),
            expected_status: check.expected_status,
            error: None,
        }
    }

    /// Result for a probe that never received a response.
    pub fn failed(check: &HealthCheck, error: impl Into<String>) -> Self {
        Self {
            endpoint: check.endpoint.clone(),
            healthy: false,
            observed_status: None,
            expected_status: check.expected_status,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.observed_status) {
            (Some(err), _) => write!(f, "{} unreachable: {err}", self.endpoint),
            (None, Some(status)) => write!(
                f,
                "{} returned {status}, expected {}",
                self.endpoint, self.expected_status
            ),
            (None, None) => write!(f, "{} produced no result", self.endpoint),
        }
    }
}

/// Aggregate of one pass over all configured checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub results: Vec<HealthCheckResult>,
}

impl HealthReport {
    /// True iff every entry is healthy. An empty report is healthy.
    pub fn healthy(&self) -> bool {
        self.results.iter().all(|r| r.healthy)
    }

    pub fn failures(&self) -> impl Iterator<Item = &HealthCheckResult> {
        self.results.iter().filter(|r| !r.healthy)
    }

    /// One line naming every failing endpoint.
    pub fn summary(&self) -> String {
        self.failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Executes a single probe. Implementations must not fail: every error
/// becomes an unhealthy result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, check: &HealthCheck) -> HealthCheckResult;
}

/// Probes over HTTP GET, bounded by the check's `timeout_ms`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, check: &HealthCheck) -> HealthCheckResult {
        match canary_core::http::get(&check.endpoint, check.timeout()).await {
            Ok(resp) => HealthCheckResult::observed(check, resp.status.as_u16()),
            Err(e) => {
                debug!(endpoint = %check.endpoint, error = %e, "health probe failed");
                HealthCheckResult::failed(check, e.to_string())
            }
        }
    }
}

/// Reports every endpoint healthy without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeHealthyProber;

#[async_trait]
impl Prober for AssumeHealthyProber {
    async fn probe(&self, check: &HealthCheck) -> HealthCheckResult {
        debug!(endpoint = %check.endpoint, "dry-run: health probe skipped");
        HealthCheckResult::observed(check, check.expected_status)
    }
}

/// Runs a set of health checks and aggregates the verdict.
#[derive(Clone)]
pub struct HealthChecker {
    prober: Arc<dyn Prober>,
}

impl HealthChecker {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }

    /// Checker backed by [`HttpProber`].
    pub fn http() -> Self {
        Self::new(Arc::new(HttpProber))
    }

    /// Checker backed by [`AssumeHealthyProber`].
    pub fn assume_healthy() -> Self {
        Self::new(Arc::new(AssumeHealthyProber))
    }

    /// Probe every check once, in configuration order.
    pub async fn check(&self, checks: &[HealthCheck]) -> HealthReport {
        let mut results = Vec::with_capacity(checks.len());

        for check in checks {
            let result = self.prober.probe(check).await;
            if result.healthy {
                debug!(endpoint = %result.endpoint, "health check passed");
            } else {
                warn!(
                    endpoint = %result.endpoint,
                    observed = ?result.observed_status,
                    expected = result.expected_status,
                    error = ?result.error,
                    "health check failed"
                );
            }
            results.push(result);
        }

        let report = HealthReport { results };
        info!(
            checks = report.results.len(),
            failed = report.failures().count(),
            healthy = report.healthy(),
            "health checks completed"
        );
        report
    }
}

impl fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecker").finish_non_exhaustive()
    }
}
