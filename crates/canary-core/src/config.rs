//! Rollout configuration — defaults, JSON file overlay, and validation.
//!
//! A configuration starts from [`RolloutConfig::for_application`], which
//! reproduces the stock canary profile for an application/environment
//! pair. A JSON config file is then laid over it key by key: top-level
//! keys present in the file replace the default wholesale, unknown keys
//! are ignored, and missing keys keep their default.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Environment;

/// Default Prometheus instant-query endpoint.
pub const DEFAULT_METRICS_ENDPOINT: &str = "http://prometheus:9090/api/v1/query";

/// Deployment ids are capped at this many characters.
const MAX_DEPLOYMENT_ID_LEN: usize = 40;

/// Immutable input of a rollout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    /// Session id; also keys every persisted artifact.
    pub deployment_id: String,
    pub application: String,
    pub environment: Environment,
    /// Canary traffic applied when the canary is first deployed.
    pub initial_traffic_percent: u32,
    /// Traffic added per ramp step.
    pub traffic_step_percent: u32,
    /// Wait between ramp steps.
    pub step_interval_seconds: u64,
    /// Hard ceiling on the whole ramp.
    pub max_rollout_seconds: u64,
    /// Period of the metrics monitor.
    pub metric_check_interval_seconds: u64,
    pub metrics: MetricsConfig,
    /// Metric name → limit. Metrics without a threshold are recorded only.
    pub rollback_thresholds: BTreeMap<String, MetricThreshold>,
    /// Probed in order before every ramp step and before promotion.
    pub health_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub traffic: TrafficCommands,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
}

/// Where and what to query for canary metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub endpoint: String,
    /// Metric name → query expression.
    pub queries: BTreeMap<String, String>,
    pub query_timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_METRICS_ENDPOINT.to_string(),
            queries: BTreeMap::new(),
            query_timeout_ms: 10_000,
        }
    }
}

/// Which side of the limit is healthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Breach when the value rises above the limit (error rate, latency, CPU, memory).
    #[default]
    LowerIsBetter,
    /// Breach when the value drops below the limit (throughput, success ratio).
    HigherIsBetter,
}

/// Rollback limit for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub limit: f64,
    #[serde(default)]
    pub direction: ThresholdDirection,
}

impl MetricThreshold {
    /// Upper bound: values strictly above `limit` breach.
    pub fn max(limit: f64) -> Self {
        Self {
            limit,
            direction: ThresholdDirection::LowerIsBetter,
        }
    }

    /// Lower bound: values strictly below `limit` breach.
    pub fn min(limit: f64) -> Self {
        Self {
            limit,
            direction: ThresholdDirection::HigherIsBetter,
        }
    }

    /// Whether `value` crosses this threshold. Equality never breaches.
    pub fn is_breached_by(&self, value: f64) -> bool {
        match self.direction {
            ThresholdDirection::LowerIsBetter => value > self.limit,
            ThresholdDirection::HigherIsBetter => value < self.limit,
        }
    }
}

/// One HTTP health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub endpoint: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl HealthCheck {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            expected_status: default_expected_status(),
            timeout_ms: default_health_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_expected_status() -> u16 {
    200
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

/// Shell commands driving the real traffic router.
///
/// `{percent}` in `set_command` is replaced with the target percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficCommands {
    pub set_command: Option<String>,
    pub revert_command: Option<String>,
    pub command_timeout_seconds: u64,
}

impl Default for TrafficCommands {
    fn default() -> Self {
        Self {
            set_command: None,
            revert_command: None,
            command_timeout_seconds: 120,
        }
    }
}

/// Notification channel routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationsConfig {
    pub slack: Option<SlackChannel>,
    pub email: Option<EmailChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackChannel {
    pub channel: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub icon_emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChannel {
    pub recipients: Vec<String>,
}

impl RolloutConfig {
    /// The stock canary profile for `application` in `environment`.
    pub fn for_application(application: &str, environment: Environment) -> Self {
        let queries = BTreeMap::from([
            (
                "errorRate".to_string(),
                format!(
                    "sum(rate(http_server_requests_seconds_count{{status=~\"5..\",service=\"{application}\"}}[2m])) / sum(rate(http_server_requests_seconds_count{{service=\"{application}\"}}[2m])) * 100"
                ),
            ),
            (
                "latencyP95".to_string(),
                format!(
                    "histogram_quantile(0.95, sum(rate(http_server_requests_seconds_bucket{{service=\"{application}\"}}[2m])) by (le))"
                ),
            ),
            (
                "cpuUsage".to_string(),
                format!("avg(process_cpu_usage{{service=\"{application}\"}}) * 100"),
            ),
            (
                "memoryUsage".to_string(),
                format!(
                    "avg(jvm_memory_used_bytes{{service=\"{application}\",area=\"heap\"}}) / 1024 / 1024"
                ),
            ),
        ]);

        let rollback_thresholds = BTreeMap::from([
            ("errorRate".to_string(), MetricThreshold::max(2.0)),
            ("latencyP95".to_string(), MetricThreshold::max(2.0)),
            ("cpuUsage".to_string(), MetricThreshold::max(85.0)),
            ("memoryUsage".to_string(), MetricThreshold::max(1024.0)),
        ]);

        let base = format!("https://{environment}-{application}.example.com");

        Self {
            deployment_id: deployment_id_for(application),
            application: application.to_string(),
            environment,
            initial_traffic_percent: 5,
            traffic_step_percent: 10,
            step_interval_seconds: 300,
            max_rollout_seconds: 3_600,
            metric_check_interval_seconds: 30,
            metrics: MetricsConfig {
                queries,
                ..Default::default()
            },
            rollback_thresholds,
            health_checks: vec![
                HealthCheck::new(format!("{base}/health")),
                HealthCheck::new(format!("{base}/actuator/health")),
            ],
            traffic: TrafficCommands::default(),
            notifications: NotificationsConfig {
                slack: Some(SlackChannel {
                    channel: "deployments".to_string(),
                    username: Some("Canary Deployment".to_string()),
                    icon_emoji: Some(":rocket:".to_string()),
                }),
                email: None,
            },
            dry_run: false,
            force: false,
        }
    }

    /// Lay a JSON object over this config, replacing top-level keys.
    pub fn overlay(self, overrides: serde_json::Value) -> ConfigResult<Self> {
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(ConfigError::Invalid(
                "config file must contain a JSON object".to_string(),
            ));
        };

        let serde_json::Value::Object(mut merged) = serde_json::to_value(&self)? else {
            return invalid("rollout config did not serialize to an object");
        };
        for (key, value) in overrides {
            debug!(%key, "config key overridden from file");
            merged.insert(key, value);
        }

        Ok(serde_json::from_value(serde_json::Value::Object(merged))?)
    }

    /// Overlay the JSON file at `path`. A missing file keeps the defaults.
    pub fn overlay_file(self, path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(self);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: serde_json::Value = serde_json::from_str(&content)?;
        let config = self.overlay(overrides)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Reject configurations that cannot drive a rollout.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.application.trim().is_empty() {
            return invalid("application must not be empty");
        }
        if self.deployment_id.trim().is_empty() {
            return invalid("deploymentId must not be empty");
        }
        if self.traffic_step_percent == 0 {
            return invalid("trafficStepPercent must be greater than 0");
        }
        if self.metric_check_interval_seconds == 0 {
            return invalid("metricCheckIntervalSeconds must be greater than 0");
        }
        if self.max_rollout_seconds == 0 {
            return invalid("maxRolloutSeconds must be greater than 0");
        }
        if self.metrics.query_timeout_ms == 0 {
            return invalid("metrics.queryTimeoutMs must be greater than 0");
        }
        if !self.metrics.queries.is_empty() {
            url::Url::parse(&self.metrics.endpoint).map_err(|e| {
                ConfigError::Invalid(format!(
                    "metrics.endpoint {:?} is not a valid URL: {e}",
                    self.metrics.endpoint
                ))
            })?;
        }

        for (metric, threshold) in &self.rollback_thresholds {
            if !threshold.limit.is_finite() {
                return invalid(format!("threshold for {metric} must be a finite number"));
            }
            if !self.metrics.queries.contains_key(metric) {
                warn!(%metric, "threshold configured for a metric that is never queried");
            }
        }

        for check in &self.health_checks {
            if check.endpoint.trim().is_empty() {
                return invalid("health check endpoint must not be empty");
            }
            if !(100..=599).contains(&check.expected_status) {
                return invalid(format!(
                    "health check {} expects invalid status {}",
                    check.endpoint, check.expected_status
                ));
            }
            if check.timeout_ms == 0 {
                return invalid(format!(
                    "health check {} timeoutMs must be greater than 0",
                    check.endpoint
                ));
            }
        }

        Ok(())
    }

    /// Number of ramp steps from the initial percentage up to 100.
    pub fn ramp_steps(&self) -> u32 {
        if self.initial_traffic_percent >= 100 || self.traffic_step_percent == 0 {
            return 0;
        }
        (100 - self.initial_traffic_percent).div_ceil(self.traffic_step_percent)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_secs(self.step_interval_seconds)
    }

    pub fn max_rollout(&self) -> Duration {
        Duration::from_secs(self.max_rollout_seconds)
    }

    pub fn metric_check_interval(&self) -> Duration {
        Duration::from_secs(self.metric_check_interval_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.metrics.query_timeout_ms)
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn invalid<T>(msg: impl Into<String>) -> ConfigResult<T> {
    Err(ConfigError::Invalid(msg.into()))
}

/// `canary-<app>-<compact UTC timestamp>`, capped at 40 characters.
pub fn deployment_id_for(application: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    format!("canary-{application}-{stamp}")
        .chars()
        .take(MAX_DEPLOYMENT_ID_LEN)
        .collect()
}
