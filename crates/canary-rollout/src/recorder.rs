//! Terminal result records and their persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use canary_core::{
    Environment, MetricSnapshot, RolloutConfig, SessionStatus, TrafficSample,
};

use crate::error::RecordError;
use crate::session::DeploymentSession;

/// Final outcome of one session, suitable for persistence and exit codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub session_id: String,
    pub application: String,
    pub environment: Environment,
    pub status: SessionStatus,
    pub success: bool,
    pub promoted: bool,
    pub rollback_initiated: bool,
    pub rollback_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub max_traffic_percent_reached: u32,
    pub final_traffic_percent: u32,
    pub metric_history: Vec<MetricSnapshot>,
    pub traffic_history: Vec<TrafficSample>,
    pub config: RolloutConfig,
}

impl DeploymentResult {
    pub fn from_session(session: &DeploymentSession) -> Self {
        let status = session.status();
        let started_at = session.started_at();
        let ended_at = session.ended_at();
        let duration_seconds = ended_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        Self {
            session_id: session.id().to_string(),
            application: session.application().to_string(),
            environment: session.environment(),
            status,
            success: status == SessionStatus::Promoted,
            promoted: status == SessionStatus::Promoted,
            rollback_initiated: session.rollback_initiated(),
            rollback_reason: session.rollback_reason(),
            started_at,
            ended_at,
            duration_seconds,
            max_traffic_percent_reached: session.max_traffic_percent(),
            final_traffic_percent: session.current_traffic_percent(),
            metric_history: session.metric_history(),
            traffic_history: session.traffic_history(),
            config: session.config().clone(),
        }
    }
}

/// Persists the config snapshot and the terminal record of a session.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record_config(&self, _config: &RolloutConfig) -> Result<(), RecordError> {
        Ok(())
    }

    async fn record_result(&self, result: &DeploymentResult) -> Result<(), RecordError>;
}

/// Writes `<id>.config.json` and `<id>.result.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileRecorder {
    dir: PathBuf,
}

impl JsonFileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn config_path(&self, deployment_id: &str) -> PathBuf {
        self.dir.join(format!("{deployment_id}.config.json"))
    }

    pub fn result_path(&self, deployment_id: &str) -> PathBuf {
        self.dir.join(format!("{deployment_id}.result.json"))
    }

    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<(), RecordError> {
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| RecordError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(path, body)
            .await
            .map_err(|source| RecordError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl ResultRecorder for JsonFileRecorder {
    async fn record_config(&self, config: &RolloutConfig) -> Result<(), RecordError> {
        let path = self.config_path(&config.deployment_id);
        self.write_json(&path, config).await?;
        info!(path = %path.display(), "config snapshot written");
        Ok(())
    }

    async fn record_result(&self, result: &DeploymentResult) -> Result<(), RecordError> {
        let path = self.result_path(&result.session_id);
        self.write_json(&path, result).await?;
        info!(path = %path.display(), "deployment result written");
        Ok(())
    }
}
