//! Lifecycle notifications.
//!
//! The orchestrator and rollback manager emit a [`Notification`] at each
//! milestone. Delivery goes through [`deliver`], which logs failures and
//! never propagates them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use canary_core::{Environment, NotificationsConfig};

use crate::error::NotifyError;
use crate::session::DeploymentSession;

/// Lifecycle milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    TrafficIncreased,
    Rollback,
    Promoted,
    Failed,
}

impl EventKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Started | Self::TrafficIncreased => Severity::Info,
            Self::Rollback => Severity::Warning,
            Self::Promoted => Severity::Success,
            Self::Failed => Severity::Failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Failure,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Success => "✅",
            Self::Warning => "⚠️",
            Self::Failure => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
    pub deployment_id: String,
    pub application: String,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(session: &DeploymentSession, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            deployment_id: session.id().to_string(),
            application: session.application().to_string(),
            environment: session.environment(),
            timestamp: Utc::now(),
        }
    }
}

/// Delivers notifications to people or systems.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Send `notification`, logging instead of failing.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    info!(
        kind = ?notification.kind,
        severity = ?notification.severity,
        message = %notification.message,
        "notification"
    );
    if let Err(e) = notifier.notify(&notification).await {
        warn!(error = %e, kind = ?notification.kind, "notification delivery failed");
    }
}

/// Logs only. Selected for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(kind = ?notification.kind, "dry-run: notification not delivered");
        Ok(())
    }
}

/// Writes one JSON record per notification into a directory, tagged
/// with the configured channel routing for a downstream relay.
#[derive(Debug)]
pub struct FileNotifier {
    dir: PathBuf,
    routing: NotificationsConfig,
    seq: AtomicU64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRecord<'a> {
    #[serde(flatten)]
    notification: &'a Notification,
    emoji: &'static str,
    text: String,
    routing: &'a NotificationsConfig,
}

impl FileNotifier {
    pub fn new(dir: impl Into<PathBuf>, routing: NotificationsConfig) -> Self {
        Self {
            dir: dir.into(),
            routing,
            seq: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let emoji = notification.severity.emoji();
        let record = NotificationRecord {
            notification,
            emoji,
            text: format!("{emoji} {}", notification.message),
            routing: &self.routing,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "{}-{}-{seq}.json",
            notification.deployment_id,
            notification.timestamp.timestamp_millis()
        ));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| NotifyError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| NotifyError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "notification written");
        Ok(())
    }
}
