//! Traffic controllers — how canary traffic percentages reach the router.
//!
//! The orchestrator picks one controller when a session is built: the
//! dry-run controller for simulations, otherwise the injected one. No
//! other code branches on dry-run for traffic.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use canary_core::{ConfigError, ConfigResult, TrafficCommands};

use crate::error::{TrafficError, TrafficResult};

/// Applies traffic splits between the stable and canary versions.
#[async_trait]
pub trait TrafficController: Send + Sync {
    /// Route `percent` of traffic to the canary.
    async fn set_traffic_percent(&self, percent: u32) -> TrafficResult<()>;

    /// Route all traffic back to the stable version.
    async fn revert_to_stable(&self) -> TrafficResult<()>;

    /// Confirm the router can be driven before a rollout starts.
    async fn ready(&self) -> TrafficResult<()> {
        Ok(())
    }
}

/// Reject percentages outside 0-100.
pub fn validate_percent(percent: u32) -> TrafficResult<()> {
    if percent > 100 {
        return Err(TrafficError::InvalidPercent(percent));
    }
    Ok(())
}

/// Validates input and logs, but never touches the router.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTrafficController;

#[async_trait]
impl TrafficController for DryRunTrafficController {
    async fn set_traffic_percent(&self, percent: u32) -> TrafficResult<()> {
        validate_percent(percent)?;
        info!(percent, "dry-run: would route canary traffic");
        Ok(())
    }

    async fn revert_to_stable(&self) -> TrafficResult<()> {
        info!("dry-run: would revert all traffic to stable");
        Ok(())
    }
}

/// Drives the router through operator-supplied shell commands.
///
/// `{percent}` in the set command is replaced with the target value.
#[derive(Debug, Clone)]
pub struct CommandTrafficController {
    set_command: String,
    revert_command: String,
    timeout: Duration,
}

impl CommandTrafficController {
    pub fn new(set_command: &str, revert_command: &str, timeout: Duration) -> Self {
        Self {
            set_command: set_command.to_string(),
            revert_command: revert_command.to_string(),
            timeout,
        }
    }

    /// Build from config; both commands are required.
    pub fn from_config(commands: &TrafficCommands) -> ConfigResult<Self> {
        let (Some(set), Some(revert)) = (&commands.set_command, &commands.revert_command) else {
            return Err(ConfigError::Invalid(
                "traffic.setCommand and traffic.revertCommand are required unless running with --dry-run"
                    .to_string(),
            ));
        };
        if set.trim().is_empty() || revert.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "traffic commands must not be empty".to_string(),
            ));
        }
        Ok(Self::new(
            set,
            revert,
            Duration::from_secs(commands.command_timeout_seconds),
        ))
    }

    async fn run(&self, command: &str) -> TrafficResult<()> {
        debug!(%command, "running traffic command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| TrafficError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| TrafficError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TrafficError::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TrafficController for CommandTrafficController {
    async fn set_traffic_percent(&self, percent: u32) -> TrafficResult<()> {
        validate_percent(percent)?;
        let command = self.set_command.replace("{percent}", &percent.to_string());
        self.run(&command).await?;
        info!(percent, "canary traffic routed");
        Ok(())
    }

    async fn revert_to_stable(&self) -> TrafficResult<()> {
        self.run(&self.revert_command).await?;
        info!("all traffic reverted to stable");
        Ok(())
    }
}
