use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use canary_core::{MetricThreshold, RolloutConfig, SessionStatus};
use canary_health::HealthChecker;
use canary_metrics::{MetricsProvider, PrometheusProvider, StaticProvider};
use canary_rollout::{
    CommandTrafficController, DeploymentResult, DryRunTrafficController, FileNotifier,
    JsonFileRecorder, Orchestrator, TrafficController,
};

use crate::Cli;
use crate::logging::SessionLog;

pub async fn run(cli: Cli, session_log: SessionLog) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;

    let log_path = cli
        .log_dir
        .join("deployments")
        .join(format!("{}.log", config.deployment_id));
    session_log
        .open(&log_path)
        .with_context(|| format!("failed to open session log {}", log_path.display()))?;

    print_summary(&config);
    let orchestrator = build_orchestrator(&config, &cli.log_dir)?;
    let result = orchestrator.run(config).await?;
    print_result(&result);

    Ok(exit_code(result.status))
}

/// Stock profile, then flags, then the config file. `--dry-run` and
/// `--force` stay on even if the file says otherwise.
fn build_config(cli: &Cli) -> anyhow::Result<RolloutConfig> {
    let mut config = RolloutConfig::for_application(&cli.app, cli.env);
    config.initial_traffic_percent = cli.initial_traffic;
    config.traffic_step_percent = cli.step;
    config.step_interval_seconds = cli.interval.saturating_mul(60);
    config.metrics.endpoint = cli.metrics_endpoint.clone();
    config
        .rollback_thresholds
        .insert("errorRate".to_string(), MetricThreshold::max(cli.rollback_threshold));

    if let Some(path) = &cli.config {
        config = config
            .overlay_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
    }
    config.dry_run |= cli.dry_run;
    config.force |= cli.force;

    config.validate()?;
    Ok(config)
}

/// Pick real or simulated collaborators once, from the resolved config.
fn build_orchestrator(config: &RolloutConfig, log_dir: &Path) -> anyhow::Result<Orchestrator> {
    let (traffic, metrics, health): (Arc<dyn TrafficController>, Arc<dyn MetricsProvider>, _) =
        if config.dry_run {
            (
                Arc::new(DryRunTrafficController),
                Arc::new(StaticProvider::simulated(&config.metrics.queries)),
                HealthChecker::assume_healthy(),
            )
        } else {
            (
                Arc::new(CommandTrafficController::from_config(&config.traffic)?),
                Arc::new(PrometheusProvider::new(
                    &config.metrics.endpoint,
                    config.query_timeout(),
                )?),
                HealthChecker::http(),
            )
        };

    let notifier = Arc::new(FileNotifier::new(
        log_dir.join("notifications"),
        config.notifications.clone(),
    ));
    let recorder = Arc::new(JsonFileRecorder::new(log_dir.join("deployments")));

    Ok(Orchestrator::new(traffic, metrics, health, notifier, recorder))
}

fn exit_code(status: SessionStatus) -> ExitCode {
    match status {
        SessionStatus::Promoted => ExitCode::SUCCESS,
        SessionStatus::RolledBack => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

fn print_summary(config: &RolloutConfig) {
    println!("Canary deployment {}", config.deployment_id);
    println!("  application:   {}", config.application);
    println!("  environment:   {}", config.environment);
    println!(
        "  traffic:       {}% initial, +{}% every {}s ({} steps)",
        config.initial_traffic_percent,
        config.traffic_step_percent,
        config.step_interval_seconds,
        config.ramp_steps()
    );
    println!("  max duration:  {}s", config.max_rollout_seconds);
    for (metric, threshold) in &config.rollback_thresholds {
        println!("  threshold:     {metric} {:?} {}", threshold.direction, threshold.limit);
    }
    if config.dry_run {
        println!("  mode:          dry run");
    }
    if config.force {
        println!("  mode:          force");
    }
}

fn print_result(result: &DeploymentResult) {
    match result.status {
        SessionStatus::Promoted => println!(
            "✓ {} promoted to 100% in {:.0}s",
            result.application, result.duration_seconds
        ),
        status => println!(
            "✗ {} {status} at {}% max traffic: {}",
            result.application,
            result.max_traffic_percent_reached,
            result.rollback_reason.as_deref().unwrap_or("no reason recorded")
        ),
    }
}
