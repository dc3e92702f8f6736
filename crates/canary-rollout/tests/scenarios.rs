//! End-to-end rollout scenarios.
//!
//! Every collaborator is an in-memory fake and time is paused, so a
//! full ramp of several simulated hours runs instantly.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use canary_core::{Environment, HealthCheck, RolloutConfig, SessionStatus};
use canary_health::{HealthCheckResult, HealthChecker, Prober};
use canary_metrics::{MetricQueryError, MetricQueryResult, MetricsProvider, StaticProvider};
use canary_rollout::{
    DeploymentResult, EventKind, Notification, Notifier, NotifyError, Orchestrator, RecordError,
    ResultRecorder, RolloutError, TrafficController, TrafficError, TrafficResult,
};

// ── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingTraffic {
    sets: Mutex<Vec<u32>>,
    reverts: AtomicUsize,
    reject_above: Option<u32>,
    fail_revert: bool,
    unready: bool,
}

impl RecordingTraffic {
    fn sets(&self) -> Vec<u32> {
        self.sets.lock().unwrap().clone()
    }

    fn reverts(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrafficController for RecordingTraffic {
    async fn set_traffic_percent(&self, percent: u32) -> TrafficResult<()> {
        if self.reject_above.is_some_and(|max| percent > max) {
            return Err(TrafficError::Backend(format!("{percent}% rejected")));
        }
        self.sets.lock().unwrap().push(percent);
        Ok(())
    }

    async fn revert_to_stable(&self) -> TrafficResult<()> {
        self.reverts.fetch_add(1, Ordering::SeqCst);
        if self.fail_revert {
            return Err(TrafficError::Backend("revert rejected".to_string()));
        }
        Ok(())
    }

    async fn ready(&self) -> TrafficResult<()> {
        if self.unready {
            return Err(TrafficError::Backend("router api unreachable".to_string()));
        }
        Ok(())
    }
}

/// Answers 200 until `fail_from` probes have been made, then 500.
struct ScriptedProber {
    calls: AtomicUsize,
    fail_from: Option<usize>,
}

impl ScriptedProber {
    fn healthy() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: None,
        }
    }

    fn failing_from(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from: Some(call),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, check: &HealthCheck) -> HealthCheckResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let status = match self.fail_from {
            Some(from) if call >= from => 500,
            _ => 200,
        };
        HealthCheckResult::observed(check, status)
    }
}

/// Static values, with failures on chosen calls per expression.
struct FlakyMetrics {
    values: StaticProvider,
    fail_calls: HashMap<String, Vec<usize>>,
    calls: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl MetricsProvider for FlakyMetrics {
    async fn query(&self, expression: &str) -> MetricQueryResult<Option<f64>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(expression.to_string()).or_default();
            *n += 1;
            *n
        };
        if self
            .fail_calls
            .get(expression)
            .is_some_and(|calls| calls.contains(&call))
        {
            return Err(MetricQueryError::Query("upstream timeout".to_string()));
        }
        self.values.query(expression).await
    }
}

struct DownMetrics;

#[async_trait]
impl MetricsProvider for DownMetrics {
    async fn query(&self, _expression: &str) -> MetricQueryResult<Option<f64>> {
        Ok(Some(0.0))
    }

    async fn ready(&self) -> MetricQueryResult<()> {
        Err(MetricQueryError::Query("connection refused".to_string()))
    }
}

/// Reports the canary's live traffic share as its error rate, so each
/// snapshot shows which ramp step it was taken during.
struct TrafficEchoMetrics {
    traffic: Arc<RecordingTraffic>,
    rest: StaticProvider,
}

#[async_trait]
impl MetricsProvider for TrafficEchoMetrics {
    async fn query(&self, expression: &str) -> MetricQueryResult<Option<f64>> {
        if expression == "error_rate" {
            let live = self.traffic.sets().last().copied().unwrap_or(0);
            return Ok(Some(f64::from(live) / 100.0));
        }
        self.rest.query(expression).await
    }
}

struct CrashingMetrics;

#[async_trait]
impl MetricsProvider for CrashingMetrics {
    async fn query(&self, _expression: &str) -> MetricQueryResult<Option<f64>> {
        panic!("metrics client crashed")
    }
}

#[derive(Default)]
struct MemoryNotifier {
    events: Mutex<Vec<EventKind>>,
}

impl MemoryNotifier {
    fn events(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(notification.kind);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryRecorder {
    configs: AtomicUsize,
    results: Mutex<Vec<DeploymentResult>>,
}

#[async_trait]
impl ResultRecorder for MemoryRecorder {
    async fn record_config(&self, _config: &RolloutConfig) -> Result<(), RecordError> {
        self.configs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_result(&self, result: &DeploymentResult) -> Result<(), RecordError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    traffic: Arc<RecordingTraffic>,
    notifier: Arc<MemoryNotifier>,
    recorder: Arc<MemoryRecorder>,
    orchestrator: Orchestrator,
}

fn harness(
    traffic: RecordingTraffic,
    metrics: Arc<dyn MetricsProvider>,
    prober: ScriptedProber,
) -> Harness {
    harness_with(Arc::new(traffic), metrics, prober)
}

fn harness_with(
    traffic: Arc<RecordingTraffic>,
    metrics: Arc<dyn MetricsProvider>,
    prober: ScriptedProber,
) -> Harness {
    let notifier = Arc::new(MemoryNotifier::default());
    let recorder = Arc::new(MemoryRecorder::default());
    let orchestrator = Orchestrator::new(
        traffic.clone(),
        metrics,
        HealthChecker::new(Arc::new(prober)),
        notifier.clone(),
        recorder.clone(),
    );
    Harness {
        traffic,
        notifier,
        recorder,
        orchestrator,
    }
}

/// Stock profile with short, test-friendly expressions.
fn config() -> RolloutConfig {
    let mut config = RolloutConfig::for_application("checkout", Environment::Staging);
    config.metrics.queries = BTreeMap::from([
        ("errorRate".to_string(), "error_rate".to_string()),
        ("latencyP95".to_string(), "latency_p95".to_string()),
        ("cpuUsage".to_string(), "cpu".to_string()),
        ("memoryUsage".to_string(), "memory".to_string()),
    ]);
    config
}

fn healthy_metrics() -> StaticProvider {
    StaticProvider::new()
        .with_value("error_rate", 0.4)
        .with_value("latency_p95", 0.8)
        .with_value("cpu", 55.0)
        .with_value("memory", 700.0)
}

fn percents(result: &DeploymentResult) -> Vec<u32> {
    result.traffic_history.iter().map(|t| t.percent).collect()
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn clean_rollout_ramps_in_ten_steps_and_promotes() {
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    assert!(result.success);
    assert!(result.promoted);
    assert!(!result.rollback_initiated);
    assert_eq!(result.rollback_reason, None);
    assert_eq!(result.final_traffic_percent, 100);
    assert_eq!(result.max_traffic_percent_reached, 100);
    assert_eq!(
        percents(&result),
        vec![5, 15, 25, 35, 45, 55, 65, 75, 85, 95, 100]
    );
    assert_eq!(h.traffic.reverts(), 0);
    assert!(result.ended_at.is_some());

    let events = h.notifier.events();
    assert_eq!(events.first(), Some(&EventKind::Started));
    assert_eq!(events.last(), Some(&EventKind::Promoted));
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == EventKind::TrafficIncreased)
            .count(),
        10
    );

    assert_eq!(h.recorder.configs.load(Ordering::SeqCst), 1);
    assert_eq!(h.recorder.results.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ramp_step_counts_follow_ceiling_division() {
    for (initial, step, expected_steps) in [(5, 10, 10), (10, 30, 3), (0, 100, 1), (99, 50, 1)] {
        let mut config = config();
        config.initial_traffic_percent = initial;
        config.traffic_step_percent = step;
        config.max_rollout_seconds = 100_000;
        let h = harness(
            RecordingTraffic::default(),
            Arc::new(healthy_metrics()),
            ScriptedProber::healthy(),
        );

        let result = h.orchestrator.run(config).await.unwrap();

        assert_eq!(result.status, SessionStatus::Promoted, "{initial}/{step}");
        assert_eq!(result.final_traffic_percent, 100);
        // Deploy sample plus one per step.
        assert_eq!(result.traffic_history.len(), expected_steps + 1, "{initial}/{step}");
    }
}

#[tokio::test(start_paused = true)]
async fn error_rate_breach_rolls_back() {
    let metrics = healthy_metrics();
    metrics.set("error_rate", 3.0);
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(metrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert!(!result.success);
    assert!(result.rollback_initiated);
    let reason = result.rollback_reason.clone().unwrap();
    assert!(reason.contains("errorRate"), "{reason}");
    assert!(reason.contains("3.00"), "{reason}");
    // First tick lands before the first step.
    assert_eq!(percents(&result), vec![5, 0]);
    assert_eq!(result.final_traffic_percent, 0);
    assert_eq!(result.max_traffic_percent_reached, 5);
    assert_eq!(h.traffic.reverts(), 1);
    assert_eq!(result.metric_history.len(), 1);
    assert_eq!(result.metric_history[0].get("errorRate"), Some(3.0));
    assert!(h.notifier.events().contains(&EventKind::Rollback));
}

#[tokio::test(start_paused = true)]
async fn failing_health_check_stops_at_current_percent() {
    // Two checks per pass: initial, step 1 pass; step 2 sees 500s.
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::failing_from(5),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    let reason = result.rollback_reason.clone().unwrap();
    assert!(reason.starts_with("health check failed"), "{reason}");
    assert!(reason.contains("returned 500, expected 200"), "{reason}");
    assert_eq!(result.max_traffic_percent_reached, 15);
    assert_eq!(h.traffic.sets(), vec![5, 15]);
    assert_eq!(h.traffic.reverts(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_initial_health_check_rolls_back_before_ramp() {
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::failing_from(1),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert!(result.rollback_reason.unwrap().contains("(initial)"));
    assert_eq!(h.traffic.sets(), vec![5]);
}

#[tokio::test(start_paused = true)]
async fn metric_query_failure_alone_never_rolls_back() {
    let metrics = FlakyMetrics {
        values: healthy_metrics(),
        fail_calls: HashMap::from([("error_rate".to_string(), vec![1])]),
        calls: Mutex::default(),
    };
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(metrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    let history = &result.metric_history;
    assert!(history.len() > 2);
    assert_eq!(history[0].get("errorRate"), None);
    assert_eq!(history[0].get("cpuUsage"), Some(55.0));
    assert_eq!(history[1].get("errorRate"), Some(0.4));
}

#[tokio::test(start_paused = true)]
async fn simultaneous_triggers_revert_once() {
    // Metric tick and first ramp step both land at t=300s.
    let mut config = config();
    config.metric_check_interval_seconds = 300;
    let metrics = healthy_metrics();
    metrics.set("latency_p95", 5.0);
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(metrics),
        ScriptedProber::failing_from(3),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert_eq!(h.traffic.reverts(), 1);
    let reason = result.rollback_reason.clone().unwrap();
    assert!(
        reason.contains("latencyP95") ^ reason.starts_with("health check failed"),
        "{reason}"
    );
    assert_eq!(
        h.notifier
            .events()
            .iter()
            .filter(|e| **e == EventKind::Rollback)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn rollout_timeout_rolls_back() {
    let mut config = config();
    config.max_rollout_seconds = 500;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert_eq!(
        result.rollback_reason.as_deref(),
        Some("rollout timeout: exceeded 500s")
    );
    assert_eq!(result.max_traffic_percent_reached, 15);
    assert_eq!(h.traffic.reverts(), 1);
}

#[tokio::test(start_paused = true)]
async fn full_traffic_initial_goes_straight_to_finalize() {
    let mut config = config();
    config.initial_traffic_percent = 100;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    assert_eq!(percents(&result), vec![100]);
    assert!(!h.notifier.events().contains(&EventKind::TrafficIncreased));
}

#[tokio::test(start_paused = true)]
async fn zero_step_is_rejected_before_deploy() {
    let mut config = config();
    config.traffic_step_percent = 0;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let err = h.orchestrator.run(config).await.unwrap_err();

    assert!(matches!(err, RolloutError::Config(_)));
    assert!(h.traffic.sets().is_empty());
    assert!(h.notifier.events().is_empty());
    assert_eq!(h.recorder.configs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn traffic_error_mid_ramp_rolls_back() {
    let h = harness(
        RecordingTraffic {
            reject_above: Some(30),
            ..Default::default()
        },
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert!(
        result
            .rollback_reason
            .unwrap()
            .starts_with("traffic control error")
    );
    assert_eq!(h.traffic.sets(), vec![5, 15, 25]);
    assert_eq!(result.final_traffic_percent, 0);
}

#[tokio::test(start_paused = true)]
async fn traffic_error_with_failed_revert_is_failed() {
    let h = harness(
        RecordingTraffic {
            reject_above: Some(30),
            fail_revert: true,
            ..Default::default()
        },
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::Failed);
    let reason = result.rollback_reason.clone().unwrap();
    assert!(reason.contains("revert failed"), "{reason}");
    assert_eq!(result.final_traffic_percent, 25);
    assert!(h.notifier.events().contains(&EventKind::Failed));
}

#[tokio::test(start_paused = true)]
async fn detector_rollback_with_failed_revert_stays_rolled_back() {
    let h = harness(
        RecordingTraffic {
            fail_revert: true,
            ..Default::default()
        },
        Arc::new(healthy_metrics()),
        ScriptedProber::failing_from(3),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    let reason = result.rollback_reason.clone().unwrap();
    assert!(reason.starts_with("health check failed"), "{reason}");
    assert!(reason.contains("revert failed"), "{reason}");
}

#[tokio::test(start_paused = true)]
async fn force_ignores_health_failures() {
    let mut config = config();
    config.force = true;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::failing_from(1),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    assert_eq!(h.traffic.reverts(), 0);
}

#[tokio::test(start_paused = true)]
async fn force_does_not_ignore_metric_breaches() {
    let mut config = config();
    config.force = true;
    let metrics = healthy_metrics();
    metrics.set("cpu", 97.0);
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(metrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    assert!(result.rollback_reason.unwrap().contains("cpuUsage"));
}

#[tokio::test(start_paused = true)]
async fn prerequisite_failure_aborts_without_traffic() {
    let h = harness(
        RecordingTraffic {
            unready: true,
            ..Default::default()
        },
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let err = h.orchestrator.run(config()).await.unwrap_err();

    assert!(matches!(err, RolloutError::Prerequisite(_)));
    assert!(err.to_string().contains("router api unreachable"));
    assert!(h.traffic.sets().is_empty());
    assert_eq!(h.notifier.events(), vec![EventKind::Failed]);
    let results = h.recorder.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, SessionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn force_bypasses_prerequisites() {
    let mut config = config();
    config.force = true;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(DownMetrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
}

// ── Dry run ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dry_run_never_touches_traffic_but_reaches_every_outcome() {
    struct Case {
        error_rate: f64,
        fail_from: Option<usize>,
    }

    let cases = [
        Case { error_rate: 0.4, fail_from: None },
        Case { error_rate: 3.0, fail_from: None },
        Case { error_rate: 0.4, fail_from: Some(5) },
    ];

    for case in cases {
        let mut statuses = Vec::new();
        for dry_run in [false, true] {
            let metrics = healthy_metrics();
            metrics.set("error_rate", case.error_rate);
            let prober = match case.fail_from {
                Some(n) => ScriptedProber::failing_from(n),
                None => ScriptedProber::healthy(),
            };
            let h = harness(RecordingTraffic::default(), Arc::new(metrics), prober);
            let mut config = config();
            config.dry_run = dry_run;

            let result = h.orchestrator.run(config).await.unwrap();

            if dry_run {
                assert!(h.traffic.sets().is_empty());
                assert_eq!(h.traffic.reverts(), 0);
                assert!(h.notifier.events().is_empty());
            }
            statuses.push((result.status, percents(&result)));
        }
        assert_eq!(statuses[0], statuses[1]);
    }
}

#[tokio::test(start_paused = true)]
async fn snapshots_interleave_with_ramp_steps() {
    let traffic = Arc::new(RecordingTraffic::default());
    let metrics = Arc::new(TrafficEchoMetrics {
        traffic: traffic.clone(),
        rest: healthy_metrics(),
    });
    let h = harness_with(traffic, metrics, ScriptedProber::healthy());

    let result = h.orchestrator.run(config()).await.unwrap();
    assert_eq!(result.status, SessionStatus::Promoted);

    let observed: Vec<f64> = result
        .metric_history
        .iter()
        .map(|s| s.values["errorRate"])
        .collect();
    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");

    // Every step is seen in ramp order. The jump to 100% may land after
    // the monitor's last tick.
    let mut seen = observed.clone();
    seen.dedup();
    let applied: Vec<f64> = percents(&result)
        .into_iter()
        .map(|p| f64::from(p) / 100.0)
        .collect();
    assert!(applied.starts_with(&seen), "{seen:?} vs {applied:?}");
    assert!(seen.len() >= applied.len() - 1, "{seen:?} vs {applied:?}");
}

#[tokio::test(start_paused = true)]
async fn unbounded_rollout_limit_promotes() {
    let mut config = config();
    config.max_rollout_seconds = u64::MAX;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    assert_eq!(result.final_traffic_percent, 100);
    assert!(!result.metric_history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unbounded_check_interval_promotes_without_polling() {
    let mut config = config();
    config.metric_check_interval_seconds = u64::MAX;
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(healthy_metrics()),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config).await.unwrap();

    assert_eq!(result.status, SessionStatus::Promoted);
    assert!(result.metric_history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn crashed_monitor_rolls_back_instead_of_ramping_unwatched() {
    let h = harness(
        RecordingTraffic::default(),
        Arc::new(CrashingMetrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::RolledBack);
    let reason = result.rollback_reason.as_deref().unwrap();
    assert!(
        reason.starts_with("internal error: metrics monitor task failed"),
        "{reason}"
    );
    assert_eq!(result.max_traffic_percent_reached, 5);
    assert_eq!(h.traffic.sets(), vec![5]);
    assert_eq!(h.traffic.reverts(), 1);
    assert!(h.notifier.events().contains(&EventKind::Rollback));
}

#[tokio::test(start_paused = true)]
async fn crashed_monitor_with_failed_revert_is_failed() {
    let h = harness(
        RecordingTraffic {
            fail_revert: true,
            ..Default::default()
        },
        Arc::new(CrashingMetrics),
        ScriptedProber::healthy(),
    );

    let result = h.orchestrator.run(config()).await.unwrap();

    assert_eq!(result.status, SessionStatus::Failed);
    let reason = result.rollback_reason.as_deref().unwrap();
    assert!(reason.contains("revert failed"), "{reason}");
    assert_eq!(h.traffic.reverts(), 1);
}
