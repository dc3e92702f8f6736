//! canary-health — endpoint health checking for canary rollouts.
//!
//! A [`HealthChecker`] runs every configured [`HealthCheck`] once, in
//! order, and folds the per-endpoint results into a [`HealthReport`].
//! The report is healthy only when every entry is healthy.
//!
//! # Architecture
//!
//! ```text
//! HealthChecker
//!   └── Prober (seam)
//!       ├── HttpProber          GET endpoint, compare status, bounded by timeoutMs
//!       └── AssumeHealthyProber dry runs: no network, always healthy
//! ```
//!
//! Probes never fail: transport errors and status mismatches both come
//! back as an unhealthy [`HealthCheckResult`]. There are no retries
//! inside a single check; the rollout re-checks at every ramp step.
//!
//! [`HealthCheck`]: canary_core::HealthCheck

pub mod checker;

pub use checker::{
    AssumeHealthyProber, HealthCheckResult, HealthChecker, HealthReport, HttpProber, Prober,
};
