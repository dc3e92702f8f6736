//! canary-metrics — metric sources for canary rollouts.
//!
//! The rollout monitor asks a [`MetricsProvider`] for one value per
//! configured metric on every tick. A query either yields a number,
//! reports "not found", or fails; the monitor decides what to do with
//! each outcome.
//!
//! # Providers
//!
//! ```text
//! MetricsProvider (seam)
//!   ├── PrometheusProvider  GET <endpoint>?query=<expr>, instant vector/scalar
//!   └── StaticProvider      fixed values per expression (dry runs, tests)
//! ```

pub mod prometheus;
pub mod provider;

pub use prometheus::PrometheusProvider;
pub use provider::{MetricQueryError, MetricQueryResult, MetricsProvider, StaticProvider};
