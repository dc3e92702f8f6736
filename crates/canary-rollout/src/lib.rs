//! canary-rollout — progressive canary deployments with automatic rollback.
//!
//! This crate drives one canary session from first deploy to either
//! promotion or rollback. Traffic is shifted to the canary in fixed
//! steps; every step is gated on endpoint health, and a background
//! monitor polls metrics against rollback thresholds the whole time.
//!
//! # Components
//!
//! - **`session`** — `DeploymentSession`, the shared state and audit trail of one attempt
//! - **`controller`** — `Orchestrator`, the session state machine (deploy, ramp, finalize)
//! - **`monitor`** — `MetricsMonitor`, periodic metric polling and threshold evaluation
//! - **`rollback`** — `RollbackManager`, the only path that reverts traffic, at most once
//! - **`traffic`** — `TrafficController` seam with dry-run and shell-command adapters
//! - **`notify`** — lifecycle notifications (`Notifier`, file and log adapters)
//! - **`recorder`** — terminal `DeploymentResult` and its JSON persistence
//!
//! # Concurrency
//!
//! ```text
//! Orchestrator task                    MetricsMonitor task
//!   deploy ─► ramp loop ─► finalize      tick ─► poll ─► evaluate
//!        \        │                         │
//!         └───────┴──► RollbackManager ◄────┘
//!                       CAS rollback flag, cancel session, revert once
//! ```

pub mod controller;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod recorder;
pub mod rollback;
pub mod session;
pub mod traffic;

pub use controller::Orchestrator;
pub use error::{
    HealthPhase, NotifyError, RecordError, RollbackCause, RolloutError, RolloutResult,
    TrafficError, TrafficResult,
};
pub use monitor::MetricsMonitor;
pub use notify::{EventKind, FileNotifier, LogNotifier, Notification, Notifier, Severity};
pub use recorder::{DeploymentResult, JsonFileRecorder, ResultRecorder};
pub use rollback::{RollbackManager, RollbackOutcome};
pub use session::DeploymentSession;
pub use traffic::{CommandTrafficController, DryRunTrafficController, TrafficController};
