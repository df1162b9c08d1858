pub mod cancellation;
pub mod models;
pub mod traits;
pub mod tracker;

pub use cancellation::CancellationController;
pub use models::*;
pub use tracker::{AdmittedItem, AttemptStart, CancelOutcome, ProgressTracker, TerminalTransition};
pub use traits::*;

pub use orchestrator_errors::{
    CallFailureKind, ErrorCategory, FileAccessFailureKind, OrchestratorError, OrchestratorResult,
};
