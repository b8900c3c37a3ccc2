//! Typed error hierarchy for the atelier workflow core.
//!
//! Three categories cover the failure modes of a run:
//! - **Validation** — a bad request, rejected before any state mutation
//! - **State integrity** — a state that cannot be safely mutated or resumed
//! - **Producer** — a generation step failed; fatal to the current call
//!
//! No error here triggers a retry: a failed run is terminal and must be
//! restarted by the caller with a fresh or corrected state.

use thiserror::Error;

use crate::stage::Stage;

/// Coarse classification of a [`WorkflowError`], mirroring the three
/// rejection points of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any mutation.
    Validation,
    /// The supplied state is internally inconsistent.
    StateIntegrity,
    /// A producer or the quality gate failed mid-run.
    Producer,
}

/// Errors raised by the workflow engine and its collaborators.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid requirements: {0}")]
    InvalidRequirements(String),

    #[error("Invalid decision '{value}': expected one of approve, revise, reject")]
    InvalidDecision { value: String },

    #[error("Invalid revision target '{value}': expected concept, spatial, parallel_designs, visual, interactive, or budget")]
    InvalidRevisionTarget { value: String },

    #[error("Invalid stage '{value}': expected concept, spatial, visual, interactive, or budget")]
    InvalidStage { value: String },

    #[error("Workflow is not waiting for a human decision")]
    NotWaiting,

    #[error("Workflow is waiting for a human decision; use resume")]
    AwaitingDecision,

    #[error("Another run or resume is already in flight for this workflow")]
    RunInFlight,

    #[error("No producer registered for stage {stage}")]
    MissingProducer { stage: Stage },

    #[error("Workflow has already failed and cannot be re-run")]
    AlreadyFailed,

    #[error("Revision refused: iteration bound {max} reached")]
    RevisionExhausted { max: u32 },

    #[error("Quality evaluation out of policy: {0}")]
    EvaluationPolicy(String),

    #[error("State integrity violation: {0}")]
    StateIntegrity(String),

    #[error("Producer for stage {stage} failed: {message}")]
    Producer { stage: Stage, message: String },

    #[error("Quality gate failed: {message}")]
    Evaluation { message: String },
}

impl WorkflowError {
    /// Which of the three rejection points this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::InvalidRequirements(_)
            | WorkflowError::InvalidDecision { .. }
            | WorkflowError::InvalidRevisionTarget { .. }
            | WorkflowError::InvalidStage { .. }
            | WorkflowError::NotWaiting
            | WorkflowError::AwaitingDecision
            | WorkflowError::RunInFlight
            | WorkflowError::MissingProducer { .. }
            | WorkflowError::AlreadyFailed
            | WorkflowError::RevisionExhausted { .. }
            | WorkflowError::EvaluationPolicy(_) => ErrorCategory::Validation,
            WorkflowError::StateIntegrity(_) => ErrorCategory::StateIntegrity,
            WorkflowError::Producer { .. } | WorkflowError::Evaluation { .. } => {
                ErrorCategory::Producer
            }
        }
    }

    /// The stage whose producer failed, if this is a producer failure.
    pub fn failing_stage(&self) -> Option<Stage> {
        match self {
            WorkflowError::Producer { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
