//! The revision controller: verdicts in, state mutations out.
//!
//! The controller turns a quality-gate record (or a human decision upstream
//! of it) into a concrete disposition, and applies the invalidation cascade
//! when the disposition is a revision. It is the only place the iteration
//! counter advances.

use crate::errors::WorkflowError;
use crate::stage::RevisionTarget;
use crate::state::{RevisionRecord, WorkflowState};

/// Why a run is being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// Iteration bound reached; current best is accepted.
    IterationsExhausted,
    /// Overall score cleared the accept threshold.
    ScoreAccepted,
    /// The gate reported a middling score but named no target.
    NoTarget,
    /// External approval.
    HumanApproved,
    /// External rejection, treated as accept-as-is.
    HumanRejected,
}

impl std::fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FinalizeReason::IterationsExhausted => "iteration bound reached, accepting current best",
            FinalizeReason::ScoreAccepted => "quality score accepted",
            FinalizeReason::NoTarget => "no revision target named",
            FinalizeReason::HumanApproved => "approved by reviewer",
            FinalizeReason::HumanRejected => "rejected by reviewer, accepted as-is",
        };
        write!(f, "{}", s)
    }
}

/// The controller's verdict for one quality pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Finalize { reason: FinalizeReason },
    Revise { target: RevisionTarget, reason: String },
}

impl Disposition {
    pub fn is_finalize(&self) -> bool {
        matches!(self, Disposition::Finalize { .. })
    }
}

/// Decides finalize-vs-revise and applies cascades.
pub struct RevisionController;

impl RevisionController {
    /// Decide what to do after a quality pass. Rule order:
    ///
    /// 1. iteration bound reached → finalize, regardless of score
    /// 2. score clears the accept threshold → finalize
    /// 3. the gate named a target → revise it, with the gate's feedback
    /// 4. no target → finalize
    ///
    /// Requires a quality evaluation on the state; a state reaching this
    /// point without one is integrity-broken.
    pub fn decide(state: &WorkflowState) -> Result<Disposition, WorkflowError> {
        let Some(quality) = state.quality.as_ref() else {
            return Err(WorkflowError::StateIntegrity(
                "deciding without a quality evaluation".to_string(),
            ));
        };

        if state.at_iteration_bound() {
            return Ok(Disposition::Finalize {
                reason: FinalizeReason::IterationsExhausted,
            });
        }
        if quality.accepts() {
            return Ok(Disposition::Finalize {
                reason: FinalizeReason::ScoreAccepted,
            });
        }
        match quality.revision_target {
            Some(target) => Ok(Disposition::Revise {
                target,
                reason: quality.feedback.clone(),
            }),
            None => Ok(Disposition::Finalize {
                reason: FinalizeReason::NoTarget,
            }),
        }
    }

    /// Apply one revision: clear the target's cascade, advance the iteration
    /// counter by exactly one, and record the rationale so the re-run
    /// producers receive it as a hint.
    pub fn apply_revision(
        state: &mut WorkflowState,
        target: RevisionTarget,
        reason: &str,
        human_feedback: Option<String>,
    ) -> Result<(), WorkflowError> {
        if state.at_iteration_bound() {
            return Err(WorkflowError::RevisionExhausted {
                max: state.max_iterations,
            });
        }

        let cleared = target.cascade();
        state.artifacts.clear_cascade(cleared);
        state.iteration_count += 1;
        state.needs_revision = true;
        state.revision_reason = Some(reason.to_string());
        state.last_revision_target = Some(target);
        state.feedback_history.push(RevisionRecord {
            iteration: state.iteration_count,
            target,
            reason: reason.to_string(),
            human_feedback,
            at: chrono::Utc::now(),
        });
        state.log(format!(
            "Revision {}/{}: redoing {} ({} artifacts cleared): {}",
            state.iteration_count,
            state.max_iterations,
            target,
            cleared.len(),
            reason
        ));
        tracing::info!(
            workflow_id = %state.id,
            %target,
            iteration = state.iteration_count,
            "revision cascade applied"
        );
        Ok(())
    }
}
