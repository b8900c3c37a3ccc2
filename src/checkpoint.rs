//! Human checkpoint types: decisions, resume requests, and the resume
//! precondition.
//!
//! When a run is not auto-approved, the engine suspends after the quality
//! gate instead of looping back on its own. Suspension is a plain return —
//! nothing keeps executing — so the caller persists the state externally
//! and later presents a decision through a [`ResumeRequest`]. Decision
//! strings arriving from a transport layer are validated here, at the
//! boundary, so an unrecognized value is a handled error before any state
//! is touched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::WorkflowError;
use crate::stage::RevisionTarget;
use crate::state::WorkflowState;

/// Fallback target when a revise decision arrives with no explicit target
/// and the gate named none. Never applied silently: the engine logs a
/// warning whenever it falls back here.
pub const DEFAULT_REVISION_TARGET: RevisionTarget = RevisionTarget::Concept;

/// The external reviewer's decision on a suspended run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanDecision {
    /// Accept the current artifacts and finalize.
    Approve,
    /// Loop back to a stage and redo it.
    Revise,
    /// Decline further rework; the run finalizes with the current artifacts
    /// and the recorded decision distinguishes it from an approval.
    Reject,
}

impl fmt::Display for HumanDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HumanDecision::Approve => "approve",
            HumanDecision::Revise => "revise",
            HumanDecision::Reject => "reject",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for HumanDecision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(HumanDecision::Approve),
            "revise" => Ok(HumanDecision::Revise),
            "reject" => Ok(HumanDecision::Reject),
            _ => Err(WorkflowError::InvalidDecision {
                value: s.to_string(),
            }),
        }
    }
}

/// Everything a caller supplies when resuming a suspended run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub decision: HumanDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Overrides the gate's own revision target when the decision is
    /// `Revise`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_target: Option<RevisionTarget>,
}

impl ResumeRequest {
    pub fn approve() -> Self {
        Self {
            decision: HumanDecision::Approve,
            feedback: None,
            explicit_target: None,
        }
    }

    pub fn revise() -> Self {
        Self {
            decision: HumanDecision::Revise,
            feedback: None,
            explicit_target: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            decision: HumanDecision::Reject,
            feedback: None,
            explicit_target: None,
        }
    }

    /// Build from raw transport strings, validating the decision value.
    pub fn parse(decision: &str, feedback: Option<&str>, target: Option<&str>) -> Result<Self, WorkflowError> {
        let decision = decision.parse()?;
        let explicit_target = match target {
            Some(t) => Some(t.parse()?),
            None => None,
        };
        Ok(Self {
            decision,
            feedback: feedback.map(|f| f.to_string()),
            explicit_target,
        })
    }

    pub fn with_feedback(mut self, feedback: &str) -> Self {
        self.feedback = Some(feedback.to_string());
        self
    }

    pub fn with_target(mut self, target: RevisionTarget) -> Self {
        self.explicit_target = Some(target);
        self
    }
}

/// The full resume precondition: the state must be waiting, and must still
/// carry everything decision routing depends on.
pub fn validate_resume(state: &WorkflowState) -> Result<(), WorkflowError> {
    state.ensure_waiting()?;
    state.ensure_integrity()?;
    Ok(())
}

/// Resolve the stage a revise decision loops back to: the explicit override
/// wins, then the gate's own target, then the logged default.
pub fn resolve_revision_target(
    state: &WorkflowState,
    explicit: Option<RevisionTarget>,
) -> RevisionTarget {
    if let Some(target) = explicit {
        return target;
    }
    if let Some(target) = state.quality.as_ref().and_then(|q| q.revision_target) {
        return target;
    }
    tracing::warn!(
        workflow_id = %state.id,
        fallback = %DEFAULT_REVISION_TARGET,
        "revise decision carried no target and the gate named none; using the default"
    );
    DEFAULT_REVISION_TARGET
}
