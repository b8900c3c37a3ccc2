//! Quality evaluation: the scoring record and the gate seam.
//!
//! The gate only reports. It scores the current artifacts, names a candidate
//! revision target, and hands the record back; the finalize-vs-revise call
//! belongs to the [revision controller](crate::revision::RevisionController).
//!
//! The threshold bands are part of the orchestration contract, not tunables:
//! an overall score at or above [`ACCEPT_THRESHOLD`] must come with no
//! target, and a score below [`REVISE_FLOOR`] must name a real stage.
//! [`QualityEvaluation::check_policy`] rejects out-of-policy records before
//! they reach the controller.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;
use crate::stage::{RevisionTarget, Stage};
use crate::state::WorkflowState;

/// Overall score at or above this is an unconditional accept.
pub const ACCEPT_THRESHOLD: f64 = 0.85;

/// Overall score below this must name a revision target.
pub const REVISE_FLOOR: f64 = 0.6;

/// One score per artifact dimension, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub concept: f64,
    pub spatial: f64,
    pub visual: f64,
    pub interactive: f64,
    pub budget: f64,
}

impl DimensionScores {
    /// All five dimensions set to the same value.
    pub fn uniform(score: f64) -> Self {
        Self {
            concept: score,
            spatial: score,
            visual: score,
            interactive: score,
            budget: score,
        }
    }

    /// The score for a single stage's dimension.
    pub fn score_for(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Concept => self.concept,
            Stage::Spatial => self.spatial,
            Stage::Visual => self.visual,
            Stage::Interactive => self.interactive,
            Stage::Budget => self.budget,
        }
    }

    /// Unweighted mean across the five dimensions.
    pub fn mean(&self) -> f64 {
        (self.concept + self.spatial + self.visual + self.interactive + self.budget) / 5.0
    }

    fn all_in_unit_range(&self) -> bool {
        Stage::ALL
            .into_iter()
            .all(|s| (0.0..=1.0).contains(&self.score_for(s)))
    }
}

/// The gate's report for one pass over the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvaluation {
    pub scores: DimensionScores,
    pub overall_score: f64,
    /// Free-text rationale; becomes the revision reason when the controller
    /// loops back.
    pub feedback: String,
    /// `None` means accept; a target names the stage to redo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_target: Option<RevisionTarget>,
    pub evaluated_at: DateTime<Utc>,
}

impl QualityEvaluation {
    pub fn new(scores: DimensionScores, overall_score: f64, feedback: &str) -> Self {
        Self {
            scores,
            overall_score,
            feedback: feedback.to_string(),
            revision_target: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: RevisionTarget) -> Self {
        self.revision_target = Some(target);
        self
    }

    /// Whether the overall score clears the unconditional accept band.
    pub fn accepts(&self) -> bool {
        self.overall_score >= ACCEPT_THRESHOLD
    }

    /// Whether the overall score is low enough that revision is mandatory.
    pub fn demands_revision(&self) -> bool {
        self.overall_score < REVISE_FLOOR
    }

    /// Reject a record that violates the scoring contract before any state
    /// is mutated from it.
    pub fn check_policy(&self) -> Result<(), WorkflowError> {
        if !(0.0..=1.0).contains(&self.overall_score) {
            return Err(WorkflowError::EvaluationPolicy(format!(
                "overall score {} outside [0, 1]",
                self.overall_score
            )));
        }
        if !self.scores.all_in_unit_range() {
            return Err(WorkflowError::EvaluationPolicy(
                "one or more dimension scores outside [0, 1]".to_string(),
            ));
        }
        if self.accepts() && self.revision_target.is_some() {
            return Err(WorkflowError::EvaluationPolicy(format!(
                "score {} clears the accept threshold but a revision target was named",
                self.overall_score
            )));
        }
        if self.demands_revision() && self.revision_target.is_none() {
            return Err(WorkflowError::EvaluationPolicy(format!(
                "score {} is below the revision floor but no target was named",
                self.overall_score
            )));
        }
        Ok(())
    }
}

/// Scores the current artifacts and names a candidate revision target.
///
/// Implementations typically consult a language model; the engine only
/// requires that the returned record satisfies
/// [`QualityEvaluation::check_policy`]. A gate error is fatal to the current
/// run, the same as a producer failure.
#[async_trait]
pub trait QualityGate: Send + Sync {
    async fn evaluate(&self, state: &WorkflowState) -> Result<QualityEvaluation>;
}
