//! The workflow state: the single source of truth threading through a run.
//!
//! A [`WorkflowState`] is created once from the immutable
//! [`ProjectRequirements`], mutated in place by producers (one artifact per
//! stage), by the quality gate (evaluation record), by the revision
//! controller (cascade + iteration bookkeeping), and by the human checkpoint
//! (decision fields). It is fully serde-serializable so a suspended run can
//! be persisted externally for an arbitrary duration and resumed later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::artifacts::ArtifactSet;
use crate::checkpoint::HumanDecision;
use crate::config::RunOptions;
use crate::errors::WorkflowError;
use crate::quality::QualityEvaluation;
use crate::stage::RevisionTarget;

/// Immutable input describing the project. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRequirements {
    /// Client-facing project name.
    pub name: String,
    /// Free-text brief the concept stage works from.
    pub brief: String,
    /// Total client budget in whole currency units.
    pub total_budget: u64,
    #[serde(default)]
    pub style_preferences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ProjectRequirements {
    pub fn new(name: &str, brief: &str, total_budget: u64) -> Self {
        Self {
            name: name.to_string(),
            brief: brief.to_string(),
            total_budget,
            style_preferences: Vec::new(),
            target_audience: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style_preferences.push(style.to_string());
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.target_audience = Some(audience.to_string());
        self
    }

    pub fn with_constraint(mut self, constraint: &str) -> Self {
        self.constraints.push(constraint.to_string());
        self
    }

    /// Reject malformed requirements before any state is created.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::InvalidRequirements(
                "project name is empty".to_string(),
            ));
        }
        if self.brief.trim().is_empty() {
            return Err(WorkflowError::InvalidRequirements(
                "project brief is empty".to_string(),
            ));
        }
        if self.total_budget == 0 {
            return Err(WorkflowError::InvalidRequirements(
                "total budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The step label of the run's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WorkflowPhase {
    Init,
    ConceptRunning,
    SpatialRunning,
    ParallelRunning,
    BudgetRunning,
    QualityReview,
    WaitingForHuman,
    Revising { target: RevisionTarget },
    Finalizing,
    /// Terminal: all artifacts present, no revision pending.
    Done,
    /// Terminal: a producer failed; no recovery path.
    Failed,
}

impl WorkflowPhase {
    /// Whether no further execution can happen from this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Done | WorkflowPhase::Failed)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowPhase::Init => write!(f, "init"),
            WorkflowPhase::ConceptRunning => write!(f, "concept_running"),
            WorkflowPhase::SpatialRunning => write!(f, "spatial_running"),
            WorkflowPhase::ParallelRunning => write!(f, "parallel_running"),
            WorkflowPhase::BudgetRunning => write!(f, "budget_running"),
            WorkflowPhase::QualityReview => write!(f, "quality_review"),
            WorkflowPhase::WaitingForHuman => write!(f, "waiting_for_human"),
            WorkflowPhase::Revising { target } => write!(f, "revising_{}", target),
            WorkflowPhase::Finalizing => write!(f, "finalizing"),
            WorkflowPhase::Done => write!(f, "done"),
            WorkflowPhase::Failed => write!(f, "failed"),
        }
    }
}

/// One entry in the append-only message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// One accepted revision: the rationale log consumed by later producers and
/// by observers reconstructing how a design evolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Iteration number after this revision was applied (1-based).
    pub iteration: u32,
    pub target: RevisionTarget,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    pub at: DateTime<Utc>,
}

/// The run's single source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub requirements: ProjectRequirements,
    #[serde(default)]
    pub artifacts: ArtifactSet,
    pub phase: WorkflowPhase,
    /// Append-only; never truncated.
    #[serde(default)]
    pub messages: Vec<StateMessage>,
    /// Accepted revisions so far. Always `<= max_iterations`.
    pub iteration_count: u32,
    /// Fixed at run start.
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityEvaluation>,
    #[serde(default)]
    pub feedback_history: Vec<RevisionRecord>,
    pub needs_revision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_revision_target: Option<RevisionTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_decision: Option<HumanDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    pub waiting_for_human: bool,
    /// Fixed at run start; selects human-in-loop mode when false.
    pub auto_approve: bool,
    /// Bumped on every `run`/`resume`; lets a store adapter detect stale
    /// writes when two callers race on the same workflow id.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Build the initial state for a fresh run. Validates requirements
    /// before anything is created.
    pub fn new(
        requirements: ProjectRequirements,
        options: &RunOptions,
    ) -> Result<Self, WorkflowError> {
        requirements.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            requirements,
            artifacts: ArtifactSet::new(),
            phase: WorkflowPhase::Init,
            messages: Vec::new(),
            iteration_count: 0,
            max_iterations: options.max_iterations,
            quality: None,
            feedback_history: Vec::new(),
            needs_revision: false,
            revision_reason: None,
            last_revision_target: None,
            human_decision: None,
            human_feedback: None,
            waiting_for_human: false,
            auto_approve: options.auto_approve,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Append a timestamped entry to the message log.
    pub fn log(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(workflow_id = %self.id, "{}", text);
        self.messages.push(StateMessage {
            at: Utc::now(),
            text,
        });
        self.updated_at = Utc::now();
    }

    /// Whether the run has finished and is eligible for archival.
    pub fn is_terminal(&self) -> bool {
        self.phase == WorkflowPhase::Done
            && self.artifacts.is_complete()
            && !self.waiting_for_human
    }

    /// Whether the revision budget is spent.
    pub fn at_iteration_bound(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Revisions still available.
    pub fn iterations_remaining(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iteration_count)
    }

    /// Validation half of the resume precondition.
    pub fn ensure_waiting(&self) -> Result<(), WorkflowError> {
        if !self.waiting_for_human {
            return Err(WorkflowError::NotWaiting);
        }
        Ok(())
    }

    /// Integrity half of the resume precondition: a state round-tripped
    /// through external storage must still carry everything the decision
    /// routing depends on.
    pub fn ensure_integrity(&self) -> Result<(), WorkflowError> {
        if self.requirements.brief.trim().is_empty() {
            return Err(WorkflowError::StateIntegrity(
                "requirements brief is missing".to_string(),
            ));
        }
        if self.quality.is_none() {
            return Err(WorkflowError::StateIntegrity(
                "quality evaluation is missing from a suspended state".to_string(),
            ));
        }
        if self.iteration_count > self.max_iterations {
            return Err(WorkflowError::StateIntegrity(format!(
                "iteration count {} exceeds bound {}",
                self.iteration_count, self.max_iterations
            )));
        }
        Ok(())
    }
}
