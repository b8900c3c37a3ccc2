//! Typed per-stage artifacts and the artifact set carried by a run.
//!
//! Each stage produces exactly one artifact type. The [`ArtifactSet`]
//! enforces the dependency invariant on insert: an artifact may only be
//! stored once all of its stage's dependencies are present. Re-inserting an
//! artifact for a stage replaces the previous one (producers are idempotent
//! replace, not append).

use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;
use crate::stage::Stage;
use crate::state::ProjectRequirements;

/// The narrative foundation of a project: what the space is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptBrief {
    pub title: String,
    pub narrative: String,
    #[serde(default)]
    pub themes: Vec<String>,
}

/// A named zone within the spatial plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub area_sqm: f64,
    pub purpose: String,
}

/// Zoning and circulation for the project space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialPlan {
    pub zones: Vec<Zone>,
    pub circulation_notes: String,
}

impl SpatialPlan {
    /// Total planned area across all zones.
    pub fn total_area_sqm(&self) -> f64 {
        self.zones.iter().map(|z| z.area_sqm).sum()
    }
}

/// Look and feel: palette, materials, lighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDesign {
    pub mood: String,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    pub lighting: String,
}

/// A single interactive installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub name: String,
    pub description: String,
    pub technology: String,
}

/// Interactive programming for the space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractivePlan {
    pub installations: Vec<Installation>,
    pub visitor_journey: String,
}

/// One budget line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub category: String,
    pub amount: u64,
}

/// Cost estimate reconciled against all prior artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEstimate {
    pub line_items: Vec<LineItem>,
    /// Reserve on top of the line items.
    pub contingency: u64,
}

impl BudgetEstimate {
    /// Sum of the line items, excluding contingency.
    pub fn subtotal(&self) -> u64 {
        self.line_items.iter().map(|item| item.amount).sum()
    }

    /// Subtotal plus contingency.
    pub fn total(&self) -> u64 {
        self.subtotal() + self.contingency
    }

    /// Whether the estimate fits the client's stated budget.
    pub fn within_requirements(&self, requirements: &ProjectRequirements) -> bool {
        self.total() <= requirements.total_budget
    }
}

/// The structured output of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Artifact {
    Concept(ConceptBrief),
    Spatial(SpatialPlan),
    Visual(VisualDesign),
    Interactive(InteractivePlan),
    Budget(BudgetEstimate),
}

impl Artifact {
    /// The stage this artifact belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Artifact::Concept(_) => Stage::Concept,
            Artifact::Spatial(_) => Stage::Spatial,
            Artifact::Visual(_) => Stage::Visual,
            Artifact::Interactive(_) => Stage::Interactive,
            Artifact::Budget(_) => Stage::Budget,
        }
    }
}

/// Per-stage artifact slots for one workflow run.
///
/// Invariant: an artifact for stage S is present only if all of S's declared
/// dependencies are present. `insert` rejects violations; `clear_cascade`
/// removes downstream artifacts together with their target so the invariant
/// is preserved by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    concept: Option<ConceptBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spatial: Option<SpatialPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visual: Option<VisualDesign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interactive: Option<InteractivePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetEstimate>,
}

impl ArtifactSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an artifact is present for the given stage.
    pub fn contains(&self, stage: Stage) -> bool {
        match stage {
            Stage::Concept => self.concept.is_some(),
            Stage::Spatial => self.spatial.is_some(),
            Stage::Visual => self.visual.is_some(),
            Stage::Interactive => self.interactive.is_some(),
            Stage::Budget => self.budget.is_some(),
        }
    }

    /// Store an artifact, replacing any previous one for the same stage.
    ///
    /// Fails with a state-integrity error if a dependency of the artifact's
    /// stage is missing.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), WorkflowError> {
        let stage = artifact.stage();
        for dep in stage.dependencies() {
            if !self.contains(*dep) {
                return Err(WorkflowError::StateIntegrity(format!(
                    "Cannot store {} artifact: dependency {} is absent",
                    stage, dep
                )));
            }
        }
        match artifact {
            Artifact::Concept(a) => self.concept = Some(a),
            Artifact::Spatial(a) => self.spatial = Some(a),
            Artifact::Visual(a) => self.visual = Some(a),
            Artifact::Interactive(a) => self.interactive = Some(a),
            Artifact::Budget(a) => self.budget = Some(a),
        }
        Ok(())
    }

    /// Remove the artifacts for every stage in the cascade.
    pub fn clear_cascade(&mut self, stages: &[Stage]) {
        for stage in stages {
            match stage {
                Stage::Concept => self.concept = None,
                Stage::Spatial => self.spatial = None,
                Stage::Visual => self.visual = None,
                Stage::Interactive => self.interactive = None,
                Stage::Budget => self.budget = None,
            }
        }
    }

    /// Stages that currently have an artifact, in dependency order.
    pub fn present_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.contains(*s))
            .collect()
    }

    /// Stages still missing an artifact, in dependency order.
    pub fn missing_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| !self.contains(*s))
            .collect()
    }

    /// Whether all five artifacts are present.
    pub fn is_complete(&self) -> bool {
        self.missing_stages().is_empty()
    }

    pub fn concept(&self) -> Option<&ConceptBrief> {
        self.concept.as_ref()
    }

    pub fn spatial(&self) -> Option<&SpatialPlan> {
        self.spatial.as_ref()
    }

    pub fn visual(&self) -> Option<&VisualDesign> {
        self.visual.as_ref()
    }

    pub fn interactive(&self) -> Option<&InteractivePlan> {
        self.interactive.as_ref()
    }

    pub fn budget(&self) -> Option<&BudgetEstimate> {
        self.budget.as_ref()
    }
}
