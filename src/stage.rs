//! Stage identities, the fixed dependency table, and the revision cascade.
//!
//! The pipeline runs a fixed, closed set of stages. `concept` is the root;
//! `spatial`, `visual` and `interactive` each depend on it; `budget` joins
//! everything. `visual` and `interactive` are mutually independent and form
//! the single parallel group of the graph.
//!
//! Revision targets are a separate closed enum so that an unrecognized
//! target is a compile error rather than a silently defaulted string key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::WorkflowError;

/// One named unit of work in the pipeline.
///
/// Every stage turns the current workflow state into exactly one additional
/// artifact. The set is fixed; the orchestrator matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Design concept: the narrative foundation every other stage builds on.
    Concept,
    /// Spatial plan: zones, areas, circulation.
    Spatial,
    /// Visual design: palette, materials, lighting.
    Visual,
    /// Interactive plan: installations and visitor journey.
    Interactive,
    /// Budget estimate: line items reconciled against all prior artifacts.
    Budget,
}

impl Stage {
    /// All stages in dependency order. `Visual` and `Interactive` appear in
    /// declaration order but are independent of each other.
    pub const ALL: [Stage; 5] = [
        Stage::Concept,
        Stage::Spatial,
        Stage::Visual,
        Stage::Interactive,
        Stage::Budget,
    ];

    /// The two branches of the parallel group.
    pub const PARALLEL_GROUP: [Stage; 2] = [Stage::Visual, Stage::Interactive];

    /// Declared dependencies of this stage.
    ///
    /// An artifact for a stage may be present in a state only if all of the
    /// stage's dependencies are present (enforced by
    /// [`ArtifactSet::insert`](crate::artifacts::ArtifactSet::insert)).
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::Concept => &[],
            Stage::Spatial => &[Stage::Concept],
            Stage::Visual => &[Stage::Concept],
            Stage::Interactive => &[Stage::Concept],
            Stage::Budget => &[
                Stage::Concept,
                Stage::Spatial,
                Stage::Visual,
                Stage::Interactive,
            ],
        }
    }

    /// Whether this stage runs inside the parallel fan-out group.
    pub fn is_parallel_branch(&self) -> bool {
        matches!(self, Stage::Visual | Stage::Interactive)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Concept => "concept",
            Stage::Spatial => "spatial",
            Stage::Visual => "visual",
            Stage::Interactive => "interactive",
            Stage::Budget => "budget",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Stage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concept" => Ok(Stage::Concept),
            "spatial" => Ok(Stage::Spatial),
            "visual" => Ok(Stage::Visual),
            "interactive" => Ok(Stage::Interactive),
            "budget" => Ok(Stage::Budget),
            _ => Err(WorkflowError::InvalidStage {
                value: s.to_string(),
            }),
        }
    }
}

/// The stage (or group) named by a quality verdict or human decision as
/// needing rework.
///
/// `ParallelDesigns` addresses the visual/interactive pair as a unit; its
/// cascade is identical to targeting either branch individually, because the
/// two branches are regenerated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionTarget {
    Concept,
    Spatial,
    ParallelDesigns,
    Visual,
    Interactive,
    Budget,
}

impl RevisionTarget {
    /// The set of artifacts invalidated when this target is revised.
    ///
    /// Everything downstream of the target falls with it; upstream artifacts
    /// are preserved exactly.
    pub fn cascade(&self) -> &'static [Stage] {
        match self {
            RevisionTarget::Concept => &[
                Stage::Concept,
                Stage::Spatial,
                Stage::Visual,
                Stage::Interactive,
                Stage::Budget,
            ],
            RevisionTarget::Spatial => &[
                Stage::Spatial,
                Stage::Visual,
                Stage::Interactive,
                Stage::Budget,
            ],
            RevisionTarget::ParallelDesigns
            | RevisionTarget::Visual
            | RevisionTarget::Interactive => {
                &[Stage::Visual, Stage::Interactive, Stage::Budget]
            }
            RevisionTarget::Budget => &[Stage::Budget],
        }
    }

    /// The first stage re-executed after this target's cascade is applied.
    pub fn entry_stage(&self) -> Stage {
        self.cascade()[0]
    }

    /// Whether revising this target invalidates the given stage.
    pub fn invalidates(&self, stage: Stage) -> bool {
        self.cascade().contains(&stage)
    }
}

impl fmt::Display for RevisionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RevisionTarget::Concept => "concept",
            RevisionTarget::Spatial => "spatial",
            RevisionTarget::ParallelDesigns => "parallel_designs",
            RevisionTarget::Visual => "visual",
            RevisionTarget::Interactive => "interactive",
            RevisionTarget::Budget => "budget",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RevisionTarget {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concept" => Ok(RevisionTarget::Concept),
            "spatial" => Ok(RevisionTarget::Spatial),
            "parallel_designs" => Ok(RevisionTarget::ParallelDesigns),
            "visual" => Ok(RevisionTarget::Visual),
            "interactive" => Ok(RevisionTarget::Interactive),
            "budget" => Ok(RevisionTarget::Budget),
            _ => Err(WorkflowError::InvalidRevisionTarget {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_table() {
        assert!(Stage::Concept.dependencies().is_empty());
        assert_eq!(Stage::Spatial.dependencies(), &[Stage::Concept]);
        assert_eq!(Stage::Visual.dependencies(), &[Stage::Concept]);
        assert_eq!(Stage::Interactive.dependencies(), &[Stage::Concept]);
        assert_eq!(
            Stage::Budget.dependencies(),
            &[
                Stage::Concept,
                Stage::Spatial,
                Stage::Visual,
                Stage::Interactive
            ]
        );
    }

    #[test]
    fn test_parallel_branches() {
        assert!(Stage::Visual.is_parallel_branch());
        assert!(Stage::Interactive.is_parallel_branch());
        assert!(!Stage::Concept.is_parallel_branch());
        assert!(!Stage::Budget.is_parallel_branch());
    }

    #[test]
    fn test_cascade_concept_clears_everything() {
        assert_eq!(RevisionTarget::Concept.cascade(), &Stage::ALL);
    }

    #[test]
    fn test_cascade_spatial_preserves_concept() {
        let cascade = RevisionTarget::Spatial.cascade();
        assert!(!cascade.contains(&Stage::Concept));
        assert_eq!(
            cascade,
            &[
                Stage::Spatial,
                Stage::Visual,
                Stage::Interactive,
                Stage::Budget
            ]
        );
    }

    #[test]
    fn test_cascade_parallel_variants_are_identical() {
        assert_eq!(
            RevisionTarget::ParallelDesigns.cascade(),
            RevisionTarget::Visual.cascade()
        );
        assert_eq!(
            RevisionTarget::Visual.cascade(),
            RevisionTarget::Interactive.cascade()
        );
    }

    #[test]
    fn test_cascade_budget_is_minimal() {
        assert_eq!(RevisionTarget::Budget.cascade(), &[Stage::Budget]);
    }

    #[test]
    fn test_entry_stage() {
        assert_eq!(RevisionTarget::Concept.entry_stage(), Stage::Concept);
        assert_eq!(RevisionTarget::Spatial.entry_stage(), Stage::Spatial);
        assert_eq!(RevisionTarget::ParallelDesigns.entry_stage(), Stage::Visual);
        assert_eq!(RevisionTarget::Budget.entry_stage(), Stage::Budget);
    }

    #[test]
    fn test_stage_from_str_round_trip() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert!("unknown".parse::<Stage>().is_err());
    }

    #[test]
    fn test_revision_target_from_str() {
        assert_eq!(
            "parallel_designs".parse::<RevisionTarget>().unwrap(),
            RevisionTarget::ParallelDesigns
        );
        assert!("none".parse::<RevisionTarget>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&RevisionTarget::ParallelDesigns).unwrap();
        assert_eq!(json, "\"parallel_designs\"");
        let json = serde_json::to_string(&Stage::Interactive).unwrap();
        assert_eq!(json, "\"interactive\"");
    }
}
