//! The producer seam and the explicit producer registry.
//!
//! A producer is the pluggable generation step behind one stage: given the
//! current state (and a hint when the stage is being redone), it returns the
//! stage's artifact or fails. Producers must be safe to call repeatedly for
//! the same stage across iterations — the engine replaces the previous
//! artifact on every successful call.
//!
//! The registry is an ordinary value constructed once and handed to the
//! engine. There is no ambient lookup: a stage with no registered producer
//! is a handled error at start, not a runtime surprise mid-pipeline.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::artifacts::Artifact;
use crate::errors::WorkflowError;
use crate::stage::{RevisionTarget, Stage};
use crate::state::WorkflowState;

/// Context handed to a producer when its stage is being redone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionHint {
    /// The target of the cascade that cleared this stage.
    pub target: RevisionTarget,
    /// The gate's (or reviewer's) rationale for the rework.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    /// Iteration number this rework belongs to (1-based).
    pub iteration: u32,
}

/// One stage's generation step.
///
/// Errors are fatal to the current `run`/`resume` call; the engine performs
/// no retries.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(
        &self,
        stage: Stage,
        state: &WorkflowState,
        hint: Option<&RevisionHint>,
    ) -> Result<Artifact>;
}

/// Stage-to-producer table, constructed once and passed into the engine.
#[derive(Default, Clone)]
pub struct ProducerRegistry {
    producers: HashMap<Stage, Arc<dyn Producer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the producer for a stage, replacing any previous one.
    pub fn register(&mut self, stage: Stage, producer: Arc<dyn Producer>) {
        self.producers.insert(stage, producer);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, stage: Stage, producer: Arc<dyn Producer>) -> Self {
        self.register(stage, producer);
        self
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn Producer>> {
        self.producers.get(&stage).cloned()
    }

    /// Stages with a registered producer, in dependency order.
    pub fn registered(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.producers.contains_key(s))
            .collect()
    }

    /// Stages still missing a producer, in dependency order.
    pub fn missing(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| !self.producers.contains_key(s))
            .collect()
    }

    /// Fail fast if any stage lacks a producer.
    pub fn ensure_complete(&self) -> Result<(), WorkflowError> {
        match self.missing().first() {
            Some(stage) => Err(WorkflowError::MissingProducer { stage: *stage }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
