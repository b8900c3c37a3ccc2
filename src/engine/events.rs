//! Progress events emitted during a run.
//!
//! Events are fire-and-forget: they go out on an optional channel for an
//! external reporting surface and never affect control flow. A full or
//! closed channel drops the event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::stage::{RevisionTarget, Stage};

/// Events observers can subscribe to via
/// [`WorkflowEngine::with_event_channel`](super::WorkflowEngine::with_event_channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A producer has been invoked.
    StageStarted {
        workflow_id: Uuid,
        stage: Stage,
        iteration: u32,
    },
    /// A producer returned and its artifact was committed.
    StageCompleted {
        workflow_id: Uuid,
        stage: Stage,
        iteration: u32,
    },
    /// The quality gate scored the current artifacts.
    QualityScored {
        workflow_id: Uuid,
        overall_score: f64,
        revision_target: Option<RevisionTarget>,
    },
    /// The run suspended for an external decision.
    WaitingForHuman {
        workflow_id: Uuid,
        overall_score: f64,
    },
    /// A revision cascade was applied.
    IterationAdvanced {
        workflow_id: Uuid,
        iteration: u32,
        target: RevisionTarget,
    },
    /// The run finalized.
    RunCompleted {
        workflow_id: Uuid,
        iterations: u32,
    },
    /// A producer or the gate failed; the run is terminal.
    RunFailed {
        workflow_id: Uuid,
        stage: Option<Stage>,
        message: String,
    },
}

/// Best-effort event emitter held by the engine.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl EventSink {
    pub(crate) fn disabled() -> Self {
        Self { tx: None }
    }

    pub(crate) fn to_channel(tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emit an event if a channel is attached. Delivery failures are
    /// swallowed: observation never affects control flow.
    pub(crate) async fn emit(&self, event: WorkflowEvent) {
        if let Some(ref tx) = self.tx {
            tx.send(event).await.ok();
        }
    }
}
