//! The workflow engine: stage loop, parallel join, quality gate wiring, and
//! the human checkpoint.
//!
//! One engine drives one run at a time. `run` executes stages in the fixed
//! dependency order, skipping any stage whose artifact is already present,
//! so a resumed or rewound state never re-does unaffected work. The
//! visual/interactive pair executes concurrently behind a strict barrier:
//! both branches settle before either result is inspected, and a failure in
//! either branch discards the other's output.
//!
//! Suspension at the human checkpoint is a plain return — the caller
//! persists the returned state and later calls `resume` with a decision.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::artifacts::Artifact;
use crate::checkpoint::{self, HumanDecision, ResumeRequest};
use crate::config::RunOptions;
use crate::engine::events::{EventSink, WorkflowEvent};
use crate::errors::WorkflowError;
use crate::producer::{ProducerRegistry, RevisionHint};
use crate::quality::QualityGate;
use crate::revision::{Disposition, FinalizeReason, RevisionController};
use crate::stage::{RevisionTarget, Stage};
use crate::state::{ProjectRequirements, WorkflowPhase, WorkflowState};

/// How a `run`/`resume` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run finalized; the state is terminal.
    Completed,
    /// The run is waiting for a human decision; persist the state and call
    /// [`WorkflowEngine::resume`] later.
    Suspended,
}

impl RunOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended)
    }
}

/// Where a revise decision routed.
enum DecisionRoute {
    Finalize(FinalizeReason),
    Revise {
        target: RevisionTarget,
        reason: String,
    },
}

/// Drives one workflow at a time through the stage graph.
pub struct WorkflowEngine {
    producers: ProducerRegistry,
    gate: Arc<dyn QualityGate>,
    events: EventSink,
    /// Single-writer guard: overlapping `run`/`resume` calls fail fast
    /// instead of racing on the same state.
    run_guard: Mutex<()>,
}

impl WorkflowEngine {
    pub fn new(producers: ProducerRegistry, gate: Arc<dyn QualityGate>) -> Self {
        Self {
            producers,
            gate,
            events: EventSink::disabled(),
            run_guard: Mutex::new(()),
        }
    }

    /// Attach a progress event channel. Delivery is best-effort and never
    /// affects control flow.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.events = EventSink::to_channel(tx);
        self
    }

    /// Validate the requirements and build the initial state for a fresh
    /// run. Rejects before creating anything if a stage lacks a producer.
    pub fn start(
        &self,
        requirements: ProjectRequirements,
        options: RunOptions,
    ) -> Result<WorkflowState, WorkflowError> {
        self.producers.ensure_complete()?;
        let mut state = WorkflowState::new(requirements, &options)?;
        state.log(format!(
            "Workflow created for project '{}' (auto_approve={}, max_iterations={})",
            state.requirements.name, state.auto_approve, state.max_iterations
        ));
        tracing::info!(workflow_id = %state.id, "workflow started");
        Ok(state)
    }

    /// Execute the pipeline from wherever the supplied state left off.
    ///
    /// Entry selection: a state carrying an unapplied human decision (with
    /// `waiting_for_human` already cleared by the caller) enters at the
    /// decision-handling node; anything else enters the stage loop.
    pub async fn run(&self, state: &mut WorkflowState) -> Result<RunOutcome, WorkflowError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| WorkflowError::RunInFlight)?;
        self.run_locked(state).await
    }

    async fn run_locked(&self, state: &mut WorkflowState) -> Result<RunOutcome, WorkflowError> {
        match state.phase {
            WorkflowPhase::Done => {
                tracing::debug!(workflow_id = %state.id, "run called on a finished workflow");
                return Ok(RunOutcome::Completed);
            }
            WorkflowPhase::Failed => return Err(WorkflowError::AlreadyFailed),
            _ => {}
        }
        if state.waiting_for_human {
            return Err(WorkflowError::AwaitingDecision);
        }
        state.revision += 1;

        if let Some(decision) = state.human_decision {
            match self.route_decision(state, decision, None) {
                DecisionRoute::Finalize(reason) => {
                    self.finalize(state, reason).await;
                    return Ok(RunOutcome::Completed);
                }
                DecisionRoute::Revise { target, reason } => {
                    self.begin_revision(state, target, &reason).await?;
                }
            }
        }

        self.drive_pipeline(state).await
    }

    /// Apply an external decision to a suspended run and continue from the
    /// stage it routes to.
    pub async fn resume(
        &self,
        state: &mut WorkflowState,
        request: ResumeRequest,
    ) -> Result<RunOutcome, WorkflowError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| WorkflowError::RunInFlight)?;

        checkpoint::validate_resume(state)?;
        state.revision += 1;
        state.human_decision = Some(request.decision);
        state.human_feedback = request.feedback.clone();
        state.waiting_for_human = false;
        state.log(format!("Reviewer decision: {}", request.decision));
        tracing::info!(workflow_id = %state.id, decision = %request.decision, "resuming workflow");

        match self.route_decision(state, request.decision, request.explicit_target) {
            DecisionRoute::Finalize(reason) => {
                self.finalize(state, reason).await;
                Ok(RunOutcome::Completed)
            }
            DecisionRoute::Revise { target, reason } => {
                self.begin_revision(state, target, &reason).await?;
                self.drive_pipeline(state).await
            }
        }
    }

    /// Map a decision to its route. Revise decisions are refused once the
    /// iteration bound is reached and fold into finalize instead.
    fn route_decision(
        &self,
        state: &mut WorkflowState,
        decision: HumanDecision,
        explicit_target: Option<RevisionTarget>,
    ) -> DecisionRoute {
        match decision {
            HumanDecision::Approve => DecisionRoute::Finalize(FinalizeReason::HumanApproved),
            HumanDecision::Reject => {
                // Accept-as-is: the recorded decision keeps rejection
                // distinguishable from approval for downstream consumers.
                state.log("Rejection recorded; finalizing with current artifacts");
                DecisionRoute::Finalize(FinalizeReason::HumanRejected)
            }
            HumanDecision::Revise => {
                if state.at_iteration_bound() {
                    state.log(format!(
                        "Revise refused: iteration bound {} reached",
                        state.max_iterations
                    ));
                    return DecisionRoute::Finalize(FinalizeReason::IterationsExhausted);
                }
                let target = checkpoint::resolve_revision_target(state, explicit_target);
                let reason = state
                    .human_feedback
                    .clone()
                    .or_else(|| state.quality.as_ref().map(|q| q.feedback.clone()))
                    .unwrap_or_else(|| "revision requested by reviewer".to_string());
                DecisionRoute::Revise { target, reason }
            }
        }
    }

    /// Apply a revision cascade and mark the state as revising.
    async fn begin_revision(
        &self,
        state: &mut WorkflowState,
        target: RevisionTarget,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        let human_feedback = state.human_feedback.clone();
        RevisionController::apply_revision(state, target, reason, human_feedback)?;
        state.phase = WorkflowPhase::Revising { target };
        self.events
            .emit(WorkflowEvent::IterationAdvanced {
                workflow_id: state.id,
                iteration: state.iteration_count,
                target,
            })
            .await;
        Ok(())
    }

    /// The main loop: produce missing artifacts, score them, then finalize,
    /// revise, or suspend.
    ///
    /// In human-in-loop mode the checkpoint wraps the gate itself: anything
    /// short of an outright accept suspends for review, and the revision
    /// controller only runs once a decision arrives. An accepting score
    /// finalizes directly in either mode — it never suspends.
    async fn drive_pipeline(
        &self,
        state: &mut WorkflowState,
    ) -> Result<RunOutcome, WorkflowError> {
        loop {
            self.execute_missing_stages(state).await?;

            let evaluation = match self.gate.evaluate(state).await {
                Ok(eval) => eval,
                Err(e) => return Err(self.fail_run(state, None, e.to_string()).await),
            };
            evaluation.check_policy()?;

            state.phase = WorkflowPhase::QualityReview;
            state.log(format!(
                "Quality review: overall {:.2}, target {}",
                evaluation.overall_score,
                evaluation
                    .revision_target
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ));
            self.events
                .emit(WorkflowEvent::QualityScored {
                    workflow_id: state.id,
                    overall_score: evaluation.overall_score,
                    revision_target: evaluation.revision_target,
                })
                .await;
            let accepted = evaluation.accepts();
            state.quality = Some(evaluation);

            if !state.auto_approve && !accepted {
                return Ok(self.suspend(state).await);
            }

            match RevisionController::decide(state)? {
                Disposition::Finalize { reason } => {
                    self.finalize(state, reason).await;
                    return Ok(RunOutcome::Completed);
                }
                Disposition::Revise { target, reason } => {
                    self.begin_revision(state, target, &reason).await?;
                }
            }
        }
    }

    /// Park the run for an external decision. Stale decision fields from a
    /// previous round are cleared so the next entry is unambiguous.
    async fn suspend(&self, state: &mut WorkflowState) -> RunOutcome {
        state.waiting_for_human = true;
        state.human_decision = None;
        state.human_feedback = None;
        state.phase = WorkflowPhase::WaitingForHuman;
        state.log("Waiting for reviewer decision");
        let overall = state
            .quality
            .as_ref()
            .map(|q| q.overall_score)
            .unwrap_or_default();
        self.events
            .emit(WorkflowEvent::WaitingForHuman {
                workflow_id: state.id,
                overall_score: overall,
            })
            .await;
        tracing::info!(workflow_id = %state.id, "workflow suspended for review");
        RunOutcome::Suspended
    }

    /// Run every stage whose artifact is missing, in dependency order.
    async fn execute_missing_stages(
        &self,
        state: &mut WorkflowState,
    ) -> Result<(), WorkflowError> {
        if !state.artifacts.contains(Stage::Concept) {
            self.run_stage(state, Stage::Concept, WorkflowPhase::ConceptRunning)
                .await?;
        }
        if !state.artifacts.contains(Stage::Spatial) {
            self.run_stage(state, Stage::Spatial, WorkflowPhase::SpatialRunning)
                .await?;
        }
        if !state.artifacts.contains(Stage::Visual) || !state.artifacts.contains(Stage::Interactive)
        {
            self.run_parallel_designs(state).await?;
        }
        if !state.artifacts.contains(Stage::Budget) {
            self.run_stage(state, Stage::Budget, WorkflowPhase::BudgetRunning)
                .await?;
        }
        Ok(())
    }

    /// Produce one sequential stage and commit its artifact.
    async fn run_stage(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        phase: WorkflowPhase,
    ) -> Result<(), WorkflowError> {
        let producer = self
            .producers
            .get(stage)
            .ok_or(WorkflowError::MissingProducer { stage })?;
        state.phase = phase;
        state.log(format!("Stage {} started", stage));
        self.events
            .emit(WorkflowEvent::StageStarted {
                workflow_id: state.id,
                stage,
                iteration: state.iteration_count,
            })
            .await;

        let hint = self.hint_for(state, stage);
        let artifact = match producer.produce(stage, state, hint.as_ref()).await {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail_run(state, Some(stage), e.to_string()).await),
        };
        self.commit_artifact(state, stage, artifact).await
    }

    /// The fan-out/fan-in node: produce the missing parallel branches
    /// concurrently and join with a strict barrier. Both branches settle
    /// before either result is inspected; on any failure the sibling's
    /// output is discarded and nothing is committed.
    async fn run_parallel_designs(
        &self,
        state: &mut WorkflowState,
    ) -> Result<(), WorkflowError> {
        let need_visual = !state.artifacts.contains(Stage::Visual);
        let need_interactive = !state.artifacts.contains(Stage::Interactive);

        let visual_producer = if need_visual {
            Some(self.producers.get(Stage::Visual).ok_or(
                WorkflowError::MissingProducer {
                    stage: Stage::Visual,
                },
            )?)
        } else {
            None
        };
        let interactive_producer = if need_interactive {
            Some(self.producers.get(Stage::Interactive).ok_or(
                WorkflowError::MissingProducer {
                    stage: Stage::Interactive,
                },
            )?)
        } else {
            None
        };

        state.phase = WorkflowPhase::ParallelRunning;
        state.log("Parallel design stages started");
        for stage in [Stage::Visual, Stage::Interactive] {
            if (stage == Stage::Visual && need_visual)
                || (stage == Stage::Interactive && need_interactive)
            {
                self.events
                    .emit(WorkflowEvent::StageStarted {
                        workflow_id: state.id,
                        stage,
                        iteration: state.iteration_count,
                    })
                    .await;
            }
        }

        let visual_hint = self.hint_for(state, Stage::Visual);
        let interactive_hint = self.hint_for(state, Stage::Interactive);
        let shared: &WorkflowState = state;
        let visual_branch = async {
            match visual_producer {
                Some(p) => Some(p.produce(Stage::Visual, shared, visual_hint.as_ref()).await),
                None => None,
            }
        };
        let interactive_branch = async {
            match interactive_producer {
                Some(p) => {
                    Some(
                        p.produce(Stage::Interactive, shared, interactive_hint.as_ref())
                            .await,
                    )
                }
                None => None,
            }
        };
        let (visual_result, interactive_result) = tokio::join!(visual_branch, interactive_branch);

        let visual_err = matches!(visual_result, Some(Err(_)));
        let interactive_err = matches!(interactive_result, Some(Err(_)));
        if visual_err || interactive_err {
            if visual_err && matches!(interactive_result, Some(Ok(_))) {
                state.log("Discarding interactive artifact: sibling visual stage failed");
            }
            if interactive_err && matches!(visual_result, Some(Ok(_))) {
                state.log("Discarding visual artifact: sibling interactive stage failed");
            }
            let (stage, message) = match (visual_result, interactive_result) {
                (Some(Err(v)), Some(Err(i))) => {
                    tracing::error!(workflow_id = %state.id, "both parallel branches failed: visual: {v}; interactive: {i}");
                    (Stage::Visual, v.to_string())
                }
                (Some(Err(v)), _) => (Stage::Visual, v.to_string()),
                (_, Some(Err(i))) => (Stage::Interactive, i.to_string()),
                _ => unreachable!("join failure with no failed branch"),
            };
            return Err(self.fail_run(state, Some(stage), message).await);
        }

        // Both branches succeeded: commit atomically, visual first.
        if let Some(Ok(artifact)) = visual_result {
            self.commit_artifact(state, Stage::Visual, artifact).await?;
        }
        if let Some(Ok(artifact)) = interactive_result {
            self.commit_artifact(state, Stage::Interactive, artifact)
                .await?;
        }
        Ok(())
    }

    /// Store a produced artifact, verifying it belongs to the stage that
    /// was asked for.
    async fn commit_artifact(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        artifact: Artifact,
    ) -> Result<(), WorkflowError> {
        if artifact.stage() != stage {
            let message = format!("returned a {} artifact", artifact.stage());
            return Err(self.fail_run(state, Some(stage), message).await);
        }
        state.artifacts.insert(artifact)?;
        state.log(format!("Stage {} completed", stage));
        self.events
            .emit(WorkflowEvent::StageCompleted {
                workflow_id: state.id,
                stage,
                iteration: state.iteration_count,
            })
            .await;
        Ok(())
    }

    /// The hint handed to producers re-running after a cascade.
    fn hint_for(&self, state: &WorkflowState, stage: Stage) -> Option<RevisionHint> {
        if !state.needs_revision {
            return None;
        }
        let target = state.last_revision_target?;
        if !target.invalidates(stage) {
            return None;
        }
        Some(RevisionHint {
            target,
            reason: state.revision_reason.clone().unwrap_or_default(),
            human_feedback: state.human_feedback.clone(),
            iteration: state.iteration_count,
        })
    }

    /// Mark the run terminally failed and build the error to propagate.
    async fn fail_run(
        &self,
        state: &mut WorkflowState,
        stage: Option<Stage>,
        message: String,
    ) -> WorkflowError {
        state.phase = WorkflowPhase::Failed;
        match stage {
            Some(s) => state.log(format!("Stage {} failed: {}", s, message)),
            None => state.log(format!("Quality gate failed: {}", message)),
        }
        tracing::error!(workflow_id = %state.id, ?stage, "run failed: {message}");
        self.events
            .emit(WorkflowEvent::RunFailed {
                workflow_id: state.id,
                stage,
                message: message.clone(),
            })
            .await;
        match stage {
            Some(stage) => WorkflowError::Producer { stage, message },
            None => WorkflowError::Evaluation { message },
        }
    }

    /// Close out the run.
    async fn finalize(&self, state: &mut WorkflowState, reason: FinalizeReason) {
        state.phase = WorkflowPhase::Finalizing;
        state.needs_revision = false;
        state.revision_reason = None;
        state.log(format!("Finalizing: {}", reason));
        state.phase = WorkflowPhase::Done;
        self.events
            .emit(WorkflowEvent::RunCompleted {
                workflow_id: state.id,
                iterations: state.iteration_count,
            })
            .await;
        tracing::info!(
            workflow_id = %state.id,
            iterations = state.iteration_count,
            %reason,
            "workflow finalized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{
        Artifact, BudgetEstimate, ConceptBrief, Installation, InteractivePlan, LineItem,
        SpatialPlan, VisualDesign, Zone,
    };
    use crate::producer::Producer;
    use crate::quality::{DimensionScores, QualityEvaluation};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    fn sample_artifact(stage: Stage) -> Artifact {
        match stage {
            Stage::Concept => Artifact::Concept(ConceptBrief {
                title: "Tides".to_string(),
                narrative: "coastal story".to_string(),
                themes: vec!["water".to_string()],
            }),
            Stage::Spatial => Artifact::Spatial(SpatialPlan {
                zones: vec![Zone {
                    name: "Main".to_string(),
                    area_sqm: 200.0,
                    purpose: "exhibit".to_string(),
                }],
                circulation_notes: "loop".to_string(),
            }),
            Stage::Visual => Artifact::Visual(VisualDesign {
                mood: "calm".to_string(),
                palette: vec!["blue".to_string()],
                materials: vec!["oak".to_string()],
                lighting: "ambient".to_string(),
            }),
            Stage::Interactive => Artifact::Interactive(InteractivePlan {
                installations: vec![Installation {
                    name: "Tide table".to_string(),
                    description: "projection".to_string(),
                    technology: "projector".to_string(),
                }],
                visitor_journey: "entry to hall".to_string(),
            }),
            Stage::Budget => Artifact::Budget(BudgetEstimate {
                line_items: vec![LineItem {
                    category: "fabrication".to_string(),
                    amount: 300_000,
                }],
                contingency: 30_000,
            }),
        }
    }

    struct StubProducer;

    #[async_trait]
    impl Producer for StubProducer {
        async fn produce(
            &self,
            stage: Stage,
            _state: &WorkflowState,
            _hint: Option<&RevisionHint>,
        ) -> Result<Artifact> {
            Ok(sample_artifact(stage))
        }
    }

    struct ScriptedGate {
        evaluations: StdMutex<VecDeque<QualityEvaluation>>,
    }

    impl ScriptedGate {
        fn accepting() -> Self {
            Self::with_script(vec![QualityEvaluation::new(
                DimensionScores::uniform(0.9),
                0.9,
                "strong across the board",
            )])
        }

        fn with_script(evaluations: Vec<QualityEvaluation>) -> Self {
            Self {
                evaluations: StdMutex::new(evaluations.into()),
            }
        }
    }

    #[async_trait]
    impl QualityGate for ScriptedGate {
        async fn evaluate(&self, _state: &WorkflowState) -> Result<QualityEvaluation> {
            self.evaluations
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("gate script exhausted"))
        }
    }

    fn full_registry() -> ProducerRegistry {
        let producer: Arc<dyn Producer> = Arc::new(StubProducer);
        let mut registry = ProducerRegistry::new();
        for stage in Stage::ALL {
            registry.register(stage, producer.clone());
        }
        registry
    }

    fn requirements() -> ProjectRequirements {
        ProjectRequirements::new("Harbor Museum", "maritime exhibit", 500_000)
    }

    #[tokio::test]
    async fn test_happy_path_completes() {
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(state.is_terminal());
        assert!(state.artifacts.is_complete());
        assert_eq!(state.iteration_count, 0);
    }

    #[tokio::test]
    async fn test_start_rejects_incomplete_registry() {
        let producer: Arc<dyn Producer> = Arc::new(StubProducer);
        let registry = ProducerRegistry::new().with(Stage::Concept, producer);
        let engine = WorkflowEngine::new(registry, Arc::new(ScriptedGate::accepting()));
        let err = engine
            .start(requirements(), RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingProducer { .. }));
    }

    #[tokio::test]
    async fn test_run_on_done_state_is_a_noop() {
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        engine.run(&mut state).await.unwrap();
        let messages_before = state.messages.len();
        // The accepting gate's script is exhausted: completing again must
        // not re-enter the pipeline at all.
        let outcome = engine.run(&mut state).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(state.messages.len(), messages_before);
    }

    #[tokio::test]
    async fn test_run_on_failed_state_is_rejected() {
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        state.phase = WorkflowPhase::Failed;
        assert!(matches!(
            engine.run(&mut state).await,
            Err(WorkflowError::AlreadyFailed)
        ));
    }

    #[tokio::test]
    async fn test_run_on_waiting_state_is_rejected() {
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        state.waiting_for_human = true;
        assert!(matches!(
            engine.run(&mut state).await,
            Err(WorkflowError::AwaitingDecision)
        ));
    }

    #[tokio::test]
    async fn test_human_mode_suspends_and_clears_stale_decision() {
        let gate = ScriptedGate::with_script(vec![
            QualityEvaluation::new(DimensionScores::uniform(0.5), 0.5, "weak concept")
                .with_target(RevisionTarget::Concept),
        ]);
        let engine = WorkflowEngine::new(full_registry(), Arc::new(gate));
        let mut state = engine
            .start(requirements(), RunOptions::human_in_loop(3))
            .unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert_eq!(outcome, RunOutcome::Suspended);
        assert!(state.waiting_for_human);
        assert_eq!(state.phase, WorkflowPhase::WaitingForHuman);
        assert!(state.human_decision.is_none());
        assert!(state.human_feedback.is_none());
    }

    #[tokio::test]
    async fn test_run_enters_at_decision_node_for_unapplied_decision() {
        let gate = ScriptedGate::with_script(vec![
            QualityEvaluation::new(DimensionScores::uniform(0.5), 0.5, "weak")
                .with_target(RevisionTarget::Budget),
        ]);
        let engine = WorkflowEngine::new(full_registry(), Arc::new(gate));
        let mut state = engine
            .start(requirements(), RunOptions::human_in_loop(3))
            .unwrap();
        engine.run(&mut state).await.unwrap();

        // A caller applied a decision out-of-band and cleared the waiting
        // flag; run must route through the decision node, not the stages.
        state.human_decision = Some(HumanDecision::Approve);
        state.waiting_for_human = false;
        let outcome = engine.run(&mut state).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(state.is_terminal());
        assert_eq!(state.iteration_count, 0);
    }

    #[tokio::test]
    async fn test_resume_requires_waiting_state() {
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        let err = engine
            .resume(&mut state, ResumeRequest::approve())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotWaiting));
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_refused() {
        struct BlockingProducer {
            release: tokio::sync::Notify,
        }

        #[async_trait]
        impl Producer for BlockingProducer {
            async fn produce(
                &self,
                stage: Stage,
                _state: &WorkflowState,
                _hint: Option<&RevisionHint>,
            ) -> Result<Artifact> {
                self.release.notified().await;
                Ok(sample_artifact(stage))
            }
        }

        let blocking = Arc::new(BlockingProducer {
            release: tokio::sync::Notify::new(),
        });
        let mut registry = ProducerRegistry::new();
        for stage in Stage::ALL {
            registry.register(stage, blocking.clone());
        }
        let engine = Arc::new(WorkflowEngine::new(
            registry,
            Arc::new(ScriptedGate::accepting()),
        ));
        let mut first = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        let mut second = engine.start(requirements(), RunOptions::auto(3)).unwrap();

        let engine_clone = engine.clone();
        let first_run = tokio::spawn(async move { engine_clone.run(&mut first).await });
        tokio::task::yield_now().await;

        let err = engine.run(&mut second).await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunInFlight));

        // Unblock every stage the first run will pass through.
        for _ in 0..8 {
            blocking.release.notify_waiters();
            tokio::task::yield_now().await;
        }
        let outcome = first_run.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_gate_failure_fails_the_run() {
        let gate = ScriptedGate::with_script(vec![]);
        let engine = WorkflowEngine::new(full_registry(), Arc::new(gate));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        let err = engine.run(&mut state).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Evaluation { .. }));
        assert_eq!(state.phase, WorkflowPhase::Failed);
    }

    #[tokio::test]
    async fn test_out_of_policy_evaluation_is_rejected() {
        let gate = ScriptedGate::with_script(vec![
            // Accept-band score with a named target violates the contract.
            QualityEvaluation::new(DimensionScores::uniform(0.9), 0.9, "confused")
                .with_target(RevisionTarget::Budget),
        ]);
        let engine = WorkflowEngine::new(full_registry(), Arc::new(gate));
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        let err = engine.run(&mut state).await.unwrap_err();
        assert!(matches!(err, WorkflowError::EvaluationPolicy(_)));
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let engine = WorkflowEngine::new(full_registry(), Arc::new(ScriptedGate::accepting()))
            .with_event_channel(tx);
        let mut state = engine.start(requirements(), RunOptions::auto(3)).unwrap();
        engine.run(&mut state).await.unwrap();
        drop(engine);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(WorkflowEvent::StageStarted {
                stage: Stage::Concept,
                ..
            })
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::QualityScored { .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunCompleted { .. })
        ));
    }
}
