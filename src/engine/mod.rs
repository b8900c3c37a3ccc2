//! The task graph orchestrator.
//!
//! This module drives a workflow through the fixed stage graph:
//!
//! 1. **Runner** — stage loop, parallel fan-out/fan-in, quality gate wiring,
//!    suspend/resume at the human checkpoint
//! 2. **Events** — fire-and-forget progress reporting for observers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use atelier::config::RunOptions;
//! use atelier::engine::{RunOutcome, WorkflowEngine};
//! use atelier::producer::ProducerRegistry;
//! use atelier::state::ProjectRequirements;
//!
//! # async fn example(
//! #     registry: ProducerRegistry,
//! #     gate: Arc<dyn atelier::quality::QualityGate>,
//! # ) -> anyhow::Result<()> {
//! let engine = WorkflowEngine::new(registry, gate);
//! let requirements = ProjectRequirements::new("Harbor Museum", "maritime exhibit", 500_000);
//! let mut state = engine.start(requirements, RunOptions::human_in_loop(3))?;
//!
//! match engine.run(&mut state).await? {
//!     RunOutcome::Completed => println!("done in {} iterations", state.iteration_count),
//!     RunOutcome::Suspended => {
//!         // Persist `state` and call `engine.resume` once a decision arrives.
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod events;
mod runner;

pub use events::WorkflowEvent;
pub use runner::{RunOutcome, WorkflowEngine};
