//! Two-stage analysis pipeline: job state model and the orchestrator that
//! drives it.

mod orchestrator;
mod state;

pub use orchestrator::{Orchestrator, RunOutcome, StagePolicy, ABORTED_MESSAGE, DEPENDENCY_MESSAGE};
pub use state::{JobKey, JobState, JobStatus, PipelineSnapshot};
