pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod profile;
pub mod prompts;
pub mod runtime;
pub mod sources;

#[cfg(test)]
mod testing;

pub use cache::TtlCache;
pub use config::Config;
pub use error::{FetchError, OverwatchError, Result};
pub use generator::Generator;
pub use pipeline::{JobKey, JobState, JobStatus, Orchestrator, PipelineSnapshot, RunOutcome, StagePolicy};
pub use profile::{FileProfileStore, Location, Profile, ProfileStore};
pub use runtime::Runtime;
