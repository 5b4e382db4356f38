use chrono::{DateTime, Utc};
use genai_gateway::Artifact;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// JobKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKey {
    Risk,
    Supplies,
    Evacuation,
    Comms,
}

impl JobKey {
    /// Pipeline order.
    pub const ALL: [JobKey; 4] = [
        JobKey::Risk,
        JobKey::Supplies,
        JobKey::Evacuation,
        JobKey::Comms,
    ];

    pub const STAGE_TWO: [JobKey; 3] = [JobKey::Supplies, JobKey::Evacuation, JobKey::Comms];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKey::Risk => "risk",
            JobKey::Supplies => "supplies",
            JobKey::Evacuation => "evacuation",
            JobKey::Comms => "comms",
        }
    }

    pub fn stage(&self) -> u8 {
        match self {
            JobKey::Risk => 1,
            _ => 2,
        }
    }

    fn index(&self) -> usize {
        match self {
            JobKey::Risk => 0,
            JobKey::Supplies => 1,
            JobKey::Evacuation => 2,
            JobKey::Comms => 3,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus / JobState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// State of one analysis job.
///
/// Only the constructors below create values, so `data` is set only when
/// complete and `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobState {
    key: JobKey,
    status: JobStatus,
    data: Option<Artifact>,
    error: Option<String>,
}

impl JobState {
    pub fn idle(key: JobKey) -> Self {
        Self {
            key,
            status: JobStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn running(key: JobKey) -> Self {
        Self {
            status: JobStatus::Running,
            ..Self::idle(key)
        }
    }

    pub fn complete(key: JobKey, data: Artifact) -> Self {
        Self {
            status: JobStatus::Complete,
            data: Some(data),
            ..Self::idle(key)
        }
    }

    pub fn error(key: JobKey, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            error: Some(message.into()),
            ..Self::idle(key)
        }
    }

    pub fn key(&self) -> JobKey {
        self.key
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn data(&self) -> Option<&Artifact> {
        self.data.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

// ---------------------------------------------------------------------------
// PipelineSnapshot
// ---------------------------------------------------------------------------

/// Immutable view of the whole pipeline, published on every transition.
///
/// Serialized with `jobs` as an object keyed by job name, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    running: bool,
    updated_at: DateTime<Utc>,
    #[serde(serialize_with = "jobs_as_map")]
    jobs: [JobState; 4],
}

fn jobs_as_map<S: Serializer>(jobs: &[JobState; 4], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(jobs.iter().map(|j| (j.key, j)))
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            updated_at: Utc::now(),
            jobs: JobKey::ALL.map(JobState::idle),
        }
    }
}

impl PipelineSnapshot {
    pub fn job(&self, key: JobKey) -> &JobState {
        &self.jobs[key.index()]
    }

    pub fn jobs(&self) -> &[JobState] {
        &self.jobs
    }

    /// True while a run holds the orchestrator.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn any_error(&self) -> bool {
        self.jobs.iter().any(|j| j.status == JobStatus::Error)
    }

    pub fn all_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.status == JobStatus::Complete)
    }

    pub(crate) fn set(&mut self, state: JobState) {
        let i = state.key.index();
        self.jobs[i] = state;
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
        self.updated_at = Utc::now();
    }
}
