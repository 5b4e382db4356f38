use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::state::{JobKey, JobState, JobStatus, PipelineSnapshot};
use crate::aggregate::{Aggregator, RunContext};
use crate::profile::{Location, Profile};

/// Error given to every stage-2 job when the risk job fails.
pub const DEPENDENCY_MESSAGE: &str = "Risk assessment failed — cannot proceed";

/// Error given to a job that panicked or was still running when its run
/// was dropped.
pub const ABORTED_MESSAGE: &str = "job aborted";

/// How stage-2 jobs are launched once risk completes.
///
/// Either way the gateway lane serializes their model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePolicy {
    /// One job finishes before the next starts.
    #[default]
    Sequential,
    /// All three start together.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The pipeline ran to the end; job outcomes are in the snapshot.
    Completed,
    /// Another run was active, nothing was done.
    Skipped,
}

/// Releases the run however `run_all` exits: unfinished jobs are marked
/// aborted, the snapshot stops reporting a run, then the flag is cleared.
struct RunGuard<'a>(&'a Orchestrator);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.settle_abandoned_run();
        self.0.running.store(false, Ordering::Release);
    }
}

/// Drives the two-stage pipeline and owns its state.
///
/// Callers observe progress through [`Orchestrator::subscribe`] or
/// [`Orchestrator::snapshot`]; `run_all` itself never fails.
pub struct Orchestrator {
    risk: Arc<dyn Aggregator>,
    stage_two: Vec<Arc<dyn Aggregator>>,
    policy: StagePolicy,
    running: AtomicBool,
    state: Mutex<PipelineSnapshot>,
    events: broadcast::Sender<PipelineSnapshot>,
}

impl Orchestrator {
    pub fn new(
        risk: Arc<dyn Aggregator>,
        stage_two: Vec<Arc<dyn Aggregator>>,
        policy: StagePolicy,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            risk,
            stage_two,
            policy,
            running: AtomicBool::new(false),
            state: Mutex::new(PipelineSnapshot::default()),
            events,
        }
    }

    pub fn policy(&self) -> StagePolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineSnapshot> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run risk, then (only if it succeeded) the stage-2 jobs.
    ///
    /// Returns [`RunOutcome::Skipped`] without touching state if a run is
    /// already in progress.
    pub async fn run_all(&self, location: Location, profile: Option<Profile>) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(location = %location.name, "pipeline already running, skipping duplicate run");
            return RunOutcome::Skipped;
        }
        let _guard = RunGuard(self);

        info!(location = %location.name, policy = ?self.policy, "pipeline run started");
        self.publish(|s| {
            s.set_running(true);
            s.set(JobState::running(JobKey::Risk));
            for key in JobKey::STAGE_TWO {
                s.set(JobState::idle(key));
            }
        });

        let ctx = RunContext::new(location, profile);
        let Some(risk) = self.run_job(self.risk.as_ref(), &ctx, true).await else {
            self.publish(|s| {
                for key in JobKey::STAGE_TWO {
                    s.set(JobState::error(key, DEPENDENCY_MESSAGE));
                }
                s.set_running(false);
            });
            warn!("risk assessment failed, stage-two jobs not run");
            return RunOutcome::Completed;
        };

        let ctx = ctx.with_risk(risk);
        match self.policy {
            StagePolicy::Sequential => {
                for job in &self.stage_two {
                    self.run_job(job.as_ref(), &ctx, false).await;
                }
            }
            StagePolicy::Concurrent => {
                self.publish(|s| {
                    for job in &self.stage_two {
                        s.set(JobState::running(job.key()));
                    }
                });
                join_all(
                    self.stage_two
                        .iter()
                        .map(|job| self.run_job(job.as_ref(), &ctx, true)),
                )
                .await;
            }
        }

        let snapshot = self.publish(|s| s.set_running(false));
        info!(
            failed = snapshot.jobs().iter().filter(|j| j.error_message().is_some()).count(),
            "pipeline run finished"
        );
        RunOutcome::Completed
    }

    /// Run one job, publishing `running` (unless already announced) and
    /// then its terminal state. Returns the artifact on success.
    async fn run_job(
        &self,
        job: &dyn Aggregator,
        ctx: &RunContext,
        announced: bool,
    ) -> Option<genai_gateway::Artifact> {
        let key = job.key();
        if !announced {
            self.publish(|s| s.set(JobState::running(key)));
        }
        let result = match AssertUnwindSafe(job.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = format!("{ABORTED_MESSAGE}: {}", panic_message(&*panic));
                error!(job = %key, error = %message, "job panicked");
                self.publish(|s| s.set(JobState::error(key, message)));
                return None;
            }
        };
        match result {
            Ok(artifact) => {
                info!(job = %key, "job complete");
                self.publish(|s| s.set(JobState::complete(key, artifact.clone())));
                Some(artifact)
            }
            Err(e) => {
                error!(job = %key, error = %e, "job failed");
                self.publish(|s| s.set(JobState::error(key, e.to_string())));
                None
            }
        }
    }

    /// Close out a run that ended without its final publish, e.g. because
    /// the `run_all` future was dropped mid-flight.
    fn settle_abandoned_run(&self) {
        if !self.lock().is_running() {
            return;
        }
        warn!("pipeline run ended early, marking unfinished jobs aborted");
        self.publish(|s| {
            let unfinished: Vec<JobKey> = s
                .jobs()
                .iter()
                .filter(|j| j.status() == JobStatus::Running)
                .map(|j| j.key())
                .collect();
            for key in unfinished {
                s.set(JobState::error(key, ABORTED_MESSAGE));
            }
            s.set_running(false);
        });
    }

    /// Apply `update` and broadcast the resulting snapshot.
    fn publish(&self, update: impl FnOnce(&mut PipelineSnapshot)) -> PipelineSnapshot {
        let snapshot = {
            let mut state = self.lock();
            update(&mut state);
            state.clone()
        };
        // No subscribers is fine.
        if self.events.send(snapshot.clone()).is_err() {
            debug!("no pipeline subscribers");
        }
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, PipelineSnapshot> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{CommsAggregator, EvacuationAggregator, RiskAggregator, SuppliesAggregator};
    use crate::config::{Budget, PlacesConfig};
    use crate::generator::Generator;
    use crate::prompts::{COMMS_SCHEMA, EVACUATION_SCHEMA, RISK_SCHEMA, SUPPLIES_SCHEMA};
    use crate::testing::{gateway, spaced_gateway, RecordingTransport};
    use async_trait::async_trait;
    use genai_gateway::{Artifact, Completion, GatewayError};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn manila() -> Location {
        Location::new("Manila", 14.5995, 120.9842)
    }

    /// Orchestrator over the real aggregators and a recording transport.
    fn real_pipeline(transport: Arc<RecordingTransport>, policy: StagePolicy) -> Arc<Orchestrator> {
        let generator = Arc::new(Generator::new(gateway(transport)));
        let risk = Arc::new(RiskAggregator::new(Vec::new(), Budget::default(), generator.clone()));
        let stage_two: Vec<Arc<dyn Aggregator>> = vec![
            Arc::new(SuppliesAggregator::new(generator.clone())),
            Arc::new(EvacuationAggregator::new(generator.clone(), None, PlacesConfig::default())),
            Arc::new(CommsAggregator::new(generator)),
        ];
        Arc::new(Orchestrator::new(risk, stage_two, policy, 64))
    }

    fn reply_by_schema(
        failing: &'static str,
    ) -> impl Fn(&genai_gateway::GatewayRequest) -> genai_gateway::Result<Completion> {
        move |req| {
            if req.schema_hint == failing {
                Err(GatewayError::UpstreamRejected {
                    status: 400,
                    body: "rejected".into(),
                })
            } else {
                Ok(Completion::text(r#"{"ok":true}"#))
            }
        }
    }

    #[tokio::test]
    async fn happy_path_runs_all_four_in_order() {
        let transport = RecordingTransport::new(reply_by_schema("none"));
        let orch = real_pipeline(transport.clone(), StagePolicy::Sequential);

        assert_eq!(orch.run_all(manila(), None).await, RunOutcome::Completed);

        let snap = orch.snapshot();
        assert!(snap.all_complete());
        assert!(!snap.is_running());
        assert!(!orch.is_running());
        assert_eq!(
            transport.schemas(),
            vec![RISK_SCHEMA, SUPPLIES_SCHEMA, EVACUATION_SCHEMA, COMMS_SCHEMA]
        );
        assert_eq!(snap.job(JobKey::Risk).data(), Some(&json!({"ok": true})));
    }

    #[tokio::test]
    async fn risk_failure_gates_stage_two() {
        let transport = RecordingTransport::new(reply_by_schema(RISK_SCHEMA));
        let orch = real_pipeline(transport.clone(), StagePolicy::Sequential);

        assert_eq!(orch.run_all(manila(), None).await, RunOutcome::Completed);

        assert_eq!(transport.schemas(), vec![RISK_SCHEMA]);
        let snap = orch.snapshot();
        assert_eq!(snap.job(JobKey::Risk).status(), JobStatus::Error);
        assert!(snap
            .job(JobKey::Risk)
            .error_message()
            .unwrap()
            .contains("400"));
        for key in JobKey::STAGE_TWO {
            let job = snap.job(key);
            assert_eq!(job.status(), JobStatus::Error);
            assert_eq!(job.error_message(), Some(DEPENDENCY_MESSAGE));
        }
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn risk_failure_gates_stage_two_under_concurrent_policy() {
        let transport = RecordingTransport::new(reply_by_schema(RISK_SCHEMA));
        let orch = real_pipeline(transport.clone(), StagePolicy::Concurrent);
        orch.run_all(manila(), None).await;
        assert_eq!(transport.calls().len(), 1);
        assert!(JobKey::STAGE_TWO
            .iter()
            .all(|k| orch.snapshot().job(*k).error_message() == Some(DEPENDENCY_MESSAGE)));
    }

    #[tokio::test]
    async fn stage_two_failure_does_not_touch_siblings() {
        let transport = RecordingTransport::new(reply_by_schema(SUPPLIES_SCHEMA));
        let orch = real_pipeline(transport.clone(), StagePolicy::Sequential);
        orch.run_all(manila(), None).await;

        let snap = orch.snapshot();
        assert_eq!(snap.job(JobKey::Supplies).status(), JobStatus::Error);
        assert_eq!(snap.job(JobKey::Evacuation).status(), JobStatus::Complete);
        assert_eq!(snap.job(JobKey::Comms).status(), JobStatus::Complete);
        assert!(snap.any_error());
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_while_active_is_a_no_op() {
        let transport =
            RecordingTransport::with_latency(reply_by_schema("none"), Duration::from_secs(2));
        let orch = real_pipeline(transport.clone(), StagePolicy::Sequential);

        let first = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.run_all(manila(), None).await }
        });
        while transport.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(orch.is_running());
        let before = orch.snapshot();
        assert_eq!(before.job(JobKey::Risk).status(), JobStatus::Running);

        assert_eq!(orch.run_all(manila(), None).await, RunOutcome::Skipped);
        assert_eq!(orch.snapshot(), before);

        assert_eq!(first.await.unwrap(), RunOutcome::Completed);
        assert_eq!(transport.calls().len(), 4);
        assert!(!orch.is_running());

        // The guard is released, so a later run goes through.
        assert_eq!(orch.run_all(manila(), None).await, RunOutcome::Completed);
        assert_eq!(transport.calls().len(), 8);
    }

    #[tokio::test]
    async fn transitions_are_published_in_order() {
        let transport = RecordingTransport::new(reply_by_schema("none"));
        let orch = real_pipeline(transport, StagePolicy::Sequential);
        let mut rx = orch.subscribe();
        orch.run_all(manila(), None).await;

        let mut seen = Vec::new();
        while let Ok(snap) = rx.try_recv() {
            seen.push(snap);
        }
        // start, risk complete, then running + complete for each stage-2 job, finish
        assert_eq!(seen.len(), 1 + 1 + 6 + 1);
        assert_eq!(seen[0].job(JobKey::Risk).status(), JobStatus::Running);
        assert_eq!(seen[0].job(JobKey::Supplies).status(), JobStatus::Idle);
        assert!(seen[0].is_running());

        let risk_done = seen
            .iter()
            .position(|s| s.job(JobKey::Risk).status() == JobStatus::Complete)
            .unwrap();
        let first_stage_two = seen
            .iter()
            .position(|s| {
                JobKey::STAGE_TWO
                    .iter()
                    .any(|k| s.job(*k).status() != JobStatus::Idle)
            })
            .unwrap();
        assert!(risk_done < first_stage_two);
        assert!(!seen.last().unwrap().is_running());
    }

    /// Aggregator that sleeps and records when it ran.
    struct Timed {
        key: JobKey,
        spans: Arc<Mutex<Vec<(JobKey, Instant, Instant)>>>,
    }

    #[async_trait]
    impl Aggregator for Timed {
        fn key(&self) -> JobKey {
            self.key
        }

        async fn run(&self, _ctx: &RunContext) -> genai_gateway::Result<Artifact> {
            let start = Instant::now();
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.spans
                .lock()
                .unwrap()
                .push((self.key, start, Instant::now()));
            Ok(json!({}))
        }
    }

    fn timed_pipeline(
        policy: StagePolicy,
    ) -> (Orchestrator, Arc<Mutex<Vec<(JobKey, Instant, Instant)>>>) {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let job = |key| {
            Arc::new(Timed {
                key,
                spans: spans.clone(),
            }) as Arc<dyn Aggregator>
        };
        let orch = Orchestrator::new(
            job(JobKey::Risk),
            JobKey::STAGE_TWO.iter().map(|k| job(*k)).collect(),
            policy,
            16,
        );
        (orch, spans)
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_policy_never_overlaps_stage_two() {
        let (orch, spans) = timed_pipeline(StagePolicy::Sequential);
        let started = Instant::now();
        orch.run_all(manila(), None).await;
        assert_eq!(started.elapsed(), Duration::from_secs(4));

        let spans = spans.lock().unwrap();
        for pair in spans.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "{:?} overlaps {:?}", pair[0].0, pair[1].0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_policy_starts_stage_two_together_after_risk() {
        let (orch, spans) = timed_pipeline(StagePolicy::Concurrent);
        let started = Instant::now();
        orch.run_all(manila(), None).await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        let spans = spans.lock().unwrap();
        let risk_end = spans.iter().find(|s| s.0 == JobKey::Risk).unwrap().2;
        let stage_two: Vec<_> = spans.iter().filter(|s| s.0 != JobKey::Risk).collect();
        assert_eq!(stage_two.len(), 3);
        assert!(stage_two.iter().all(|s| s.1 >= risk_end));
        assert!(orch.snapshot().all_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_policy_still_serializes_gateway_calls() {
        let transport =
            RecordingTransport::with_latency(reply_by_schema("none"), Duration::from_millis(500));
        let orch = real_pipeline(transport.clone(), StagePolicy::Concurrent);
        let started = Instant::now();
        orch.run_all(manila(), None).await;
        // Four calls, one at a time through the lane.
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
        assert_eq!(transport.calls()[0].schema_hint, RISK_SCHEMA);
        assert!(orch.snapshot().all_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn lane_spacing_applies_across_concurrent_jobs() {
        let transport =
            RecordingTransport::with_latency(reply_by_schema("none"), Duration::from_millis(500));
        let generator = Arc::new(Generator::new(spaced_gateway(
            transport.clone(),
            Duration::from_secs(1),
        )));
        let orch = Orchestrator::new(
            Arc::new(RiskAggregator::new(Vec::new(), Budget::default(), generator.clone())),
            vec![
                Arc::new(SuppliesAggregator::new(generator.clone())),
                Arc::new(EvacuationAggregator::new(generator.clone(), None, PlacesConfig::default())),
                Arc::new(CommsAggregator::new(generator)),
            ],
            StagePolicy::Concurrent,
            16,
        );
        let started = Instant::now();
        orch.run_all(manila(), None).await;
        // Four 500 ms calls with 1 s between each settle and the next start.
        assert_eq!(started.elapsed(), Duration::from_millis(4 * 500 + 3 * 1000));
        assert_eq!(transport.calls().len(), 4);
        assert!(orch.snapshot().all_complete());
    }

    /// Aggregator that panics, or never finishes when `hang` is set.
    struct Broken {
        key: JobKey,
        hang: bool,
    }

    #[async_trait]
    impl Aggregator for Broken {
        fn key(&self) -> JobKey {
            self.key
        }

        async fn run(&self, _ctx: &RunContext) -> genai_gateway::Result<Artifact> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            panic!("{} exploded", self.key);
        }
    }

    fn broken(key: JobKey, hang: bool) -> Arc<dyn Aggregator> {
        Arc::new(Broken { key, hang })
    }

    fn ok_job(key: JobKey) -> Arc<dyn Aggregator> {
        struct Done(JobKey);

        #[async_trait]
        impl Aggregator for Done {
            fn key(&self) -> JobKey {
                self.0
            }

            async fn run(&self, _ctx: &RunContext) -> genai_gateway::Result<Artifact> {
                Ok(json!({}))
            }
        }
        Arc::new(Done(key))
    }

    #[tokio::test]
    async fn panicking_risk_job_settles_the_pipeline() {
        let orch = Orchestrator::new(
            broken(JobKey::Risk, false),
            JobKey::STAGE_TWO.iter().map(|k| ok_job(*k)).collect(),
            StagePolicy::Sequential,
            16,
        );
        assert_eq!(orch.run_all(manila(), None).await, RunOutcome::Completed);

        let snap = orch.snapshot();
        assert!(!snap.is_running());
        assert!(!orch.is_running());
        let risk = snap.job(JobKey::Risk);
        assert_eq!(risk.status(), JobStatus::Error);
        assert!(risk.error_message().unwrap().starts_with(ABORTED_MESSAGE));
        assert!(risk.error_message().unwrap().contains("risk exploded"));
        for key in JobKey::STAGE_TWO {
            assert_eq!(snap.job(key).error_message(), Some(DEPENDENCY_MESSAGE));
        }
    }

    #[tokio::test]
    async fn panicking_stage_two_job_leaves_siblings_alone() {
        let orch = Orchestrator::new(
            ok_job(JobKey::Risk),
            vec![
                ok_job(JobKey::Supplies),
                broken(JobKey::Evacuation, false),
                ok_job(JobKey::Comms),
            ],
            StagePolicy::Concurrent,
            16,
        );
        orch.run_all(manila(), None).await;

        let snap = orch.snapshot();
        assert!(!snap.is_running());
        assert_eq!(snap.job(JobKey::Evacuation).status(), JobStatus::Error);
        assert_eq!(snap.job(JobKey::Supplies).status(), JobStatus::Complete);
        assert_eq!(snap.job(JobKey::Comms).status(), JobStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_run_marks_unfinished_jobs_aborted() {
        let orch = Orchestrator::new(
            broken(JobKey::Risk, true),
            JobKey::STAGE_TWO.iter().map(|k| ok_job(*k)).collect(),
            StagePolicy::Sequential,
            16,
        );
        let mut rx = orch.subscribe();
        let run = tokio::time::timeout(Duration::from_secs(5), orch.run_all(manila(), None)).await;
        assert!(run.is_err());

        let snap = orch.snapshot();
        assert!(!snap.is_running());
        assert!(!orch.is_running());
        assert_eq!(snap.job(JobKey::Risk).error_message(), Some(ABORTED_MESSAGE));
        assert_eq!(snap.job(JobKey::Supplies).status(), JobStatus::Idle);

        let mut last = None;
        while let Ok(s) = rx.try_recv() {
            last = Some(s);
        }
        assert_eq!(last.as_ref(), Some(&snap));
    }
}
