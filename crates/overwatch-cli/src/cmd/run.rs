use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use overwatch_core::pipeline::StagePolicy;
use overwatch_core::{
    FileProfileStore, JobKey, JobStatus, Location, PipelineSnapshot, RunOutcome, Runtime,
};
use std::path::{Path, PathBuf};

use super::load_config;

pub struct RunArgs {
    pub coords: Option<(f64, f64)>,
    pub name: Option<String>,
    pub profile: Option<PathBuf>,
    pub concurrent: bool,
}

pub fn run(config_path: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if args.concurrent {
        config.pipeline.stage_two = StagePolicy::Concurrent;
    }

    let location = match (args.coords, args.name) {
        (Some((lat, lon)), name) => {
            Location::new(name.unwrap_or_else(|| format!("{lat}, {lon}")), lat, lon)
        }
        (None, Some(name)) => Location {
            name,
            ..config.pipeline.default_location.clone()
        },
        (None, None) => config.pipeline.default_location.clone(),
    };
    if !location.in_range() {
        bail!("coordinates out of range: {}, {}", location.lat, location.lon);
    }

    let profile = match args.profile {
        Some(path) => {
            let store = FileProfileStore::new(&path);
            let profile = store
                .read()
                .with_context(|| format!("failed to read profile {}", path.display()))?;
            match profile {
                Some(p) => Some(p),
                None => bail!("profile not found: {}", path.display()),
            }
        }
        None => None,
    };

    let runtime = Runtime::from_config(&config).context("failed to assemble pipeline")?;
    let orchestrator = runtime.orchestrator;

    let rt = tokio::runtime::Runtime::new()?;
    let (outcome, snapshot) = rt.block_on(async {
        let mut rx = orchestrator.subscribe();
        let mut seen = statuses(&orchestrator.snapshot());

        let run = orchestrator.run_all(location, profile);
        tokio::pin!(run);
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Ok(snap) = rx.recv() => report(&mut seen, &snap),
            }
        };
        while let Ok(snap) = rx.try_recv() {
            report(&mut seen, &snap);
        }
        (outcome, orchestrator.snapshot())
    });

    if outcome == RunOutcome::Skipped {
        bail!("pipeline run already in progress");
    }

    if json {
        print_json(&snapshot)?;
    } else {
        print_summary(&snapshot);
    }

    if snapshot.any_error() {
        bail!("one or more jobs failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn statuses(snapshot: &PipelineSnapshot) -> [JobStatus; 4] {
    JobKey::ALL.map(|k| snapshot.job(k).status())
}

/// Jobs whose status differs between `before` and `after`, in pipeline order.
fn transitions(before: &[JobStatus; 4], after: &[JobStatus; 4]) -> Vec<(JobKey, JobStatus)> {
    JobKey::ALL
        .iter()
        .zip(before.iter().zip(after))
        .filter(|(_, (b, a))| b != a)
        .map(|(k, (_, a))| (*k, *a))
        .collect()
}

fn report(seen: &mut [JobStatus; 4], snapshot: &PipelineSnapshot) {
    let now = statuses(snapshot);
    for (key, status) in transitions(seen, &now) {
        match snapshot.job(key).error_message() {
            Some(msg) if status == JobStatus::Error => eprintln!("{key}: {status} ({msg})"),
            _ => eprintln!("{key}: {status}"),
        }
    }
    *seen = now;
}

fn print_summary(snapshot: &PipelineSnapshot) {
    let rows = snapshot
        .jobs()
        .iter()
        .map(|job| {
            let detail = match (job.error_message(), job.data()) {
                (Some(msg), _) => msg.to_string(),
                (None, Some(serde_json::Value::Object(map))) => {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    keys.join(", ")
                }
                (None, Some(_)) => "-".to_string(),
                (None, None) => String::new(),
            };
            vec![job.key().to_string(), job.status().to_string(), detail]
        })
        .collect();
    print_table(&["JOB", "STATUS", "DETAIL"], rows);
    println!("\nUse --json for the full artifacts.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use overwatch_core::JobStatus::*;

    #[test]
    fn transitions_list_only_changed_jobs_in_order() {
        let before = [Running, Idle, Idle, Idle];
        let after = [Complete, Running, Idle, Running];
        assert_eq!(
            transitions(&before, &after),
            vec![
                (JobKey::Risk, Complete),
                (JobKey::Supplies, Running),
                (JobKey::Comms, Running),
            ]
        );
    }

    #[test]
    fn no_change_no_transitions() {
        let same = [Complete, Error, Error, Error];
        assert!(transitions(&same, &same).is_empty());
    }

    #[test]
    fn fresh_snapshot_is_all_idle() {
        assert_eq!(statuses(&PipelineSnapshot::default()), [Idle; 4]);
    }
}
