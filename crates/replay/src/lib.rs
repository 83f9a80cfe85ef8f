//! Offline replay of recorded blocks through the subscription tracker.
//!
//! Every collaborator is in-memory: the lookup answers any request ID with a
//! synthetic detail and the run trigger just records what it was asked to
//! start. Useful to check which jobs a block history would have triggered.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use reqwatch_core::{Job, JobId};
use reqwatch_events::{BlockEvents, EventMatcher, EventQuery, InMemoryEventSource};
use reqwatch_infra::{
    InMemoryJobStore, InMemoryRequestLookup, InMemoryRequestMemory, InMemoryRunTrigger, JobStore,
    SubscriptionTracker, TrackerConfig, TrackerDeps,
};

/// Upper bound on waiting for workers to drain their requests.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub name: String,
    pub runs_triggered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub jobs: usize,
    pub blocks: usize,
    /// Block deliveries across all subscriptions.
    pub deliveries: usize,
    pub runs_triggered: usize,
    pub trigger_attempts: usize,
    pub stored_requests: usize,
    pub per_job: Vec<JobSummary>,
}

/// Parse a JSON array of jobs. Interests and windows are validated while
/// decoding.
pub fn parse_jobs(raw: &str) -> Result<Vec<Job>> {
    serde_json::from_str(raw).context("jobs file is not a JSON array of valid jobs")
}

/// Parse JSON lines of `BlockEvents`; blank lines are skipped.
pub fn parse_blocks(raw: &str) -> Result<Vec<BlockEvents>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).with_context(|| format!("invalid block on line {}", i + 1)))
        .collect()
}

pub fn load(jobs_path: &Path, blocks_path: &Path) -> Result<(Vec<Job>, Vec<BlockEvents>)> {
    let jobs = fs::read_to_string(jobs_path).with_context(|| format!("reading {}", jobs_path.display()))?;
    let blocks = fs::read_to_string(blocks_path).with_context(|| format!("reading {}", blocks_path.display()))?;
    Ok((parse_jobs(&jobs)?, parse_blocks(&blocks)?))
}

/// Start a tracker over `jobs`, publish `blocks` in order, wait for the
/// workers to settle, then stop and summarize.
pub fn replay(jobs: Vec<Job>, blocks: &[BlockEvents], config: TrackerConfig) -> Result<ReplaySummary> {
    let source = InMemoryEventSource::arc();
    let store = InMemoryJobStore::arc();
    let trigger = Arc::new(InMemoryRunTrigger::new());
    let memory = Arc::new(InMemoryRequestMemory::new());
    let deps = TrackerDeps {
        source: source.clone(),
        lookup: Arc::new(InMemoryRequestLookup::synthetic()),
        trigger: trigger.clone(),
        memory: memory.clone(),
        jobs: store.clone(),
    };

    let expected = expected_requests(&jobs, blocks);
    let names: Vec<(JobId, String)> = jobs.iter().map(|j| (j.id, j.name.clone())).collect();
    for job in jobs {
        let id = job.id;
        store.insert(job).with_context(|| format!("storing job {id}"))?;
    }

    let tracker = SubscriptionTracker::new(deps, config);
    tracker.start().context("starting subscription tracker")?;
    info!(
        jobs = names.len(),
        subscriptions = tracker.subscription_count(),
        blocks = blocks.len(),
        "replaying blocks"
    );

    let mut deliveries = 0;
    for block in blocks {
        deliveries += source
            .publish(block.clone())
            .with_context(|| format!("publishing block {}", block.height))?;
    }

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while trigger.attempts() < expected && tracker.worker_count() > 0 {
        if Instant::now() >= deadline {
            warn!(expected, attempts = trigger.attempts(), "timed out waiting for workers to settle");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    tracker.stop();

    let per_job = names
        .into_iter()
        .map(|(job_id, name)| JobSummary {
            job_id,
            name,
            runs_triggered: trigger.runs_for(job_id).len(),
        })
        .collect();

    Ok(ReplaySummary {
        jobs: store.len(),
        blocks: blocks.len(),
        deliveries,
        runs_triggered: trigger.runs().len(),
        trigger_attempts: trigger.attempts(),
        stored_requests: memory.len(),
        per_job,
    })
}

/// Requests the currently active jobs should see for `blocks`.
fn expected_requests(jobs: &[Job], blocks: &[BlockEvents]) -> usize {
    let now = Utc::now();
    jobs.iter()
        .filter(|job| job.is_active(now))
        .flat_map(|job| job.interests().cloned().collect::<BTreeSet<_>>())
        .map(|interest| {
            let query = EventQuery::for_interest(&interest);
            let matcher = EventMatcher::new(interest);
            blocks
                .iter()
                .filter(|block| query.matches(block))
                .map(|block| matcher.match_block(block).len())
                .sum::<usize>()
        })
        .sum()
}
