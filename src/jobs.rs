//! Background analysis jobs.
//!
//! A submitted job moves through pending, running (with the current phase)
//! and then completed or failed. Analyses run on tokio's blocking pool
//! and a semaphore bounds how many run at once. Callers poll
//! [`JobQueue::status`] or await [`JobQueue::wait`].
//!
//! Finished jobs are kept up to a retention count, oldest evicted first, or
//! until [`JobQueue::remove`] drops them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::{Pipeline, PipelineOutput, PipelineSummary, SourceFile};
use crate::progress::{Phase, ProgressEvent, ProgressSink};

pub type JobId = Uuid;

/// Finished jobs kept by [`JobQueue::new`].
pub const DEFAULT_RETENTION: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
    },
    Completed {
        summary: PipelineSummary,
    },
    Failed {
        error: String,
    },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub files: usize,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    status: JobStatus,
    output: Option<Arc<PipelineOutput>>,
    done: Arc<Notify>,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

fn lock(jobs: &JobTable) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves a job to `running(phase)` as phases start.
struct JobProgress {
    id: JobId,
    jobs: JobTable,
}

impl ProgressSink for JobProgress {
    fn emit(&self, event: ProgressEvent) {
        if let ProgressEvent::PhaseStarted { phase, .. } = event {
            if let Some(entry) = lock(&self.jobs).get_mut(&self.id) {
                entry.status.state = JobState::Running { phase: Some(phase) };
            }
            debug!(job = %self.id, %phase, "job phase");
        }
    }
}

/// A queue of analysis jobs sharing one pipeline.
#[derive(Clone)]
pub struct JobQueue {
    pipeline: Arc<Pipeline>,
    jobs: JobTable,
    permits: Arc<Semaphore>,
    retention: usize,
}

impl JobQueue {
    /// `max_concurrent` is raised to 1 if zero.
    pub fn new(pipeline: Pipeline, max_concurrent: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep at most `max_finished` finished jobs (at least 1). Pending and
    /// running jobs are never evicted.
    pub fn with_retention(mut self, max_finished: usize) -> Self {
        self.retention = max_finished.max(1);
        self
    }

    /// Queue an analysis of `files`. Must be called inside a tokio runtime.
    pub fn submit(&self, files: Vec<SourceFile>) -> JobId {
        let id = Uuid::new_v4();
        let done = Arc::new(Notify::new());
        lock(&self.jobs).insert(
            id,
            JobEntry {
                status: JobStatus {
                    id,
                    state: JobState::Pending,
                    files: files.len(),
                    submitted_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                },
                output: None,
                done: done.clone(),
            },
        );
        info!(job = %id, files = files.len(), "job submitted");

        let queue = self.clone();
        tokio::spawn(async move {
            let result = queue.execute(id, files).await;
            queue.finish(id, result);
            done.notify_waiters();
        });
        id
    }

    async fn execute(
        &self,
        id: JobId,
        files: Vec<SourceFile>,
    ) -> std::result::Result<PipelineOutput, String> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| e.to_string())?;

        if let Some(entry) = lock(&self.jobs).get_mut(&id) {
            entry.status.state = JobState::Running { phase: None };
            entry.status.started_at = Some(Utc::now());
        }

        let pipeline = self.pipeline.clone();
        let sink = JobProgress {
            id,
            jobs: self.jobs.clone(),
        };
        tokio::task::spawn_blocking(move || pipeline.run_with(&files, &sink))
            .await
            .map_err(|e| e.to_string())
    }

    fn finish(&self, id: JobId, result: std::result::Result<PipelineOutput, String>) {
        let mut jobs = lock(&self.jobs);
        let Some(entry) = jobs.get_mut(&id) else {
            return;
        };
        entry.status.finished_at = Some(Utc::now());
        match result {
            Ok(output) => {
                let summary = output.summary();
                info!(
                    job = %id,
                    files = summary.files_analyzed,
                    skipped = summary.files_skipped,
                    "job completed"
                );
                entry.status.state = JobState::Completed { summary };
                entry.output = Some(Arc::new(output));
            }
            Err(error) => {
                warn!(job = %id, %error, "job failed");
                entry.status.state = JobState::Failed { error };
            }
        }
        evict_finished(&mut jobs, self.retention);
    }

    /// Drop a finished job and its output. Pending and running jobs stay.
    pub fn remove(&self, id: JobId) -> Option<JobStatus> {
        let mut jobs = lock(&self.jobs);
        if !jobs.get(&id)?.status.state.is_finished() {
            return None;
        }
        let entry = jobs.remove(&id)?;
        debug!(job = %id, "job removed");
        Some(entry.status)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        lock(&self.jobs).get(&id).map(|e| e.status.clone())
    }

    /// Every known job, oldest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = lock(&self.jobs).values().map(|e| e.status.clone()).collect();
        all.sort_by_key(|s| s.submitted_at);
        all
    }

    /// Wait until the job completes or fails. `None` for an unknown id.
    pub async fn wait(&self, id: JobId) -> Option<JobStatus> {
        let done = lock(&self.jobs).get(&id)?.done.clone();
        loop {
            let notified = done.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed.
            notified.as_mut().enable();
            let status = self.status(id)?;
            if status.state.is_finished() {
                return Some(status);
            }
            notified.await;
        }
    }

    /// The full output of a completed job.
    pub fn output(&self, id: JobId) -> Option<Arc<PipelineOutput>> {
        lock(&self.jobs).get(&id).and_then(|e| e.output.clone())
    }
}

fn evict_finished(jobs: &mut HashMap<JobId, JobEntry>, retention: usize) {
    let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
        .values()
        .filter(|e| e.status.state.is_finished())
        .map(|e| (e.status.finished_at.unwrap_or(e.status.submitted_at), e.status.id))
        .collect();
    if finished.len() <= retention {
        return;
    }
    finished.sort();
    let excess = finished.len() - retention;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
        debug!(job = %id, "finished job evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;

    fn queue() -> JobQueue {
        JobQueue::new(Pipeline::new(AnalysisConfig::default()).unwrap(), 2)
    }

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new(
                "src/components/Home.tsx",
                r#"import { loadFeed } from "../feed";
export function Home() {
  loadFeed();
  return <main />;
}"#,
            ),
            SourceFile::new("src/feed.ts", "export function loadFeed() { return []; }"),
        ]
    }

    #[tokio::test]
    async fn test_job_completes_with_summary() {
        let queue = queue();
        let id = queue.submit(files());
        let status = queue.wait(id).await.unwrap();
        match &status.state {
            JobState::Completed { summary } => {
                assert_eq!(summary.files_analyzed, 2);
                assert_eq!(summary.graph.call_edges, 1);
                assert_eq!(summary.journeys, 1);
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(status.started_at.is_some());
        assert!(status.finished_at >= status.started_at);

        let output = queue.output(id).unwrap();
        assert!(output.graph.is_entry_point("src/components/Home.tsx:Home"));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let queue = queue();
        let id = Uuid::new_v4();
        assert!(queue.status(id).is_none());
        assert!(queue.wait(id).await.is_none());
        assert!(queue.output(id).is_none());
    }

    #[tokio::test]
    async fn test_many_jobs_share_the_queue() {
        let queue = queue();
        let ids: Vec<JobId> = (0..4).map(|_| queue.submit(files())).collect();
        for id in &ids {
            let status = queue.wait(*id).await.unwrap();
            assert!(matches!(status.state, JobState::Completed { .. }));
        }
        assert_eq!(queue.list().len(), 4);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_finished() {
        let queue = queue().with_retention(1);
        let first = queue.submit(files());
        queue.wait(first).await.unwrap();
        let second = queue.submit(files());
        queue.wait(second).await.unwrap();

        assert!(queue.status(first).is_none());
        assert!(queue.output(first).is_none());
        let listed: Vec<JobId> = queue.list().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![second]);
    }

    #[tokio::test]
    async fn test_remove_finished_job() {
        let queue = queue();
        let id = queue.submit(files());
        queue.wait(id).await.unwrap();

        let removed = queue.remove(id).unwrap();
        assert!(matches!(removed.state, JobState::Completed { .. }));
        assert!(queue.status(id).is_none());
        assert!(queue.remove(id).is_none());
        assert!(queue.list().is_empty());
    }

    #[test]
    fn test_state_serde() {
        let state = JobState::Running {
            phase: Some(Phase::GraphAssembly),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"state":"running","phase":"graph_assembly"}"#);
        assert!(!state.is_finished());
        assert!(JobState::Failed {
            error: "boom".to_string()
        }
        .is_finished());
    }
}
