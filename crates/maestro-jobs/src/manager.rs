//! Exclusive owner of all job records.
//!
//! Mutation happens under a single lock; reads return snapshots. Lifecycle
//! changes are observable only through the event channel. Terminal
//! transitions are one-way; a terminal job rejects further mutation
//! silently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use maestro_core::clock::Clock;
use maestro_core::types::ChatId;

use crate::events::JobEvent;
use crate::types::{Job, JobStatus, WorkerType};

/// Terminal jobs beyond this are evicted FIFO.
const TERMINAL_SOFT_CAP: usize = 200;
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
}

struct Inner {
    jobs: HashMap<String, JobEntry>,
    /// Creation order, for stable listings and FIFO eviction.
    order: Vec<String>,
}

/// Outcome of asking the manager to start a queued job.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The job transitioned to running.
    Started(Box<Job>),
    /// The concurrency cap is reached; the job stays queued.
    AtCapacity,
    /// Unknown id, or the job is not in a startable state.
    NotStartable,
}

pub struct JobManager {
    inner: Mutex<Inner>,
    events: broadcast::Sender<JobEvent>,
    max_concurrent: usize,
    clock: Arc<dyn Clock>,
}

impl JobManager {
    pub fn new(max_concurrent: usize, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                order: Vec::new(),
            }),
            events,
            max_concurrent,
            clock,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Register a new queued job. No event fires until it starts.
    pub fn create(
        &self,
        chat: &ChatId,
        worker_type: WorkerType,
        task: impl Into<String>,
        depends_on: Vec<String>,
    ) -> Job {
        let mut inner = self.inner.lock().unwrap();
        let id = loop {
            let candidate = format!("j-{}", &Uuid::new_v4().simple().to_string()[..8]);
            if !inner.jobs.contains_key(&candidate) {
                break candidate;
            }
        };

        let job = Job {
            id: id.clone(),
            chat_id: chat.clone(),
            worker_type,
            task: task.into(),
            status: JobStatus::Queued,
            created_at: self.clock.now_utc(),
            started_at: None,
            completed_at: None,
            duration_s: None,
            result: None,
            error: None,
            depends_on,
            progress: Vec::new(),
            llm_calls: 0,
            tool_calls: 0,
            last_thinking: None,
            status_message_id: None,
            structured_result: None,
        };

        inner.jobs.insert(
            id.clone(),
            JobEntry {
                job: job.clone(),
                cancel: CancellationToken::new(),
            },
        );
        inner.order.push(id.clone());
        evict_terminal(&mut inner);

        info!(job_id = %id, worker = %worker_type, chat = %chat, "job created");
        job
    }

    /// Transition a queued job to running, subject to the concurrency cap.
    pub fn start(&self, id: &str) -> StartOutcome {
        let (outcome, event) = {
            let mut inner = self.inner.lock().unwrap();
            let running = inner
                .jobs
                .values()
                .filter(|e| e.job.status == JobStatus::Running)
                .count();

            let Some(entry) = inner.jobs.get_mut(id) else {
                return StartOutcome::NotStartable;
            };
            if entry.job.status != JobStatus::Queued {
                return StartOutcome::NotStartable;
            }
            if running >= self.max_concurrent {
                debug!(job_id = %id, running, cap = self.max_concurrent, "start deferred, at capacity");
                return StartOutcome::AtCapacity;
            }

            entry.job.status = JobStatus::Running;
            entry.job.started_at = Some(self.clock.now_utc());
            let snapshot = entry.job.clone();
            (
                StartOutcome::Started(Box::new(snapshot.clone())),
                JobEvent::Started(snapshot),
            )
        };

        info!(job_id = %id, "job started");
        let _ = self.events.send(event);
        outcome
    }

    pub fn complete(
        &self,
        id: &str,
        result: impl Into<String>,
        structured: Option<serde_json::Value>,
    ) -> Option<Job> {
        self.finish(id, JobStatus::Completed, Some(result.into()), None, structured)
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> Option<Job> {
        self.finish(id, JobStatus::Failed, None, Some(error.into()), None)
    }

    /// Cancel a job. Idempotent: a terminal job is left untouched and
    /// returns `None`. Trips the cancel token shared with the worker.
    pub fn cancel(&self, id: &str) -> Option<Job> {
        let (snapshot, token) = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner.jobs.get_mut(id)?;
            if entry.job.status.is_terminal() {
                return None;
            }
            entry.job.status = JobStatus::Cancelled;
            entry.job.completed_at = Some(self.clock.now_utc());
            entry.job.duration_s = elapsed_secs(&entry.job);
            (entry.job.clone(), entry.cancel.clone())
        };

        token.cancel();
        info!(job_id = %id, "job cancelled");
        let _ = self.events.send(JobEvent::Cancelled(snapshot.clone()));
        Some(snapshot)
    }

    /// Cancel every non-terminal job for a chat, in creation order.
    pub fn cancel_all_for_chat(&self, chat: &ChatId) -> Vec<Job> {
        let ids: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner
                .order
                .iter()
                .filter(|id| {
                    inner
                        .jobs
                        .get(*id)
                        .is_some_and(|e| e.job.chat_id == *chat && !e.job.status.is_terminal())
                })
                .cloned()
                .collect()
        };
        ids.iter().filter_map(|id| self.cancel(id)).collect()
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(id).map(|e| e.job.clone())
    }

    /// The cancel token observed by the worker running this job.
    pub fn cancel_token(&self, id: &str) -> Option<CancellationToken> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(id).map(|e| e.cancel.clone())
    }

    pub fn list(&self, chat: &ChatId) -> Vec<Job> {
        self.snapshot(|job| job.chat_id == *chat)
    }

    pub fn list_running(&self, chat: &ChatId) -> Vec<Job> {
        self.snapshot(|job| job.chat_id == *chat && job.status == JobStatus::Running)
    }

    pub fn list_all(&self) -> Vec<Job> {
        self.snapshot(|_| true)
    }

    /// Oldest queued job, for promotion when a running slot frees.
    pub fn next_queued(&self) -> Option<Job> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|e| e.job.status == JobStatus::Queued)
            .map(|e| e.job.clone())
    }

    /// Append a progress line. Dropped silently once the job is terminal.
    pub fn record_progress(&self, id: &str, line: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.jobs.get_mut(id) {
            if !entry.job.status.is_terminal() {
                entry.job.progress.push(line.into());
            }
        }
    }

    pub fn note_llm_call(&self, id: &str) {
        self.mutate_live(id, |job| job.llm_calls += 1);
    }

    pub fn note_tool_call(&self, id: &str) {
        self.mutate_live(id, |job| job.tool_calls += 1);
    }

    pub fn set_last_thinking(&self, id: &str, thinking: impl Into<String>) {
        let text = thinking.into();
        self.mutate_live(id, move |job| job.last_thinking = Some(text));
    }

    pub fn set_status_message(&self, id: &str, message_id: i64) {
        self.mutate_live(id, move |job| job.status_message_id = Some(message_id));
    }

    // --- private helpers ---------------------------------------------------

    fn snapshot(&self, filter: impl Fn(&Job) -> bool) -> Vec<Job> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .map(|e| &e.job)
            .filter(|j| filter(j))
            .cloned()
            .collect()
    }

    fn mutate_live(&self, id: &str, f: impl FnOnce(&mut Job)) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.jobs.get_mut(id) {
            if !entry.job.status.is_terminal() {
                f(&mut entry.job);
            }
        }
    }

    fn finish(
        &self,
        id: &str,
        status: JobStatus,
        result: Option<String>,
        error: Option<String>,
        structured: Option<serde_json::Value>,
    ) -> Option<Job> {
        let (snapshot, event) = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner.jobs.get_mut(id)?;
            if entry.job.status.is_terminal() {
                debug!(job_id = %id, attempted = %status, "mutation of terminal job ignored");
                return None;
            }

            entry.job.status = status;
            entry.job.completed_at = Some(self.clock.now_utc());
            entry.job.duration_s = elapsed_secs(&entry.job);
            entry.job.result = result;
            entry.job.error = error;
            entry.job.structured_result = structured;

            let snapshot = entry.job.clone();
            let event = match status {
                JobStatus::Completed => JobEvent::Completed(snapshot.clone()),
                JobStatus::Failed => JobEvent::Failed(snapshot.clone()),
                _ => unreachable!("finish only handles completed/failed"),
            };
            (snapshot, event)
        };

        info!(job_id = %id, status = %status, "job finished");
        let _ = self.events.send(event);
        Some(snapshot)
    }
}

fn elapsed_secs(job: &Job) -> Option<u64> {
    let start = job.started_at?;
    let end = job.completed_at?;
    Some((end - start).num_seconds().max(0) as u64)
}

/// Drop the oldest terminal jobs once the ledger outgrows the soft cap.
fn evict_terminal(inner: &mut Inner) {
    let terminal: Vec<String> = inner
        .order
        .iter()
        .filter(|id| {
            inner
                .jobs
                .get(*id)
                .is_some_and(|e| e.job.status.is_terminal())
        })
        .cloned()
        .collect();

    if terminal.len() <= TERMINAL_SOFT_CAP {
        return;
    }
    let excess = terminal.len() - TERMINAL_SOFT_CAP;
    for id in terminal.into_iter().take(excess) {
        inner.jobs.remove(&id);
        inner.order.retain(|x| x != &id);
        warn!(job_id = %id, "terminal job evicted past soft cap");
    }
}
