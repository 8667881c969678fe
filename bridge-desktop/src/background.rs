//! Background Job Queue Implementation
//!
//! In-process [`JobQueue`] backed by tokio tasks. Each job is spawned at
//! enqueue time and sleeps on the runtime timer until its start time, so a
//! delayed job never blocks a handler slot.
//!
//! Finished jobs leave the active table. Their final status stays queryable
//! in a bounded LRU until newer jobs evict it.

use async_trait::async_trait;
use bridge_traits::{
    background::{JobHandle, JobQueue, JobRequest, JobStatus},
    error::{BridgeError, Result},
};
use futures::future::{BoxFuture, FutureExt};
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Finished jobs whose status is kept by default.
pub const DEFAULT_FINISHED_RETENTION: usize = 1024;

/// Handler invoked with the submitted job.
pub type JobHandler = Arc<dyn Fn(JobRequest) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Tokio-based job queue for desktop and server hosts.
#[derive(Clone)]
pub struct TokioJobQueue {
    jobs: Arc<RwLock<JobTable>>,
    handlers: Arc<RwLock<HashMap<String, JobHandler>>>,
}

struct ActiveJob {
    status: JobStatus,
    title: String,
    handle: Option<JoinHandle<()>>,
}

struct FinishedJob {
    status: JobStatus,
    title: String,
}

struct JobTable {
    active: HashMap<JobHandle, ActiveJob>,
    finished: LruCache<JobHandle, FinishedJob>,
}

impl JobTable {
    fn new(retention: NonZeroUsize) -> Self {
        Self {
            active: HashMap::new(),
            finished: LruCache::new(retention),
        }
    }

    /// Move a job out of the active table with its terminal status.
    fn finish(&mut self, handle: &JobHandle, status: JobStatus) {
        if let Some(job) = self.active.remove(handle) {
            self.finished.put(
                handle.clone(),
                FinishedJob {
                    status,
                    title: job.title,
                },
            );
        }
    }
}

impl TokioJobQueue {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }

    /// Keep the final status of at most `finished` completed jobs.
    ///
    /// Zero is raised to one.
    pub fn with_retention(finished: usize) -> Self {
        let retention = NonZeroUsize::new(finished).unwrap_or(NonZeroUsize::MIN);
        Self {
            jobs: Arc::new(RwLock::new(JobTable::new(retention))),
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register the handler that runs jobs submitted under `task`.
    ///
    /// Registering a task twice replaces the previous handler.
    pub async fn register_handler<F, Fut>(&self, task: &str, handler: F)
    where
        F: Fn(JobRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(task.to_string(), Arc::new(move |job| handler(job).boxed()));
    }

    async fn handler_for(&self, task: &str) -> Option<JobHandler> {
        let handlers = self.handlers.read().await;
        handlers.get(task).cloned()
    }

    /// Jobs that have not reached a terminal status.
    pub async fn active_jobs(&self) -> usize {
        self.jobs.read().await.active.len()
    }

    /// Jobs the queue holds any record of, active or finished.
    pub async fn tracked_jobs(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.active.len() + jobs.finished.len()
    }

    /// Title a job was submitted with.
    pub async fn job_title(&self, handle: &JobHandle) -> Option<String> {
        let jobs = self.jobs.read().await;
        jobs.active
            .get(handle)
            .map(|job| job.title.clone())
            .or_else(|| jobs.finished.peek(handle).map(|job| job.title.clone()))
    }

    /// Abort every unfinished job and drop all handlers.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        let pending: Vec<JobHandle> = jobs.active.keys().cloned().collect();
        for handle in &pending {
            if let Some(join) = jobs.active.get_mut(handle).and_then(|job| job.handle.take()) {
                join.abort();
            }
            jobs.finish(handle, JobStatus::Failed);
        }
        drop(jobs);

        self.handlers.write().await.clear();
        debug!(aborted = pending.len(), "Job queue shut down");
    }

    async fn set_running(jobs: &RwLock<JobTable>, handle: &JobHandle) {
        let mut jobs = jobs.write().await;
        if let Some(job) = jobs.active.get_mut(handle) {
            job.status = JobStatus::Running;
        }
    }

    async fn run_job(
        jobs: Arc<RwLock<JobTable>>,
        handle: JobHandle,
        handler: JobHandler,
        delay: Duration,
        job: JobRequest,
    ) {
        if !delay.is_zero() {
            sleep(delay).await;
        }

        Self::set_running(&jobs, &handle).await;
        debug!(job_id = %handle, task = %job.task, title = %job.title, "Running job");

        let task = job.task.clone();
        let status = match handler(job).await {
            Ok(()) => JobStatus::Completed,
            Err(err) => {
                warn!(job_id = %handle, task = %task, error = %err, "Job failed");
                JobStatus::Failed
            }
        };

        jobs.write().await.finish(&handle, status);
    }
}

impl Default for TokioJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue_after(&self, delay: Duration, job: JobRequest) -> Result<JobHandle> {
        let handler = self.handler_for(&job.task).await.ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for task: {}", job.task))
        })?;

        let handle = JobHandle::new();

        debug!(
            job_id = %handle,
            task = %job.task,
            title = %job.title,
            delay_secs = delay.as_secs(),
            "Enqueueing job"
        );

        // Hold the write lock across the spawn so the job cannot finish
        // before its entry exists.
        let mut jobs = self.jobs.write().await;
        let title = job.title.clone();
        let join = tokio::spawn(Self::run_job(
            Arc::clone(&self.jobs),
            handle.clone(),
            handler,
            delay,
            job,
        ));
        jobs.active.insert(
            handle.clone(),
            ActiveJob {
                status: JobStatus::Scheduled,
                title,
                handle: Some(join),
            },
        );

        Ok(handle)
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.active
            .get(handle)
            .map(|job| job.status)
            .or_else(|| jobs.finished.peek(handle).map(|job| job.status))
            .ok_or_else(|| BridgeError::NotFound(format!("Job {}", handle)))
    }
}
