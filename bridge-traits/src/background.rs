//! Background Job Queue
//!
//! Fire-and-forget job submission with optional delayed start.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// A unit of work submitted to a [`JobQueue`].
///
/// `task` names the handler the host registered; `payload` is handed to it
/// unchanged. Payloads are JSON so that out-of-process queues can persist them.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub task: String,
    pub payload: serde_json::Value,
    pub title: String,
}

impl JobRequest {
    pub fn new<T: Serialize>(task: impl Into<String>, payload: &T) -> Result<Self> {
        let task = task.into();
        let payload = serde_json::to_value(payload).map_err(|e| {
            BridgeError::OperationFailed(format!("Job payload serialization failed: {}", e))
        })?;
        Ok(Self {
            title: task.clone(),
            task,
            payload,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Decode the payload back into the handler's argument type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            BridgeError::OperationFailed(format!("Job payload for {} is invalid: {}", self.task, e))
        })
    }
}

/// Queued job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted, waiting for its start time
    Scheduled,
    /// Handler is executing
    Running,
    /// Handler returned `Ok`
    Completed,
    /// Handler returned an error or no handler was registered
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Asynchronous job queue.
///
/// Enqueueing never waits for the job to run. A delayed job occupies no worker
/// while it waits: the delay belongs to the queue, not to the handler.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{JobQueue, JobRequest};
/// use std::time::Duration;
///
/// async fn retry_later(queue: &dyn JobQueue, payload: &Task) -> Result<()> {
///     let job = JobRequest::new("download_resource", payload)?
///         .with_title("Re-scheduling download: 2");
///     queue.enqueue_after(Duration::from_secs(60), job).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job for immediate execution.
    async fn enqueue(&self, job: JobRequest) -> Result<JobHandle> {
        self.enqueue_after(Duration::ZERO, job).await
    }

    /// Submit a job that must not start before `delay` has elapsed.
    async fn enqueue_after(&self, delay: Duration, job: JobRequest) -> Result<JobHandle>;

    /// Current status of a previously submitted job.
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus>;
}
