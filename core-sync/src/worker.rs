//! # Download Worker
//!
//! One synchronization attempt for one resource, run from the job queue.
//!
//! ## Flow
//!
//! The resource target selects the branch:
//!
//! - **Questionnaire**: a single download, then `Complete`
//! - **DirectFetch**: walk every submission page, write pretty JSON, then `Complete`
//! - **ExportBacked**: poll the export once
//!   - `complete`: download the result, `Complete` with attempts + 1
//!   - `created` / `processing`: attempts + 1, re-enqueued after
//!     `poll_backoff_step * attempts`, or `Error` once the ceiling is passed
//!   - anything else: `Error` with the raw export payload
//!
//! Failures outside those typed branches are caught at the task boundary and
//! recorded as `Error` on the resource named in the task, so a resource is
//! never left pending by a crashed attempt.
//!
//! Every write carries the cycle the task was scheduled for. A task whose cycle
//! was superseded by a newer refresh drops its result.

use crate::context::SyncContext;
use crate::dataset::Dataset;
use crate::resource::{
    DatasetId, DownloadStatus, ResourceId, ResourceTarget, StatusPatch, SyncedResource,
};
use crate::{Result, SyncError};
use bridge_traits::background::JobRequest;
use bridge_traits::storage::ArtifactContent;
use bridge_traits::survey::{
    submission_stream, ExportFormat, ExportStatus, QuestionnaireFormat, Submission, SurveyProvider,
};
use core_auth::UserId;
use core_runtime::config::SyncConfig;
use core_runtime::events::SyncEvent;
use core_runtime::logging::strip_path;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Task name the download handler is registered under.
pub const DOWNLOAD_TASK: &str = "download_resource";

/// Job payload: everything the worker needs without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub resource_id: ResourceId,
    pub dataset_id: DatasetId,
    /// Whose token the attempt runs with
    pub user_id: UserId,
    /// Cycle the task belongs to
    pub cycle: i64,
}

impl DownloadTask {
    pub fn for_resource(resource: &SyncedResource, user_id: UserId) -> Self {
        Self {
            resource_id: resource.id,
            dataset_id: resource.dataset_id,
            user_id,
            cycle: resource.cycle,
        }
    }
}

/// What one attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed { attempts: u32 },
    /// The export is still running; another attempt is queued
    Rescheduled { attempts: u32, delay: Duration },
    /// The resource was moved to `Error` with this diagnostic
    Failed(String),
    /// A newer cycle owns the resource; nothing was written
    Superseded,
}

pub struct DownloadWorker {
    ctx: SyncContext,
    max_poll_attempts: u32,
    poll_backoff_step: Duration,
}

impl DownloadWorker {
    pub fn new(ctx: SyncContext, config: &SyncConfig) -> Self {
        Self {
            ctx,
            max_poll_attempts: config.max_poll_attempts,
            poll_backoff_step: config.poll_backoff_step,
        }
    }

    /// Job queue entry point.
    ///
    /// # Errors
    ///
    /// Only a payload that does not decode fails; every other failure is
    /// recorded on the resource.
    pub async fn handle(&self, job: JobRequest) -> Result<WorkerOutcome> {
        let task: DownloadTask = job
            .decode()
            .map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(self.run(&task).await)
    }

    /// Run one attempt. Never fails: errors become the resource's `Error` state.
    #[instrument(skip(self, task), fields(resource_id = %task.resource_id, cycle = task.cycle))]
    pub async fn run(&self, task: &DownloadTask) -> WorkerOutcome {
        match self.attempt(task).await {
            Ok(outcome) => outcome,
            Err(SyncError::StaleCycle { cycle, .. }) => {
                debug!(cycle, "Superseded by a newer cycle, dropping result");
                WorkerOutcome::Superseded
            }
            Err(e) => self.fail_at_boundary(task, e).await,
        }
    }

    async fn attempt(&self, task: &DownloadTask) -> Result<WorkerOutcome> {
        let resource = self.ctx.resources.get(&task.resource_id).await?;

        if resource.cycle != task.cycle {
            return Err(SyncError::StaleCycle {
                resource_id: task.resource_id.to_string(),
                cycle: task.cycle,
            });
        }

        if resource.download_status != DownloadStatus::Pending {
            debug!(
                status = resource.download_status.as_str(),
                "Resource already settled for this cycle"
            );
            return Ok(WorkerOutcome::Superseded);
        }

        let dataset = self
            .ctx
            .datasets
            .find_by_id(&task.dataset_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity: "Dataset",
                id: task.dataset_id.to_string(),
            })?;

        let provider = self.ctx.provider_for(&task.user_id).await?;

        match &resource.target {
            ResourceTarget::Questionnaire => {
                self.fetch_questionnaire(task, &resource, &dataset, provider.as_ref())
                    .await
            }
            ResourceTarget::DirectFetch => {
                self.fetch_submissions(task, &resource, &dataset, provider.as_ref())
                    .await
            }
            ResourceTarget::ExportBacked { format, .. } => {
                self.poll_export(task, &resource, &dataset, provider.as_ref(), *format)
                    .await
            }
        }
    }

    async fn fetch_questionnaire(
        &self,
        task: &DownloadTask,
        resource: &SyncedResource,
        dataset: &Dataset,
        provider: &dyn SurveyProvider,
    ) -> Result<WorkerOutcome> {
        let content = match provider
            .download_questionnaire(&dataset.asset_id, QuestionnaireFormat::Xls)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                return self
                    .fail(task, None, format!("Error downloading questionnaire {}", e))
                    .await
            }
        };

        let path = self.materialize(dataset, resource, content).await?;
        self.complete(task, StatusPatch::complete(task.cycle).with_artifact_path(path))
            .await
    }

    async fn fetch_submissions(
        &self,
        task: &DownloadTask,
        resource: &SyncedResource,
        dataset: &Dataset,
        provider: &dyn SurveyProvider,
    ) -> Result<WorkerOutcome> {
        let fetched: std::result::Result<Vec<Submission>, _> =
            submission_stream(provider, &dataset.asset_id)
                .try_collect()
                .await;

        let submissions = match fetched {
            Ok(submissions) => submissions,
            Err(e) => {
                return self
                    .fail(task, None, format!("Error downloading json data {}", e))
                    .await
            }
        };

        let count = submissions.len() as u64;
        let text = match to_pretty_json(&submissions) {
            Ok(text) => text,
            Err(e) => {
                return self
                    .fail(task, None, format!("Error downloading json data {}", e))
                    .await
            }
        };

        debug!(submissions = count, "Submissions fetched");

        let path = self
            .materialize(dataset, resource, ArtifactContent::Text(text))
            .await?;
        self.complete(
            task,
            StatusPatch::complete(task.cycle)
                .with_submission_count(count)
                .with_artifact_path(path),
        )
        .await
    }

    async fn poll_export(
        &self,
        task: &DownloadTask,
        resource: &SyncedResource,
        dataset: &Dataset,
        provider: &dyn SurveyProvider,
        format: ExportFormat,
    ) -> Result<WorkerOutcome> {
        let export_id = resource.export_id.as_deref().ok_or_else(|| {
            SyncError::Validation(format!("Missing export id for resource {}", resource.id))
        })?;

        let export = match provider.get_export(&dataset.asset_id, export_id).await {
            Ok(export) => export,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Export status unavailable, polling again later");
                let last_status = serde_json::json!({ "error": e.to_string() });
                return self.retry_poll(task, resource, &last_status).await;
            }
            Err(e) => return Err(e.into()),
        };

        match export.status {
            ExportStatus::Complete => {
                let Some(url) = export.result.as_deref() else {
                    return self
                        .fail(
                            task,
                            None,
                            format!(
                                "Export error for resource {}. Last export status: {}",
                                resource.id, export.raw
                            ),
                        )
                        .await;
                };

                let content = match provider.download(url, format).await {
                    Ok(content) => content,
                    Err(e) => {
                        return self
                            .fail(task, None, format!("Error downloading data {}", e))
                            .await
                    }
                };

                let path = self.materialize(dataset, resource, content).await?;

                let submission_count = match provider.get_asset(&dataset.asset_id, true).await {
                    Ok(asset) => asset.submission_count,
                    Err(e) => {
                        warn!(error = %e, "Submission count unavailable, keeping previous snapshot");
                        resource.submission_count
                    }
                };

                self.complete(
                    task,
                    StatusPatch::complete(task.cycle)
                        .with_attempts(resource.download_attempts + 1)
                        .with_submission_count(submission_count)
                        .with_artifact_path(path),
                )
                .await
            }
            ExportStatus::Created | ExportStatus::Processing => {
                self.retry_poll(task, resource, &export.raw).await
            }
            ExportStatus::Error | ExportStatus::Unknown => {
                self.fail(
                    task,
                    None,
                    format!(
                        "Export error for resource {}. Last export status: {}",
                        resource.id, export.raw
                    ),
                )
                .await
            }
        }
    }

    /// Count one more poll and either re-enqueue or give up.
    async fn retry_poll(
        &self,
        task: &DownloadTask,
        resource: &SyncedResource,
        last_status: &serde_json::Value,
    ) -> Result<WorkerOutcome> {
        let attempts = resource.download_attempts + 1;

        if attempts > self.max_poll_attempts {
            return self
                .fail(
                    task,
                    Some(attempts),
                    format!(
                        "Failed to download data resource {}. Last export status: {}",
                        resource.id, last_status
                    ),
                )
                .await;
        }

        self.ctx
            .resources
            .patch_status(
                &task.resource_id,
                StatusPatch::new(task.cycle, DownloadStatus::Pending).with_attempts(attempts),
            )
            .await?;

        let delay = self.poll_backoff_step * attempts;

        info!(attempts, delay_secs = delay.as_secs(), "Export still processing");

        self.ctx.emit(SyncEvent::PollRetry {
            resource_id: task.resource_id.to_string(),
            attempts,
            delay_secs: delay.as_secs(),
        });

        self.ctx
            .schedule(task, delay, format!("Re-scheduling download: {}", attempts))
            .await?;

        Ok(WorkerOutcome::Rescheduled { attempts, delay })
    }

    async fn materialize(
        &self,
        dataset: &Dataset,
        resource: &SyncedResource,
        content: ArtifactContent,
    ) -> Result<String> {
        let file_name = resource.file_name(&dataset.asset_id);
        let stored = self
            .ctx
            .artifacts
            .write_artifact(&dataset.id.as_str(), &file_name, content)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let location = stored.location.to_string_lossy().into_owned();
        debug!(file = strip_path(&location), size = stored.size, "Artifact written");

        Ok(location)
    }

    async fn complete(&self, task: &DownloadTask, patch: StatusPatch) -> Result<WorkerOutcome> {
        let resource = self
            .ctx
            .resources
            .patch_status(&task.resource_id, patch)
            .await?;

        info!(attempts = resource.download_attempts, "Resource download complete");

        self.ctx.emit(SyncEvent::ResourceCompleted {
            resource_id: task.resource_id.to_string(),
            attempts: resource.download_attempts,
        });

        Ok(WorkerOutcome::Completed {
            attempts: resource.download_attempts,
        })
    }

    async fn fail(
        &self,
        task: &DownloadTask,
        attempts: Option<u32>,
        message: String,
    ) -> Result<WorkerOutcome> {
        let mut patch = StatusPatch::error(task.cycle, message.clone());
        if let Some(attempts) = attempts {
            patch = patch.with_attempts(attempts);
        }

        self.ctx
            .resources
            .patch_status(&task.resource_id, patch)
            .await?;

        error!(message = %message, "Resource download failed");

        self.ctx.emit(SyncEvent::ResourceFailed {
            resource_id: task.resource_id.to_string(),
            message: message.clone(),
        });

        Ok(WorkerOutcome::Failed(message))
    }

    async fn fail_at_boundary(&self, task: &DownloadTask, cause: SyncError) -> WorkerOutcome {
        let message = format!("Error downloading resource: {}", cause);
        error!(error = %cause, "Download attempt crashed");

        match self
            .ctx
            .resources
            .patch_status(&task.resource_id, StatusPatch::error(task.cycle, message.clone()))
            .await
        {
            Ok(_) => {
                self.ctx.emit(SyncEvent::ResourceFailed {
                    resource_id: task.resource_id.to_string(),
                    message: message.clone(),
                });
                WorkerOutcome::Failed(message)
            }
            Err(SyncError::StaleCycle { .. }) => WorkerOutcome::Superseded,
            Err(e) => {
                error!(error = %e, "Could not record download failure");
                WorkerOutcome::Failed(message)
            }
        }
    }
}

/// JSON with a four-space indent.
fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
