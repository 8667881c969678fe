//! Collaborators shared by the coordinator and the download worker.

use crate::repository::{DatasetRepository, ResourceRepository};
use crate::worker::{DownloadTask, DOWNLOAD_TASK};
use crate::{Result, SyncError};
use bridge_traits::background::{JobHandle, JobQueue, JobRequest};
use bridge_traits::storage::ArtifactStore;
use bridge_traits::survey::{SurveyProvider, SurveyProviderFactory};
use bridge_traits::time::Clock;
use core_auth::{CredentialResolver, UserId};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything a sync operation reaches outside its own arguments.
#[derive(Clone)]
pub struct SyncContext {
    pub resources: Arc<dyn ResourceRepository>,
    pub datasets: Arc<dyn DatasetRepository>,
    pub providers: Arc<dyn SurveyProviderFactory>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: Arc<dyn JobQueue>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

impl SyncContext {
    /// Provider authenticated as `user`.
    ///
    /// # Errors
    ///
    /// Returns `Auth` if the user has no registered token
    pub async fn provider_for(&self, user: &UserId) -> Result<Arc<dyn SurveyProvider>> {
        let token = self.credentials.token_for(user).await?;
        Ok(self.providers.connect(user.as_str(), &token)?)
    }

    /// Hand a download attempt to the job queue. Never waits for it to run.
    pub async fn schedule(
        &self,
        task: &DownloadTask,
        delay: Duration,
        title: impl Into<String>,
    ) -> Result<JobHandle> {
        let job = JobRequest::new(DOWNLOAD_TASK, task)
            .map_err(|e| SyncError::Queue(e.to_string()))?
            .with_title(title);

        let handle = self
            .queue
            .enqueue_after(delay, job)
            .await
            .map_err(|e| SyncError::Queue(e.to_string()))?;

        debug!(
            resource_id = %task.resource_id,
            cycle = task.cycle,
            delay_secs = delay.as_secs(),
            job = %handle,
            "Download scheduled"
        );

        self.emit(SyncEvent::ResourceScheduled {
            resource_id: task.resource_id.to_string(),
            delay_secs: delay.as_secs(),
        });

        Ok(handle)
    }

    /// Fire-and-forget; no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        self.events.emit(CoreEvent::Sync(event)).ok();
    }
}
