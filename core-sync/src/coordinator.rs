//! # Sync Coordinator
//!
//! Entry points that start synchronization cycles.
//!
//! ## Overview
//!
//! The coordinator never downloads anything itself. It decides which
//! resources take part in a cycle, creates their remote exports, persists
//! their `Pending` state and hands each one to the job queue as a
//! [`DownloadTask`].
//!
//! ## Workflow
//!
//! ### Initial Import
//! 1. Reject assets that already have a local dataset
//! 2. Plan the requested formats and validate the filter input
//! 3. Require a non-empty survey
//! 4. Create every export job
//! 5. Persist the dataset and its `Pending` resources
//! 6. Schedule one download per resource
//!
//! ### Refresh
//! 1. Refuse while a non-stalled cycle is still pending, unless forced
//! 2. Count new submissions against the lowest local snapshot
//! 3. Select data resources whose filters changed, or all of them when
//!    forced or when new submissions exist; the questionnaire always
//! 4. Recreate exports, then reset every selected resource, then schedule
//!
//! Scheduling starts only after every export exists and every reset is
//! persisted, so no worker can observe a half-prepared cycle.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{RefreshRequest, SyncCoordinator};
//!
//! # async fn example(coordinator: SyncCoordinator) -> core_sync::Result<()> {
//! let new = coordinator.check_for_updates("aBc123").await?;
//! if new > 0 {
//!     coordinator.refresh_all("aBc123", RefreshRequest::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::context::SyncContext;
use crate::dataset::Dataset;
use crate::planner::{self, FormatPlan, ImportPlan, RawFilterInput};
use crate::resource::{
    CycleReset, DatasetId, DateRange, DownloadStatus, FilterParams, ImportStatus, ResourceId,
    ResourceKind, ResourceTarget, SyncedResource,
};
use crate::worker::DownloadTask;
use crate::{Result, SyncError};
use bridge_traits::survey::{
    submission_stream, AssetMetadata, ExportFormat, Submission, SurveyProvider,
};
use core_auth::UserId;
use core_runtime::config::SyncConfig;
use core_runtime::events::SyncEvent;
use futures::TryStreamExt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Name of the questionnaire resource of every dataset.
pub const QUESTIONNAIRE_RESOURCE: &str = "questionnaire";

/// Options of a refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshRequest {
    /// Start a cycle even while one is pending, and refresh every resource
    pub force: bool,
    /// Filter edits merged over each resource's stored filters; absent keys keep their values
    pub filters: Option<RawFilterInput>,
}

impl RefreshRequest {
    pub fn forced() -> Self {
        Self {
            force: true,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: RawFilterInput) -> Self {
        self.filters = Some(filters);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub dataset: Dataset,
    pub resources: Vec<SyncedResource>,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub dataset_id: DatasetId,
    /// Remote total minus the lowest local snapshot
    pub new_submissions: i64,
    /// Resources reset and scheduled in this cycle
    pub scheduled: Vec<SyncedResource>,
}

/// A remote survey and the local dataset importing it, if any.
#[derive(Debug, Clone)]
pub struct SurveySummary {
    pub asset: AssetMetadata,
    pub dataset_id: Option<DatasetId>,
}

/// Submissions added remotely since the oldest local materialization.
///
/// Resources without a snapshot do not lower the floor.
pub fn new_submissions<'a, I>(resources: I, remote_total: u64) -> i64
where
    I: IntoIterator<Item = &'a SyncedResource>,
{
    let floor = resources
        .into_iter()
        .filter(|r| r.kind() == ResourceKind::Data && r.submission_count > 0)
        .map(|r| r.submission_count)
        .min()
        .unwrap_or(0);

    remote_total as i64 - floor as i64
}

pub struct SyncCoordinator {
    ctx: SyncContext,
    stale_after: Duration,
}

impl SyncCoordinator {
    pub fn new(ctx: SyncContext, config: &SyncConfig) -> Self {
        Self {
            ctx,
            stale_after: config.stale_after,
        }
    }

    /// Import a survey as a new dataset.
    ///
    /// An empty `requested_formats` takes the `formats` key of `filters`.
    ///
    /// # Errors
    ///
    /// - `AlreadyImported` / `Duplicate` if the asset has a local dataset
    /// - `RemoteValidation` for an unknown format or a rejected export
    /// - `Validation` for malformed filter input
    /// - `EmptySurvey` if the survey has no submissions
    /// - `Auth` if `user` has no usable token
    #[instrument(skip(self, requested_formats, filters), fields(asset_id = %asset_id, user_id = %user))]
    pub async fn initial_import(
        &self,
        asset_id: &str,
        requested_formats: &[String],
        filters: &RawFilterInput,
        user: &UserId,
    ) -> Result<ImportOutcome> {
        if let Some(existing) = self.ctx.datasets.find_by_asset(asset_id).await? {
            return Err(SyncError::AlreadyImported {
                asset_id: asset_id.to_string(),
                dataset_id: existing.id.to_string(),
            });
        }

        let plan = if requested_formats.is_empty() {
            planner::plan_import(filters)?
        } else {
            ImportPlan {
                include_questionnaire: planner::include_questionnaire(filters)?,
                formats: planner::plan(requested_formats, filters)?,
            }
        };

        let provider = self.ctx.provider_for(user).await?;
        let asset = provider.get_asset(asset_id, true).await?;

        if asset.submission_count == 0 {
            return Err(SyncError::EmptySurvey {
                asset_id: asset_id.to_string(),
            });
        }

        let now = self.ctx.clock.now();
        let dataset = Dataset::from_asset(&asset, user.clone(), now);

        let date_range = if plan.formats.is_empty() {
            None
        } else {
            submission_date_range(provider.as_ref(), asset_id).await?
        };

        let mut resources = Vec::with_capacity(plan.formats.len() + 1);
        if plan.include_questionnaire {
            resources.push(SyncedResource::new(
                dataset.id,
                QUESTIONNAIRE_RESOURCE,
                ResourceTarget::Questionnaire,
                now,
            ));
        }

        // Exports first: nothing is persisted if the platform rejects one
        for FormatPlan { format, params, .. } in plan.formats {
            let mut resource = SyncedResource::new(
                dataset.id,
                format.as_str(),
                ResourceTarget::for_format(format, params.clone()),
                now,
            )
            .with_date_range(date_range.clone());

            if resource.target.needs_export() {
                let export_id =
                    create_export(provider.as_ref(), asset_id, format, &params).await?;
                resource = resource.with_export_id(export_id);
            }

            resources.push(resource);
        }

        self.ctx.datasets.insert(&dataset).await?;
        for resource in &resources {
            self.ctx.resources.create(resource).await?;
        }

        info!(
            dataset_id = %dataset.id,
            resources = resources.len(),
            "Survey imported"
        );

        self.start_cycle(&dataset, &resources).await?;

        Ok(ImportOutcome { dataset, resources })
    }

    /// Submissions added remotely since the oldest local materialization.
    ///
    /// Zero or negative means there is nothing new.
    #[instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn check_for_updates(&self, asset_id: &str) -> Result<i64> {
        let dataset = self.dataset_for(asset_id).await?;
        let resources = self.ctx.resources.find_by_dataset(&dataset.id).await?;

        let provider = self.ctx.provider_for(&dataset.created_by).await?;
        let asset = provider.get_asset(asset_id, true).await?;

        let new = new_submissions(&resources, asset.submission_count);
        debug!(remote_total = asset.submission_count, new, "Checked for updates");

        Ok(new)
    }

    /// Start a refresh cycle for a dataset.
    ///
    /// # Errors
    ///
    /// - `SyncInProgress` while a non-stalled cycle is pending and `force` is off
    /// - `NotFound` / `Duplicate` if the asset does not map to exactly one dataset
    /// - `RemoteValidation` if the platform rejects a recreated export
    #[instrument(skip(self, request), fields(asset_id = %asset_id, force = request.force))]
    pub async fn refresh_all(
        &self,
        asset_id: &str,
        request: RefreshRequest,
    ) -> Result<RefreshOutcome> {
        let dataset = self.dataset_for(asset_id).await?;
        let resources = self.ctx.resources.find_by_dataset(&dataset.id).await?;

        let status = ImportStatus::aggregate(&resources, self.ctx.clock.now(), self.stale_after);
        if status == ImportStatus::Pending && !request.force {
            return Err(SyncError::SyncInProgress {
                dataset_id: dataset.id.to_string(),
            });
        }
        if status == ImportStatus::Stalled {
            warn!(dataset_id = %dataset.id, "Superseding a stalled cycle");
        }

        let provider = self.ctx.provider_for(&dataset.created_by).await?;
        let asset = provider.get_asset(asset_id, true).await?;
        let new = new_submissions(&resources, asset.submission_count);
        let refresh_data = request.force || new > 0;

        let mut selected: Vec<(&SyncedResource, Option<FilterParams>)> = Vec::new();
        for resource in &resources {
            match &resource.target {
                ResourceTarget::Questionnaire => selected.push((resource, None)),
                ResourceTarget::DirectFetch => {
                    if refresh_data {
                        selected.push((resource, None));
                    }
                }
                ResourceTarget::ExportBacked { filters, .. } => {
                    let desired = match &request.filters {
                        Some(raw) => planner::apply_filter_edits(filters, raw)?,
                        None => filters.clone(),
                    };
                    let changed = filters.diff(&desired);
                    if !changed.is_empty() {
                        debug!(resource_id = %resource.id, ?changed, "Filters changed");
                    }
                    if refresh_data || !changed.is_empty() {
                        selected.push((resource, Some(desired)));
                    }
                }
            }
        }

        let resets = self
            .prepare_resets(provider.as_ref(), asset_id, &selected)
            .await?;

        let mut scheduled = Vec::with_capacity(resets.len());
        for (id, reset) in resets {
            scheduled.push(self.ctx.resources.reset_for_cycle(&id, reset).await?);
        }

        info!(
            dataset_id = %dataset.id,
            new_submissions = new,
            resources = scheduled.len(),
            "Refresh cycle prepared"
        );

        self.start_cycle(&dataset, &scheduled).await?;

        Ok(RefreshOutcome {
            dataset_id: dataset.id,
            new_submissions: new,
            scheduled,
        })
    }

    /// Run one resource through a new cycle on its own.
    ///
    /// Filter edits in `request` apply to this resource only, on top of its
    /// stored filters.
    ///
    /// # Errors
    ///
    /// - `SyncInProgress` while the resource is pending, not stalled, and `force` is off
    /// - `Validation` for malformed filter input
    /// - `RemoteValidation` if the platform rejects the recreated export
    #[instrument(skip(self, request), fields(resource_id = %resource_id, force = request.force))]
    pub async fn refresh_resource(
        &self,
        resource_id: &ResourceId,
        request: RefreshRequest,
    ) -> Result<SyncedResource> {
        let resource = self.ctx.resources.get(resource_id).await?;

        if resource.download_status == DownloadStatus::Pending && !request.force {
            if !resource.is_stale(self.ctx.clock.now(), self.stale_after) {
                return Err(SyncError::SyncInProgress {
                    dataset_id: resource.dataset_id.to_string(),
                });
            }
            warn!(resource_id = %resource.id, "Superseding a stalled download");
        }

        let dataset = self
            .ctx
            .datasets
            .find_by_id(&resource.dataset_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity: "Dataset",
                id: resource.dataset_id.to_string(),
            })?;

        let filters = match (resource.target.filters(), &request.filters) {
            (Some(stored), Some(raw)) => Some(planner::apply_filter_edits(stored, raw)?),
            (stored, _) => stored.cloned(),
        };

        let provider = self.ctx.provider_for(&dataset.created_by).await?;

        let mut resets = self
            .prepare_resets(provider.as_ref(), &dataset.asset_id, &[(&resource, filters)])
            .await?;

        let (id, reset) = resets.pop().ok_or_else(|| {
            SyncError::Validation(format!("Resource {} could not be prepared", resource_id))
        })?;
        let next = self.ctx.resources.reset_for_cycle(&id, reset).await?;

        self.start_cycle(&dataset, std::slice::from_ref(&next)).await?;

        Ok(next)
    }

    /// Every survey visible to `user`, paired with its local dataset.
    ///
    /// Assets mapped to several datasets report the oldest.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn list_surveys(&self, user: &UserId) -> Result<Vec<SurveySummary>> {
        let provider = self.ctx.provider_for(user).await?;
        let assets = provider.list_surveys().await?;

        let mut summaries = Vec::with_capacity(assets.len());
        for asset in assets {
            let dataset_id = self
                .ctx
                .datasets
                .find_all_by_asset(&asset.uid)
                .await?
                .first()
                .map(|d| d.id);
            summaries.push(SurveySummary { asset, dataset_id });
        }

        Ok(summaries)
    }

    /// Aggregate status of the dataset importing `asset_id`.
    pub async fn import_status(&self, asset_id: &str) -> Result<ImportStatus> {
        let dataset = self.dataset_for(asset_id).await?;
        self.ctx.resources.import_status(&dataset.id).await
    }

    /// Per-resource state for drill-down.
    pub async fn resources(&self, asset_id: &str) -> Result<Vec<SyncedResource>> {
        let dataset = self.dataset_for(asset_id).await?;
        self.ctx.resources.find_by_dataset(&dataset.id).await
    }

    async fn dataset_for(&self, asset_id: &str) -> Result<Dataset> {
        self.ctx
            .datasets
            .find_by_asset(asset_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity: "Dataset for asset",
                id: asset_id.to_string(),
            })
    }

    /// Remote side of a cycle start: new exports and the date range.
    ///
    /// Nothing local is written, so a failure leaves every resource untouched.
    async fn prepare_resets(
        &self,
        provider: &dyn SurveyProvider,
        asset_id: &str,
        selected: &[(&SyncedResource, Option<FilterParams>)],
    ) -> Result<Vec<(ResourceId, CycleReset)>> {
        let touches_data = selected
            .iter()
            .any(|(resource, _)| resource.kind() == ResourceKind::Data);
        let date_range = if touches_data {
            submission_date_range(provider, asset_id).await?
        } else {
            None
        };

        let mut resets = Vec::with_capacity(selected.len());
        for (resource, filters) in selected {
            let mut reset = CycleReset {
                date_range: date_range.clone(),
                ..CycleReset::default()
            };

            if let ResourceTarget::ExportBacked { format, filters: stored } = &resource.target {
                let params = filters.clone().unwrap_or_else(|| stored.clone());
                reset.export_id = Some(create_export(provider, asset_id, *format, &params).await?);
                reset.filters = Some(params);
            }

            resets.push((resource.id, reset));
        }

        Ok(resets)
    }

    /// Schedule every resource of a prepared cycle.
    async fn start_cycle(&self, dataset: &Dataset, resources: &[SyncedResource]) -> Result<()> {
        for resource in resources {
            debug_assert_eq!(resource.download_status, DownloadStatus::Pending);
            let task = DownloadTask::for_resource(resource, dataset.created_by.clone());
            self.ctx
                .schedule(
                    &task,
                    Duration::ZERO,
                    format!("Preparing to update {} resource", resource.name),
                )
                .await?;
        }

        self.ctx.emit(SyncEvent::CycleStarted {
            dataset_id: dataset.id.to_string(),
            asset_id: dataset.asset_id.clone(),
            resources: resources.len(),
        });

        Ok(())
    }
}

async fn create_export(
    provider: &dyn SurveyProvider,
    asset_id: &str,
    format: ExportFormat,
    params: &FilterParams,
) -> Result<String> {
    let request = params.to_export_request(format);
    let export = provider.create_export(asset_id, &request).await?;

    if export.uid.is_empty() {
        return Err(SyncError::RemoteValidation(format!(
            "Export for {} was created without an id: {}",
            asset_id, export.raw
        )));
    }

    debug!(asset_id = %asset_id, format = format.as_str(), export_id = %export.uid, "Export created");

    Ok(export.uid)
}

/// First and last submission time of an asset.
async fn submission_date_range(
    provider: &dyn SurveyProvider,
    asset_id: &str,
) -> Result<Option<DateRange>> {
    let submissions: Vec<Submission> = submission_stream(provider, asset_id)
        .try_collect()
        .await?;

    Ok(DateRange::from_times(
        submissions.iter().filter_map(Submission::submission_time),
    ))
}
