//! # Sync Repositories
//!
//! Database persistence for datasets and their synced resources.
//!
//! ## Overview
//!
//! Writes are single-record patches; there is no cross-resource
//! transaction. Every resource write is a compare-and-set on
//! `(id, cycle)` so a worker from a superseded cycle cannot overwrite the
//! state of the current one.

use crate::dataset::Dataset;
use crate::resource::{
    CycleReset, DatasetId, DateRange, DownloadStatus, ImportStatus, ResourceId, ResourceKind,
    StatusPatch, SyncedResource,
};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pending resources untouched for this long are classified stalled.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository trait for synced resource persistence
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn create(&self, resource: &SyncedResource) -> Result<SyncedResource>;

    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<SyncedResource>>;

    /// Like [`find_by_id`](Self::find_by_id) but a missing resource is an error.
    async fn get(&self, id: &ResourceId) -> Result<SyncedResource> {
        self.find_by_id(id).await?.ok_or_else(|| SyncError::NotFound {
            entity: "Resource",
            id: id.to_string(),
        })
    }

    async fn find_by_dataset(&self, dataset_id: &DatasetId) -> Result<Vec<SyncedResource>>;

    /// Record a worker outcome for the cycle named in `patch`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the resource does not exist
    /// - `StaleCycle` if a newer cycle owns the resource
    /// - `InvalidStateTransition` / `Validation` if the patch breaks a status rule
    async fn patch_status(&self, id: &ResourceId, patch: StatusPatch) -> Result<SyncedResource>;

    /// Start a new cycle: back to pending, attempts zeroed, cycle bumped.
    async fn reset_for_cycle(&self, id: &ResourceId, reset: CycleReset) -> Result<SyncedResource>;

    /// Aggregate status of every resource of a dataset.
    async fn import_status(&self, dataset_id: &DatasetId) -> Result<ImportStatus>;
}

/// Repository trait for dataset persistence
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    async fn insert(&self, dataset: &Dataset) -> Result<()>;

    async fn find_by_id(&self, id: &DatasetId) -> Result<Option<Dataset>>;

    /// Every local dataset mapped to an asset, oldest first.
    async fn find_all_by_asset(&self, asset_id: &str) -> Result<Vec<Dataset>>;

    /// The dataset mapped to an asset.
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if more than one dataset maps to the asset
    async fn find_by_asset(&self, asset_id: &str) -> Result<Option<Dataset>> {
        let mut datasets = self.find_all_by_asset(asset_id).await?;

        match datasets.len() {
            0 | 1 => Ok(datasets.pop()),
            count => Err(SyncError::Duplicate {
                asset_id: asset_id.to_string(),
                count,
            }),
        }
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of ResourceRepository
pub struct SqliteResourceRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl SqliteResourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Clock stamping `last_updated` and judging staleness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Database row representation of a synced resource
#[derive(Debug, FromRow)]
struct ResourceRow {
    id: String,
    dataset_id: String,
    name: String,
    kind: String,
    target: String,
    export_id: Option<String>,
    download_status: String,
    download_attempts: i64,
    submission_count: i64,
    cycle: i64,
    error_message: Option<String>,
    artifact_path: Option<String>,
    date_range_start: Option<String>,
    date_range_end: Option<String>,
    last_updated: i64,
    created_at: i64,
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SyncError::Database(format!("Invalid timestamp: {}", millis)))
}

impl TryFrom<ResourceRow> for SyncedResource {
    type Error = SyncError;

    fn try_from(row: ResourceRow) -> Result<Self> {
        let target: crate::resource::ResourceTarget = serde_json::from_str(&row.target)
            .map_err(|e| SyncError::Database(format!("Invalid resource target: {}", e)))?;

        let kind: ResourceKind = row.kind.parse()?;
        if kind != target.kind() {
            return Err(SyncError::Database(format!(
                "Resource {} kind {} does not match its target",
                row.id, row.kind
            )));
        }

        let date_range = match (row.date_range_start, row.date_range_end) {
            (Some(start), Some(end)) => Some(DateRange { start, end }),
            _ => None,
        };

        Ok(SyncedResource {
            id: ResourceId::from_string(&row.id)?,
            dataset_id: DatasetId::from_string(&row.dataset_id)?,
            name: row.name,
            target,
            export_id: row.export_id,
            download_status: row.download_status.parse()?,
            download_attempts: row.download_attempts.max(0) as u32,
            submission_count: row.submission_count.max(0) as u64,
            cycle: row.cycle,
            error_message: row.error_message,
            artifact_path: row.artifact_path,
            date_range,
            last_updated: from_millis(row.last_updated)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const RESOURCE_COLUMNS: &str = r#"
    id, dataset_id, name, kind, target, export_id,
    download_status, download_attempts, submission_count, cycle,
    error_message, artifact_path, date_range_start, date_range_end,
    last_updated, created_at
"#;

#[async_trait]
impl ResourceRepository for SqliteResourceRepository {
    async fn create(&self, resource: &SyncedResource) -> Result<SyncedResource> {
        let target = serde_json::to_string(&resource.target)
            .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO synced_resources (
                id, dataset_id, name, kind, format, target, export_id,
                download_status, download_attempts, submission_count, cycle,
                error_message, artifact_path, date_range_start, date_range_end,
                last_updated, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(resource.id.as_str())
        .bind(resource.dataset_id.as_str())
        .bind(&resource.name)
        .bind(resource.kind().as_str())
        .bind(resource.target.format_label())
        .bind(target)
        .bind(&resource.export_id)
        .bind(resource.download_status.as_str())
        .bind(resource.download_attempts as i64)
        .bind(resource.submission_count as i64)
        .bind(resource.cycle)
        .bind(&resource.error_message)
        .bind(&resource.artifact_path)
        .bind(resource.date_range.as_ref().map(|r| r.start.clone()))
        .bind(resource.date_range.as_ref().map(|r| r.end.clone()))
        .bind(resource.last_updated.timestamp_millis())
        .bind(resource.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(resource_id = %resource.id, kind = resource.kind().as_str(), "Resource created");

        Ok(resource.clone())
    }

    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<SyncedResource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {} FROM synced_resources WHERE id = ?",
            RESOURCE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncedResource::try_from).transpose()
    }

    async fn find_by_dataset(&self, dataset_id: &DatasetId) -> Result<Vec<SyncedResource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {} FROM synced_resources WHERE dataset_id = ? ORDER BY created_at, name",
            RESOURCE_COLUMNS
        ))
        .bind(dataset_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SyncedResource::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn patch_status(&self, id: &ResourceId, patch: StatusPatch) -> Result<SyncedResource> {
        let current = self.get(id).await?;

        if current.cycle != patch.expected_cycle {
            return Err(SyncError::StaleCycle {
                resource_id: id.to_string(),
                cycle: patch.expected_cycle,
            });
        }

        current.validate_patch(&patch)?;

        let mut next = current.clone();
        next.download_status = patch.status;
        next.download_attempts = patch.attempts.unwrap_or(current.download_attempts);
        next.submission_count = patch.submission_count.unwrap_or(current.submission_count);
        if patch.export_id.is_some() {
            next.export_id = patch.export_id;
        }
        if patch.artifact_path.is_some() {
            next.artifact_path = patch.artifact_path;
        }
        next.error_message = match patch.status {
            DownloadStatus::Complete => None,
            _ => patch.error_message.or(current.error_message),
        };
        next.last_updated = self.clock.now();

        let result = sqlx::query(
            r#"
            UPDATE synced_resources SET
                download_status = ?,
                download_attempts = ?,
                submission_count = ?,
                export_id = ?,
                artifact_path = ?,
                error_message = ?,
                last_updated = ?
            WHERE id = ? AND cycle = ? AND download_status = 'pending'
            "#,
        )
        .bind(next.download_status.as_str())
        .bind(next.download_attempts as i64)
        .bind(next.submission_count as i64)
        .bind(&next.export_id)
        .bind(&next.artifact_path)
        .bind(&next.error_message)
        .bind(next.last_updated.timestamp_millis())
        .bind(id.as_str())
        .bind(patch.expected_cycle)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        // Lost a race with a reset or another terminal write
        if result.rows_affected() == 0 {
            return Err(SyncError::StaleCycle {
                resource_id: id.to_string(),
                cycle: patch.expected_cycle,
            });
        }

        debug!(
            resource_id = %id,
            status = next.download_status.as_str(),
            attempts = next.download_attempts,
            "Resource status patched"
        );

        Ok(next)
    }

    async fn reset_for_cycle(&self, id: &ResourceId, reset: CycleReset) -> Result<SyncedResource> {
        let current = self.get(id).await?;
        let next = reset.apply(&current, self.clock.now())?;

        let target = serde_json::to_string(&next.target)
            .map_err(|e| SyncError::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE synced_resources SET
                target = ?,
                export_id = ?,
                download_status = ?,
                download_attempts = 0,
                cycle = ?,
                error_message = NULL,
                date_range_start = ?,
                date_range_end = ?,
                last_updated = ?
            WHERE id = ? AND cycle = ?
            "#,
        )
        .bind(target)
        .bind(&next.export_id)
        .bind(next.download_status.as_str())
        .bind(next.cycle)
        .bind(next.date_range.as_ref().map(|r| r.start.clone()))
        .bind(next.date_range.as_ref().map(|r| r.end.clone()))
        .bind(next.last_updated.timestamp_millis())
        .bind(id.as_str())
        .bind(current.cycle)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::StaleCycle {
                resource_id: id.to_string(),
                cycle: current.cycle,
            });
        }

        debug!(resource_id = %id, cycle = next.cycle, "Resource reset for new cycle");

        Ok(next)
    }

    async fn import_status(&self, dataset_id: &DatasetId) -> Result<ImportStatus> {
        let resources = self.find_by_dataset(dataset_id).await?;
        Ok(ImportStatus::aggregate(
            &resources,
            self.clock.now(),
            self.stale_after,
        ))
    }
}

/// SQLite implementation of DatasetRepository
pub struct SqliteDatasetRepository {
    pool: SqlitePool,
}

impl SqliteDatasetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a dataset
#[derive(Debug, FromRow)]
struct DatasetRow {
    id: String,
    asset_id: String,
    title: String,
    owner: String,
    notes: String,
    sector: Option<String>,
    country: Option<String>,
    created_by: String,
    created_at: i64,
}

fn decode_labeled(
    column: &str,
    value: Option<String>,
) -> Result<Option<bridge_traits::survey::LabeledValue>> {
    value
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| SyncError::Database(format!("Invalid {}: {}", column, e)))
        })
        .transpose()
}

fn encode_labeled(value: &Option<bridge_traits::survey::LabeledValue>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(|e| SyncError::Database(e.to_string())))
        .transpose()
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = SyncError;

    fn try_from(row: DatasetRow) -> Result<Self> {
        Ok(Dataset {
            id: DatasetId::from_string(&row.id)?,
            asset_id: row.asset_id,
            title: row.title,
            owner: row.owner,
            notes: row.notes,
            sector: decode_labeled("sector", row.sector)?,
            country: decode_labeled("country", row.country)?,
            created_by: UserId::new(row.created_by),
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[async_trait]
impl DatasetRepository for SqliteDatasetRepository {
    async fn insert(&self, dataset: &Dataset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO datasets (
                id, asset_id, title, owner, notes, sector, country, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(dataset.id.as_str())
        .bind(&dataset.asset_id)
        .bind(&dataset.title)
        .bind(&dataset.owner)
        .bind(&dataset.notes)
        .bind(encode_labeled(&dataset.sector)?)
        .bind(encode_labeled(&dataset.country)?)
        .bind(dataset.created_by.as_str())
        .bind(dataset.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &DatasetId) -> Result<Option<Dataset>> {
        let row = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT id, asset_id, title, owner, notes, sector, country, created_by, created_at
            FROM datasets
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(Dataset::try_from).transpose()
    }

    async fn find_all_by_asset(&self, asset_id: &str) -> Result<Vec<Dataset>> {
        let rows = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT id, asset_id, title, owner, notes, sector, country, created_by, created_at
            FROM datasets
            WHERE asset_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Dataset::try_from)
            .collect::<Result<Vec<_>>>()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::resource::{FilterParams, ResourceTarget};
    use bridge_traits::survey::ExportFormat;
    use bridge_traits::time::FixedClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        resources: SqliteResourceRepository,
        datasets: SqliteDatasetRepository,
        clock: Arc<FixedClock>,
        dataset: Dataset,
    }

    async fn fixture() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(FixedClock::new(t0()));
        let resources = SqliteResourceRepository::new(pool.clone()).with_clock(clock.clone());
        let datasets = SqliteDatasetRepository::new(pool);

        let dataset = Dataset {
            id: DatasetId::new(),
            asset_id: "a1".to_string(),
            title: "Household survey".to_string(),
            owner: "officer".to_string(),
            notes: String::new(),
            sector: None,
            country: None,
            created_by: UserId::new("officer"),
            created_at: t0(),
        };
        datasets.insert(&dataset).await.unwrap();

        Fixture {
            resources,
            datasets,
            clock,
            dataset,
        }
    }

    fn csv(dataset: &Dataset) -> SyncedResource {
        SyncedResource::new(
            dataset.id,
            "csv",
            ResourceTarget::for_format(ExportFormat::Csv, FilterParams::default()),
            t0(),
        )
        .with_export_id("e1")
    }

    #[tokio::test]
    async fn test_create_and_find_resource() {
        let f = fixture().await;
        let resource = csv(&f.dataset).with_date_range(Some(DateRange {
            start: "2026-01-01".to_string(),
            end: "2026-02-01".to_string(),
        }));
        f.resources.create(&resource).await.unwrap();

        let found = f.resources.get(&resource.id).await.unwrap();
        assert_eq!(found, resource);

        let listed = f.resources.find_by_dataset(&f.dataset.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_resource_is_not_found() {
        let f = fixture().await;
        let err = f.resources.get(&ResourceId::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { entity: "Resource", .. }));
    }

    #[tokio::test]
    async fn test_patch_refreshes_last_updated() {
        let f = fixture().await;
        let resource = csv(&f.dataset);
        f.resources.create(&resource).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(3));
        let patched = f
            .resources
            .patch_status(
                &resource.id,
                StatusPatch::new(0, DownloadStatus::Pending).with_attempts(1),
            )
            .await
            .unwrap();

        assert_eq!(patched.download_attempts, 1);
        assert_eq!(patched.last_updated, t0() + chrono::Duration::minutes(3));
        assert_eq!(f.resources.get(&resource.id).await.unwrap(), patched);
    }

    #[tokio::test]
    async fn test_complete_clears_error_and_records_snapshot() {
        let f = fixture().await;
        let resource = csv(&f.dataset);
        f.resources.create(&resource).await.unwrap();

        f.resources
            .patch_status(
                &resource.id,
                StatusPatch::new(0, DownloadStatus::Pending)
                    .with_attempts(1)
                    .with_error("transient"),
            )
            .await
            .unwrap();

        let done = f
            .resources
            .patch_status(
                &resource.id,
                StatusPatch::complete(0)
                    .with_attempts(2)
                    .with_submission_count(100)
                    .with_artifact_path("/srv/a/csv__a1_data.csv"),
            )
            .await
            .unwrap();

        assert_eq!(done.download_status, DownloadStatus::Complete);
        assert_eq!(done.submission_count, 100);
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn test_terminal_resource_cannot_be_patched() {
        let f = fixture().await;
        let resource = csv(&f.dataset);
        f.resources.create(&resource).await.unwrap();
        f.resources
            .patch_status(&resource.id, StatusPatch::error(0, "boom"))
            .await
            .unwrap();

        let err = f
            .resources
            .patch_status(&resource.id, StatusPatch::complete(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_patch_without_export_id_is_validation_error() {
        let f = fixture().await;
        let mut resource = csv(&f.dataset);
        resource.export_id = None;
        f.resources.create(&resource).await.unwrap();

        let err = f
            .resources
            .patch_status(&resource.id, StatusPatch::complete(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_superseded_cycle_write_is_fenced() {
        let f = fixture().await;
        let resource = csv(&f.dataset);
        f.resources.create(&resource).await.unwrap();

        let reset = f
            .resources
            .reset_for_cycle(
                &resource.id,
                CycleReset {
                    export_id: Some("e2".to_string()),
                    ..CycleReset::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reset.cycle, 1);

        let err = f
            .resources
            .patch_status(&resource.id, StatusPatch::complete(0).with_attempts(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleCycle { cycle: 0, .. }));

        let stored = f.resources.get(&resource.id).await.unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Pending);
        assert_eq!(stored.export_id.as_deref(), Some("e2"));
    }

    #[tokio::test]
    async fn test_reset_returns_error_resource_to_pending() {
        let f = fixture().await;
        let resource = csv(&f.dataset);
        f.resources.create(&resource).await.unwrap();
        f.resources
            .patch_status(
                &resource.id,
                StatusPatch::error(0, "boom").with_attempts(6),
            )
            .await
            .unwrap();

        let edited = FilterParams {
            hierarchy_in_labels: false,
            ..FilterParams::default()
        };
        let next = f
            .resources
            .reset_for_cycle(
                &resource.id,
                CycleReset {
                    export_id: Some("e2".to_string()),
                    filters: Some(edited.clone()),
                    date_range: None,
                },
            )
            .await
            .unwrap();

        let stored = f.resources.get(&resource.id).await.unwrap();
        assert_eq!(stored, next);
        assert_eq!(stored.download_attempts, 0);
        assert_eq!(stored.download_status, DownloadStatus::Pending);
        assert_eq!(stored.target.filters(), Some(&edited));
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_import_status_reports_stalled_after_threshold() {
        let f = fixture().await;
        f.resources.create(&csv(&f.dataset)).await.unwrap();

        assert_eq!(
            f.resources.import_status(&f.dataset.id).await.unwrap(),
            ImportStatus::Pending
        );

        f.clock.advance(chrono::Duration::minutes(61));
        assert_eq!(
            f.resources.import_status(&f.dataset.id).await.unwrap(),
            ImportStatus::Stalled
        );

        // stalled is derived; storage still says pending
        let stored = f.resources.find_by_dataset(&f.dataset.id).await.unwrap();
        assert_eq!(stored[0].download_status, DownloadStatus::Pending);
    }

    #[tokio::test]
    async fn test_dataset_lookup_by_asset() {
        let f = fixture().await;

        let found = f.datasets.find_by_asset("a1").await.unwrap().unwrap();
        assert_eq!(found, f.dataset);
        assert!(f.datasets.find_by_asset("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dataset_duplicate_detection() {
        let f = fixture().await;
        let mut twin = f.dataset.clone();
        twin.id = DatasetId::new();
        f.datasets.insert(&twin).await.unwrap();

        let err = f.datasets.find_by_asset("a1").await.unwrap_err();
        assert!(matches!(err, SyncError::Duplicate { count: 2, .. }));
        assert_eq!(f.datasets.find_all_by_asset("a1").await.unwrap().len(), 2);
    }
}
