//! # Synced Resource Model
//!
//! The local record of one downloadable artifact derived from a survey and
//! the rules its status follows.
//!
//! ## State Machine
//!
//! ```text
//! Pending(n) → Complete
//!     │  ↓
//!     │  Pending(n + 1)   (export still processing)
//!     └→ Error
//! ```
//!
//! Only a cycle reset returns a terminal resource to `Pending`. Every reset
//! bumps `cycle`; writes carry the cycle they were scheduled for and are
//! refused once a newer cycle owns the resource.

use crate::{Result, SyncError};
use bridge_traits::survey::{ExportFormat, ExportRequest, QuestionnaireFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// # Errors
            ///
            /// Returns an error if the string is not a valid UUID
            pub fn from_string(s: &str) -> Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| SyncError::Validation(format!("Invalid {}: {}", $label, e)))
            }

            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a synced resource
    ResourceId,
    "resource id"
);

uuid_id!(
    /// Unique identifier for a local dataset
    DatasetId,
    "dataset id"
);

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Questionnaire,
    Data,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Questionnaire => "questionnaire",
            ResourceKind::Data => "data",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "questionnaire" => Ok(ResourceKind::Questionnaire),
            "data" => Ok(ResourceKind::Data),
            _ => Err(SyncError::Database(format!("Invalid resource kind: {}", s))),
        }
    }
}

/// Persisted download status. "Stalled" is never stored; see [`ImportStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Complete,
    Error,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Error => "error",
        }
    }
}

impl FromStr for DownloadStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DownloadStatus::Pending),
            "complete" => Ok(DownloadStatus::Complete),
            "error" => Ok(DownloadStatus::Error),
            _ => Err(SyncError::Database(format!("Invalid download status: {}", s))),
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dataset-level classification read by the UI.
///
/// Precedence is `Error > Stalled > Pending > Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Error,
    Stalled,
    Pending,
    Complete,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Error => "error",
            ImportStatus::Stalled => "stalled",
            ImportStatus::Pending => "pending",
            ImportStatus::Complete => "complete",
        }
    }

    /// Classify a dataset from its resources. An empty set is `Complete`.
    pub fn aggregate<'a, I>(resources: I, now: DateTime<Utc>, stale_after: Duration) -> Self
    where
        I: IntoIterator<Item = &'a SyncedResource>,
    {
        let mut stalled = false;
        let mut pending = false;

        for resource in resources {
            match resource.download_status {
                DownloadStatus::Error => return ImportStatus::Error,
                DownloadStatus::Pending if resource.is_stale(now, stale_after) => stalled = true,
                DownloadStatus::Pending => pending = true,
                DownloadStatus::Complete => {}
            }
        }

        if stalled {
            ImportStatus::Stalled
        } else if pending {
            ImportStatus::Pending
        } else {
            ImportStatus::Complete
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Filter Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultipleSelect {
    #[default]
    Both,
    Summary,
    Details,
}

impl MultipleSelect {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultipleSelect::Both => "both",
            MultipleSelect::Summary => "summary",
            MultipleSelect::Details => "details",
        }
    }
}

impl FromStr for MultipleSelect {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(MultipleSelect::Both),
            "summary" => Ok(MultipleSelect::Summary),
            "details" => Ok(MultipleSelect::Details),
            other => Err(SyncError::Validation(format!(
                "multiple_select must be one of both, summary, details (got {})",
                other
            ))),
        }
    }
}

/// Parameters submitted with an export and kept for diffing later edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub fields_from_all_versions: bool,
    pub group_sep: String,
    pub hierarchy_in_labels: bool,
    pub multiple_select: MultipleSelect,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Mongo-style predicate on submissions
    #[serde(default)]
    pub query: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            fields_from_all_versions: true,
            group_sep: "/".to_string(),
            hierarchy_in_labels: true,
            multiple_select: MultipleSelect::Both,
            fields: Vec::new(),
            query: None,
        }
    }
}

impl FilterParams {
    /// Names of the keys whose values differ. Empty when equal.
    ///
    /// An empty query and an absent one compare equal.
    pub fn diff(&self, other: &FilterParams) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if self.fields_from_all_versions != other.fields_from_all_versions {
            changed.push("fields_from_all_versions");
        }
        if self.group_sep != other.group_sep {
            changed.push("group_sep");
        }
        if self.hierarchy_in_labels != other.hierarchy_in_labels {
            changed.push("hierarchy_in_labels");
        }
        if self.multiple_select != other.multiple_select {
            changed.push("multiple_select");
        }
        if self.fields != other.fields {
            changed.push("fields");
        }
        if self.effective_query() != other.effective_query() {
            changed.push("query");
        }

        changed
    }

    fn effective_query(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.query.as_ref().filter(|q| !q.is_empty())
    }

    /// Export payload for `format`. `lang` is always `_default` and `flatten` always on.
    pub fn to_export_request(&self, format: ExportFormat) -> ExportRequest {
        ExportRequest {
            format,
            fields_from_all_versions: self.fields_from_all_versions,
            group_sep: self.group_sep.clone(),
            hierarchy_in_labels: self.hierarchy_in_labels,
            lang: "_default".to_string(),
            multiple_select: self.multiple_select.as_str().to_string(),
            flatten: true,
            query: self
                .effective_query()
                .map(|q| serde_json::Value::Object(q.clone())),
            fields: self.fields.clone(),
        }
    }
}

// ============================================================================
// Resource Target
// ============================================================================

/// What a resource downloads and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceTarget {
    /// The form definition, fetched directly
    Questionnaire,
    /// JSON submissions walked page by page
    DirectFetch,
    /// A server-side export polled to completion
    ExportBacked {
        format: ExportFormat,
        filters: FilterParams,
    },
}

impl ResourceTarget {
    /// Target for a requested data format.
    pub fn for_format(format: ExportFormat, filters: FilterParams) -> Self {
        if format.requires_export() {
            ResourceTarget::ExportBacked { format, filters }
        } else {
            ResourceTarget::DirectFetch
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceTarget::Questionnaire => ResourceKind::Questionnaire,
            _ => ResourceKind::Data,
        }
    }

    /// Stored format label.
    pub fn format_label(&self) -> &'static str {
        match self {
            ResourceTarget::Questionnaire => QuestionnaireFormat::Xls.as_str(),
            ResourceTarget::DirectFetch => ExportFormat::Json.as_str(),
            ResourceTarget::ExportBacked { format, .. } => format.as_str(),
        }
    }

    pub fn filters(&self) -> Option<&FilterParams> {
        match self {
            ResourceTarget::ExportBacked { filters, .. } => Some(filters),
            _ => None,
        }
    }

    pub fn needs_export(&self) -> bool {
        matches!(self, ResourceTarget::ExportBacked { .. })
    }
}

// ============================================================================
// Synced Resource Entity
// ============================================================================

/// First and last `_submission_time` seen in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    /// `None` when no submission carries a timestamp.
    pub fn from_times<'a, I>(times: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut range: Option<(&str, &str)> = None;

        for time in times {
            range = Some(match range {
                None => (time, time),
                Some((start, end)) => (start.min(time), end.max(time)),
            });
        }

        range.map(|(start, end)| DateRange {
            start: start.to_string(),
            end: end.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedResource {
    pub id: ResourceId,
    pub dataset_id: DatasetId,
    pub name: String,
    pub target: ResourceTarget,
    /// Set only for export-backed resources with a live cycle
    pub export_id: Option<String>,
    pub download_status: DownloadStatus,
    pub download_attempts: u32,
    /// Remote total when data was last materialized; 0 means none yet
    pub submission_count: u64,
    /// Generation counter bumped by every cycle reset
    pub cycle: i64,
    /// Last captured diagnostic
    pub error_message: Option<String>,
    /// Where the artifact was written
    pub artifact_path: Option<String>,
    pub date_range: Option<DateRange>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SyncedResource {
    /// A new resource in `Pending` at cycle 0.
    pub fn new(
        dataset_id: DatasetId,
        name: impl Into<String>,
        target: ResourceTarget,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            dataset_id,
            name: name.into(),
            target,
            export_id: None,
            download_status: DownloadStatus::Pending,
            download_attempts: 0,
            submission_count: 0,
            cycle: 0,
            error_message: None,
            artifact_path: None,
            date_range: None,
            last_updated: now,
            created_at: now,
        }
    }

    pub fn with_export_id(mut self, export_id: impl Into<String>) -> Self {
        self.export_id = Some(export_id.into());
        self
    }

    pub fn with_date_range(mut self, date_range: Option<DateRange>) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.target.kind()
    }

    /// Pending for longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.download_status != DownloadStatus::Pending {
            return false;
        }

        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => now - self.last_updated > threshold,
            Err(_) => false,
        }
    }

    /// Artifact file name, e.g. `csv__aBc123_data.csv`.
    pub fn file_name(&self, asset_id: &str) -> String {
        match &self.target {
            ResourceTarget::Questionnaire => {
                format!("{}.{}", asset_id, QuestionnaireFormat::Xls.as_str())
            }
            ResourceTarget::DirectFetch => format!("{}__{}_data.json", self.name, asset_id),
            ResourceTarget::ExportBacked { format, .. } => {
                format!("{}__{}_data.{}", self.name, asset_id, format.extension())
            }
        }
    }

    /// Check a patch against the transition rules.
    pub fn validate_patch(&self, patch: &StatusPatch) -> Result<()> {
        if self.download_status.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: self.download_status.to_string(),
                to: patch.status.to_string(),
                reason: "Terminal resources only leave their state through a new cycle"
                    .to_string(),
            });
        }

        if let Some(attempts) = patch.attempts {
            if attempts < self.download_attempts {
                return Err(SyncError::Validation(format!(
                    "download_attempts cannot decrease ({} -> {})",
                    self.download_attempts, attempts
                )));
            }
        }

        if patch.status != DownloadStatus::Error
            && self.target.needs_export()
            && self.export_id.is_none()
            && patch.export_id.is_none()
        {
            return Err(SyncError::Validation(format!(
                "Export-backed resource {} has no export id",
                self.id
            )));
        }

        if patch.export_id.is_some() && !self.target.needs_export() {
            return Err(SyncError::Validation(format!(
                "Resource {} is not export-backed and cannot carry an export id",
                self.id
            )));
        }

        Ok(())
    }
}

/// A worker write against one cycle of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    /// Cycle the writer was scheduled for
    pub expected_cycle: i64,
    pub status: DownloadStatus,
    /// New attempt count; `None` keeps the stored value
    pub attempts: Option<u32>,
    pub export_id: Option<String>,
    pub submission_count: Option<u64>,
    pub artifact_path: Option<String>,
    /// Replaces the stored diagnostic; `Complete` always clears it
    pub error_message: Option<String>,
}

impl StatusPatch {
    pub fn new(expected_cycle: i64, status: DownloadStatus) -> Self {
        Self {
            expected_cycle,
            status,
            attempts: None,
            export_id: None,
            submission_count: None,
            artifact_path: None,
            error_message: None,
        }
    }

    pub fn complete(expected_cycle: i64) -> Self {
        Self::new(expected_cycle, DownloadStatus::Complete)
    }

    pub fn error(expected_cycle: i64, message: impl Into<String>) -> Self {
        Self::new(expected_cycle, DownloadStatus::Error).with_error(message)
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_submission_count(mut self, count: u64) -> Self {
        self.submission_count = Some(count);
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Start of a new cycle for one resource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleReset {
    /// Required for export-backed resources
    pub export_id: Option<String>,
    /// Replaces the stored filters of an export-backed resource
    pub filters: Option<FilterParams>,
    pub date_range: Option<DateRange>,
}

impl CycleReset {
    /// Validate the reset against the current resource and produce the new state.
    pub fn apply(&self, resource: &SyncedResource, now: DateTime<Utc>) -> Result<SyncedResource> {
        let mut next = resource.clone();

        match (&mut next.target, &self.export_id) {
            (ResourceTarget::ExportBacked { filters, .. }, Some(_)) => {
                if let Some(new_filters) = &self.filters {
                    *filters = new_filters.clone();
                }
            }
            (ResourceTarget::ExportBacked { .. }, None) => {
                return Err(SyncError::Validation(format!(
                    "Export-backed resource {} requires an export id to start a cycle",
                    resource.id
                )));
            }
            (_, Some(_)) => {
                return Err(SyncError::Validation(format!(
                    "Resource {} is not export-backed and cannot carry an export id",
                    resource.id
                )));
            }
            (_, None) => {}
        }

        next.export_id = self.export_id.clone();
        next.download_status = DownloadStatus::Pending;
        next.download_attempts = 0;
        next.cycle = resource.cycle + 1;
        next.error_message = None;
        if resource.kind() == ResourceKind::Data {
            next.date_range = self.date_range.clone();
        }
        next.last_updated = now;

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn csv_resource() -> SyncedResource {
        SyncedResource::new(
            DatasetId::new(),
            "csv",
            ResourceTarget::for_format(ExportFormat::Csv, FilterParams::default()),
            now(),
        )
        .with_export_id("e1")
    }

    fn resource_in(status: DownloadStatus, last_updated: DateTime<Utc>) -> SyncedResource {
        let mut resource = csv_resource();
        resource.download_status = status;
        resource.last_updated = last_updated;
        resource
    }

    #[test]
    fn test_ids_parse_and_display() {
        let id = ResourceId::new();
        assert_eq!(ResourceId::from_string(&id.as_str()).unwrap(), id);
        assert!(DatasetId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_target_selection() {
        assert_eq!(
            ResourceTarget::for_format(ExportFormat::Json, FilterParams::default()),
            ResourceTarget::DirectFetch
        );
        let xls = ResourceTarget::for_format(ExportFormat::Xls, FilterParams::default());
        assert!(xls.needs_export());
        assert_eq!(xls.format_label(), "xls");
        assert_eq!(ResourceTarget::Questionnaire.kind(), ResourceKind::Questionnaire);
    }

    #[test]
    fn test_stale_classification() {
        let hour = Duration::from_secs(3600);
        let fresh = resource_in(DownloadStatus::Pending, now() - chrono::Duration::minutes(59));
        let stale = resource_in(DownloadStatus::Pending, now() - chrono::Duration::minutes(61));
        let old_complete =
            resource_in(DownloadStatus::Complete, now() - chrono::Duration::hours(5));

        assert!(!fresh.is_stale(now(), hour));
        assert!(stale.is_stale(now(), hour));
        assert!(!old_complete.is_stale(now(), hour));
    }

    #[test]
    fn test_import_status_precedence() {
        let hour = Duration::from_secs(3600);
        let complete = resource_in(DownloadStatus::Complete, now());
        let pending = resource_in(DownloadStatus::Pending, now());
        let stalled = resource_in(DownloadStatus::Pending, now() - chrono::Duration::hours(2));
        let error = resource_in(DownloadStatus::Error, now());

        let status = |set: &[&SyncedResource]| {
            ImportStatus::aggregate(set.iter().copied(), now(), hour)
        };

        assert_eq!(status(&[&complete]), ImportStatus::Complete);
        assert_eq!(status(&[&complete, &pending]), ImportStatus::Pending);
        assert_eq!(status(&[&pending, &stalled]), ImportStatus::Stalled);
        assert_eq!(
            status(&[&complete, &stalled, &pending, &error]),
            ImportStatus::Error
        );
        assert_eq!(status(&[]), ImportStatus::Complete);
    }

    #[test]
    fn test_filter_diff_detects_single_key() {
        let stored = FilterParams::default();
        let edited = FilterParams {
            hierarchy_in_labels: false,
            ..FilterParams::default()
        };

        assert_eq!(stored.diff(&edited), vec!["hierarchy_in_labels"]);
        assert!(stored.diff(&stored.clone()).is_empty());
    }

    #[test]
    fn test_filter_diff_treats_empty_query_as_absent() {
        let absent = FilterParams::default();
        let empty = FilterParams {
            query: Some(serde_json::Map::new()),
            ..FilterParams::default()
        };
        assert!(absent.diff(&empty).is_empty());
    }

    #[test]
    fn test_export_request_from_filters() {
        let mut query = serde_json::Map::new();
        query.insert("q1".to_string(), serde_json::json!("yes"));
        let filters = FilterParams {
            fields: vec!["q1".to_string()],
            query: Some(query),
            multiple_select: MultipleSelect::Summary,
            ..FilterParams::default()
        };

        let request = filters.to_export_request(ExportFormat::Csv);

        assert_eq!(request.lang, "_default");
        assert!(request.flatten);
        assert_eq!(request.multiple_select, "summary");
        assert_eq!(request.query, Some(serde_json::json!({"q1": "yes"})));
        assert_eq!(request.fields, vec!["q1".to_string()]);
    }

    #[test]
    fn test_file_names() {
        let questionnaire =
            SyncedResource::new(DatasetId::new(), "questionnaire", ResourceTarget::Questionnaire, now());
        let json = SyncedResource::new(DatasetId::new(), "json", ResourceTarget::DirectFetch, now());
        let spss = SyncedResource::new(
            DatasetId::new(),
            "spss_labels",
            ResourceTarget::for_format(ExportFormat::SpssLabels, FilterParams::default()),
            now(),
        );

        assert_eq!(questionnaire.file_name("a1"), "a1.xls");
        assert_eq!(json.file_name("a1"), "json__a1_data.json");
        assert_eq!(spss.file_name("a1"), "spss_labels__a1_data.zip");
    }

    #[test]
    fn test_patch_rejected_on_terminal_resource() {
        let resource = resource_in(DownloadStatus::Complete, now());
        let err = resource
            .validate_patch(&StatusPatch::error(0, "late failure"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_patch_cannot_decrease_attempts() {
        let mut resource = csv_resource();
        resource.download_attempts = 3;

        let patch = StatusPatch::new(0, DownloadStatus::Pending).with_attempts(2);
        assert!(matches!(
            resource.validate_patch(&patch),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_cycle_reset() {
        let mut resource = resource_in(DownloadStatus::Error, now());
        resource.download_attempts = 6;
        resource.error_message = Some("boom".to_string());

        let edited = FilterParams {
            group_sep: ".".to_string(),
            ..FilterParams::default()
        };
        let reset = CycleReset {
            export_id: Some("e2".to_string()),
            filters: Some(edited.clone()),
            date_range: None,
        };
        let later = now() + chrono::Duration::minutes(5);
        let next = reset.apply(&resource, later).unwrap();

        assert_eq!(next.download_status, DownloadStatus::Pending);
        assert_eq!(next.download_attempts, 0);
        assert_eq!(next.cycle, resource.cycle + 1);
        assert_eq!(next.export_id.as_deref(), Some("e2"));
        assert_eq!(next.target.filters(), Some(&edited));
        assert!(next.error_message.is_none());
        assert_eq!(next.last_updated, later);
    }

    #[test]
    fn test_cycle_reset_requires_export_id_for_exports() {
        let resource = csv_resource();
        assert!(matches!(
            CycleReset::default().apply(&resource, now()),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_date_range_from_times() {
        let range = DateRange::from_times([
            "2026-01-03T10:00:00",
            "2026-01-01T08:30:00",
            "2026-02-10T17:45:00",
        ])
        .unwrap();

        assert_eq!(range.start, "2026-01-01T08:30:00");
        assert_eq!(range.end, "2026-02-10T17:45:00");
        assert!(DateRange::from_times(Vec::<&str>::new()).is_none());
    }
}
