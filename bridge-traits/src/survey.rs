//! Survey Platform Abstraction
//!
//! The contract a survey platform connector fulfils, plus the wire types the
//! sync core reads: asset metadata, submission pages, export jobs and the
//! export request payload.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::storage::ArtifactContent;

// ============================================================================
// Formats
// ============================================================================

/// Output format of a data artifact.
///
/// Every format except [`ExportFormat::Json`] requires a server-side export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Xls,
    Geojson,
    #[serde(alias = "spss")]
    SpssLabels,
    Json,
}

impl ExportFormat {
    /// Name used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xls => "xls",
            ExportFormat::Geojson => "geojson",
            ExportFormat::SpssLabels => "spss_labels",
            ExportFormat::Json => "json",
        }
    }

    pub fn requires_export(&self) -> bool {
        !matches!(self, ExportFormat::Json)
    }

    /// File extension of the downloaded artifact. SPSS exports arrive zipped.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::SpssLabels => "zip",
            other => other.as_str(),
        }
    }

    /// Whether the downloaded body must be kept as raw bytes.
    pub fn is_binary(&self) -> bool {
        matches!(self, ExportFormat::Xls | ExportFormat::SpssLabels)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xls" => Ok(ExportFormat::Xls),
            "geojson" => Ok(ExportFormat::Geojson),
            "spss" | "spss_labels" => Ok(ExportFormat::SpssLabels),
            "json" => Ok(ExportFormat::Json),
            other => Err(BridgeError::Rejected(format!(
                "Invalid export format: {}",
                other
            ))),
        }
    }
}

/// Questionnaire download format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionnaireFormat {
    #[default]
    Xls,
    Xml,
}

impl QuestionnaireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionnaireFormat::Xls => "xls",
            QuestionnaireFormat::Xml => "xml",
        }
    }
}

// ============================================================================
// Asset Metadata
// ============================================================================

/// A `{label, value}` pair from the asset settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
}

/// Deployment settings of an asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSettings {
    #[serde(default, deserialize_with = "one_or_first")]
    pub sector: Option<LabeledValue>,
    #[serde(default, deserialize_with = "one_or_first")]
    pub country: Option<LabeledValue>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Newer platform versions send `country` as a list; older ones as an object.
fn one_or_first<'de, D>(deserializer: D) -> std::result::Result<Option<LabeledValue>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(LabeledValue),
        Many(Vec<LabeledValue>),
        Blank(String),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => Some(value),
        Some(OneOrMany::Many(values)) => values.into_iter().next(),
        Some(OneOrMany::Blank(_)) | None => None,
    })
}

/// One permission grant on an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPermission {
    pub permission: String,
    pub user: String,
}

/// Remote survey asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "owner__username", default)]
    pub owner: String,
    #[serde(default)]
    pub asset_type: String,
    #[serde(rename = "deployment__submission_count", default)]
    pub submission_count: u64,
    #[serde(default)]
    pub settings: AssetSettings,
    #[serde(default)]
    pub permissions: Vec<AssetPermission>,
    /// Derived by the connector; not part of the remote payload.
    #[serde(default)]
    pub user_is_manager: bool,
}

impl AssetMetadata {
    pub fn is_survey(&self) -> bool {
        self.asset_type == "survey"
    }
}

// ============================================================================
// Submissions
// ============================================================================

/// One submission, kept as the raw remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission(pub serde_json::Value);

impl Submission {
    /// `_submission_time` as sent by the platform (ISO-8601, sortable).
    pub fn submission_time(&self) -> Option<&str> {
        self.0.get("_submission_time").and_then(|v| v.as_str())
    }
}

/// One page of a cursor walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Submission>,
}

// ============================================================================
// Export Jobs
// ============================================================================

/// Remote export job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Created,
    Processing,
    Complete,
    Error,
    #[serde(other)]
    Unknown,
}

impl ExportStatus {
    /// Still running on the remote side; worth polling again.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, ExportStatus::Created | ExportStatus::Processing)
    }
}

/// Snapshot of a remote export job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub uid: String,
    pub status: ExportStatus,
    /// Download URL, present once the job is complete.
    pub result: Option<String>,
    /// Payload exactly as received, kept for diagnostics.
    pub raw: serde_json::Value,
}

impl ExportJob {
    pub fn from_raw(raw: serde_json::Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            uid: String,
            #[serde(default = "unknown_status")]
            status: ExportStatus,
            #[serde(default)]
            result: Option<String>,
        }

        fn unknown_status() -> ExportStatus {
            ExportStatus::Unknown
        }

        let wire: Wire = serde_json::from_value(raw.clone()).map_err(|e| {
            BridgeError::InvalidResponse(format!("Unexpected export payload: {}", e))
        })?;

        Ok(Self {
            uid: wire.uid,
            status: wire.status,
            result: wire.result.filter(|url| !url.is_empty()),
            raw,
        })
    }
}

/// Body of an export creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    #[serde(rename = "type", serialize_with = "serialize_format")]
    pub format: ExportFormat,
    pub fields_from_all_versions: bool,
    pub group_sep: String,
    pub hierarchy_in_labels: bool,
    pub lang: String,
    pub multiple_select: String,
    pub flatten: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

fn serialize_format<S: serde::Serializer>(
    format: &ExportFormat,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(format.as_str())
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Authenticated access to one survey platform account.
///
/// Implementations own response caching; `force` bypasses it.
#[async_trait]
pub trait SurveyProvider: Send + Sync {
    /// Asset metadata including the total submission count.
    async fn get_asset(&self, asset_id: &str, force: bool) -> Result<AssetMetadata>;

    /// One page of submissions. `cursor` is the `next` URL of the previous page.
    async fn list_submissions(
        &self,
        asset_id: &str,
        cursor: Option<&str>,
    ) -> Result<SubmissionPage>;

    /// Start a server-side export.
    async fn create_export(&self, asset_id: &str, request: &ExportRequest) -> Result<ExportJob>;

    /// Current state of an export. Never served from cache.
    async fn get_export(&self, asset_id: &str, export_id: &str) -> Result<ExportJob>;

    /// Fetch an export result.
    async fn download(&self, url: &str, format: ExportFormat) -> Result<ArtifactContent>;

    /// Fetch the questionnaire definition.
    async fn download_questionnaire(
        &self,
        asset_id: &str,
        format: QuestionnaireFormat,
    ) -> Result<ArtifactContent>;

    /// Every survey asset visible to the account.
    async fn list_surveys(&self) -> Result<Vec<AssetMetadata>>;

    /// Cheap credential check. Never fails; answers `false` instead.
    async fn test_token(&self) -> bool;
}

/// Builds a provider bound to one identity and one token.
pub trait SurveyProviderFactory: Send + Sync {
    fn connect(&self, identity: &str, token: &str) -> Result<Arc<dyn SurveyProvider>>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Lazily walk every submission of an asset, following `next` cursors.
///
/// The walk ends when a page carries no `next`. Dropping the stream stops it.
pub fn submission_stream<'a>(
    provider: &'a dyn SurveyProvider,
    asset_id: &'a str,
) -> BoxStream<'a, Result<Submission>> {
    enum Cursor {
        Start,
        Next(String),
        Done,
    }

    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let page = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => provider.list_submissions(asset_id, None).await?,
            Cursor::Next(url) => provider.list_submissions(asset_id, Some(&url)).await?,
        };

        let next = match page.next {
            Some(url) if !url.is_empty() => Cursor::Next(url),
            _ => Cursor::Done,
        };

        Ok(Some((stream::iter(page.results.into_iter().map(Ok)), next)))
    })
    .map(|page| match page {
        Ok(items) => items.left_stream(),
        Err(e) => stream::once(async move { Err(e) }).right_stream(),
    })
    .flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(
            "spss".parse::<ExportFormat>().unwrap(),
            ExportFormat::SpssLabels
        );
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(BridgeError::Rejected(_))
        ));
    }

    #[test]
    fn test_export_format_file_properties() {
        assert_eq!(ExportFormat::SpssLabels.extension(), "zip");
        assert_eq!(ExportFormat::Geojson.extension(), "geojson");
        assert!(ExportFormat::Xls.is_binary());
        assert!(!ExportFormat::Csv.is_binary());
        assert!(!ExportFormat::Json.requires_export());
    }

    #[test]
    fn test_asset_metadata_from_wire() {
        let asset: AssetMetadata = serde_json::from_value(json!({
            "uid": "aXk3",
            "name": "Household survey",
            "owner__username": "field_team",
            "asset_type": "survey",
            "deployment__submission_count": 100,
            "settings": {
                "sector": {"label": "Health", "value": "Health"},
                "country": [{"label": "Kenya", "value": "KEN"}],
                "description": ""
            },
            "permissions": []
        }))
        .unwrap();

        assert_eq!(asset.submission_count, 100);
        assert_eq!(asset.owner, "field_team");
        assert_eq!(asset.settings.country.as_ref().unwrap().value, "KEN");
        assert!(asset.is_survey());
    }

    #[test]
    fn test_blank_sector_is_none() {
        let settings: AssetSettings = serde_json::from_value(json!({"sector": ""})).unwrap();
        assert!(settings.sector.is_none());
    }

    #[test]
    fn test_export_job_keeps_raw_payload() {
        let raw = json!({"uid": "e1", "status": "processing", "result": "", "messages": {}});
        let job = ExportJob::from_raw(raw.clone()).unwrap();

        assert_eq!(job.status, ExportStatus::Processing);
        assert!(job.status.is_in_progress());
        assert!(job.result.is_none());
        assert_eq!(job.raw, raw);
    }

    #[test]
    fn test_unrecognized_export_status() {
        let job = ExportJob::from_raw(json!({"uid": "e1", "status": "exploded"})).unwrap();
        assert_eq!(job.status, ExportStatus::Unknown);
    }

    #[test]
    fn test_export_request_payload_omits_empty_filters() {
        let request = ExportRequest {
            format: ExportFormat::SpssLabels,
            fields_from_all_versions: true,
            group_sep: "/".to_string(),
            hierarchy_in_labels: false,
            lang: "_default".to_string(),
            multiple_select: "both".to_string(),
            flatten: true,
            query: None,
            fields: vec![],
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["type"], "spss_labels");
        assert!(body.get("query").is_none());
        assert!(body.get("fields").is_none());
    }

    struct PagedProvider {
        pages: Vec<SubmissionPage>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl SurveyProvider for PagedProvider {
        async fn get_asset(&self, _: &str, _: bool) -> Result<AssetMetadata> {
            Err(BridgeError::NotAvailable("get_asset".into()))
        }

        async fn list_submissions(&self, _: &str, cursor: Option<&str>) -> Result<SubmissionPage> {
            let mut cursors = self.cursors.lock().unwrap();
            cursors.push(cursor.map(str::to_string));
            self.pages
                .get(cursors.len() - 1)
                .cloned()
                .ok_or_else(|| BridgeError::Transport("page overrun".into()))
        }

        async fn create_export(&self, _: &str, _: &ExportRequest) -> Result<ExportJob> {
            Err(BridgeError::NotAvailable("create_export".into()))
        }

        async fn get_export(&self, _: &str, _: &str) -> Result<ExportJob> {
            Err(BridgeError::NotAvailable("get_export".into()))
        }

        async fn download(&self, _: &str, _: ExportFormat) -> Result<ArtifactContent> {
            Err(BridgeError::NotAvailable("download".into()))
        }

        async fn download_questionnaire(
            &self,
            _: &str,
            _: QuestionnaireFormat,
        ) -> Result<ArtifactContent> {
            Err(BridgeError::NotAvailable("download_questionnaire".into()))
        }

        async fn list_surveys(&self) -> Result<Vec<AssetMetadata>> {
            Ok(vec![])
        }

        async fn test_token(&self) -> bool {
            true
        }
    }

    fn page(ids: &[u64], next: Option<&str>) -> SubmissionPage {
        SubmissionPage {
            count: None,
            next: next.map(str::to_string),
            results: ids.iter().map(|id| Submission(json!({ "_id": id }))).collect(),
        }
    }

    #[tokio::test]
    async fn test_submission_stream_follows_cursor_until_exhausted() {
        let provider = PagedProvider {
            pages: vec![
                page(&[1, 2], Some("https://kf.example.org/api/v2/assets/a/data.json?start=2")),
                page(&[], Some("https://kf.example.org/api/v2/assets/a/data.json?start=2b")),
                page(&[3], None),
            ],
            cursors: Mutex::new(vec![]),
        };

        let all: Vec<Submission> = submission_stream(&provider, "a").try_collect().await.unwrap();

        assert_eq!(all.len(), 3);
        let cursors = provider.cursors.lock().unwrap();
        assert_eq!(cursors.len(), 3);
        assert!(cursors[0].is_none());
    }

    #[tokio::test]
    async fn test_submission_stream_surfaces_page_errors() {
        let provider = PagedProvider {
            pages: vec![page(&[1], Some("next"))],
            cursors: Mutex::new(vec![]),
        };

        let result: Result<Vec<Submission>> =
            submission_stream(&provider, "a").try_collect().await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }
}
