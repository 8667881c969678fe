//! Shared fakes for the sync integration tests.
//!
//! Every bridge seam is replaced by an in-memory double; the repositories run
//! against a single-connection in-memory SQLite pool.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    background::{JobHandle, JobQueue, JobRequest, JobStatus},
    error::{BridgeError, Result as BridgeResult},
    storage::{ArtifactContent, ArtifactStore, StoredArtifact},
    survey::{
        AssetMetadata, AssetSettings, ExportFormat, ExportJob, ExportRequest, QuestionnaireFormat,
        Submission, SubmissionPage, SurveyProvider, SurveyProviderFactory,
    },
    time::FixedClock,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_auth::{AuthError, CredentialResolver, UserId};
use core_runtime::{config::SyncConfig, events::EventBus};
use core_sync::{
    create_test_pool, DownloadTask, DownloadWorker, SqliteDatasetRepository,
    SqliteResourceRepository, SyncContext, SyncCoordinator, WorkerOutcome, DOWNLOAD_TASK,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ASSET_ID: &str = "aXk3Survey";
pub const OWNER: &str = "field_officer";
const PAGE_SIZE: usize = 30;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Survey Platform
// ============================================================================

#[derive(Default)]
struct PlatformState {
    asset: Option<AssetMetadata>,
    submissions: Vec<Submission>,
    /// Status reported for every export
    export_status: String,
    exports_created: Vec<ExportRequest>,
    export_polls: usize,
    poll_transport_error: bool,
    questionnaire_error: Option<String>,
    download_error: Option<String>,
    listing_error: Option<String>,
    connected_as: Vec<String>,
}

/// Scriptable stand-in for the remote platform.
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn with_submissions(total: usize) -> Arc<Self> {
        let platform = Arc::new(Self {
            state: Mutex::new(PlatformState {
                export_status: "processing".to_string(),
                ..PlatformState::default()
            }),
        });
        platform.set_submission_total(total);
        platform
    }

    /// Grow or shrink the remote survey to `total` submissions.
    pub fn set_submission_total(&self, total: usize) {
        let mut state = self.state.lock().unwrap();
        state.submissions = (0..total)
            .map(|i| {
                let day = 1 + (i % 28);
                let month = 1 + (i / 28) % 12;
                Submission(json!({
                    "_id": i + 1,
                    "_submission_time": format!("2026-{:02}-{:02}T10:00:00", month, day),
                    "consent": "yes",
                }))
            })
            .collect();
        state.asset = Some(AssetMetadata {
            uid: ASSET_ID.to_string(),
            name: "Household survey".to_string(),
            owner: OWNER.to_string(),
            asset_type: "survey".to_string(),
            submission_count: total as u64,
            settings: AssetSettings::default(),
            permissions: vec![],
            user_is_manager: true,
        });
    }

    pub fn set_export_status(&self, status: &str) {
        self.state.lock().unwrap().export_status = status.to_string();
    }

    pub fn fail_export_polls_with_transport_error(&self, fail: bool) {
        self.state.lock().unwrap().poll_transport_error = fail;
    }

    pub fn fail_questionnaire(&self, message: &str) {
        self.state.lock().unwrap().questionnaire_error = Some(message.to_string());
    }

    pub fn fail_downloads(&self, message: &str) {
        self.state.lock().unwrap().download_error = Some(message.to_string());
    }

    pub fn fail_submission_listing(&self, message: &str) {
        self.state.lock().unwrap().listing_error = Some(message.to_string());
    }

    pub fn exports_created(&self) -> Vec<ExportRequest> {
        self.state.lock().unwrap().exports_created.clone()
    }

    pub fn export_polls(&self) -> usize {
        self.state.lock().unwrap().export_polls
    }

    pub fn connected_as(&self) -> Vec<String> {
        self.state.lock().unwrap().connected_as.clone()
    }

    fn export_payload(uid: &str, status: &str) -> Value {
        let result = if status == "complete" {
            format!("https://kf.example.org/exports/{}.dat", uid)
        } else {
            String::new()
        };
        json!({"uid": uid, "status": status, "result": result, "messages": {}})
    }
}

#[async_trait]
impl SurveyProvider for FakePlatform {
    async fn get_asset(&self, asset_id: &str, _force: bool) -> BridgeResult<AssetMetadata> {
        self.state
            .lock()
            .unwrap()
            .asset
            .clone()
            .filter(|a| a.uid == asset_id)
            .ok_or_else(|| BridgeError::NotFound(asset_id.to_string()))
    }

    async fn list_submissions(
        &self,
        _asset_id: &str,
        cursor: Option<&str>,
    ) -> BridgeResult<SubmissionPage> {
        let state = self.state.lock().unwrap();
        if let Some(message) = state.listing_error.clone() {
            return Err(BridgeError::Transport(message));
        }
        let start = cursor
            .and_then(|c| c.rsplit("start=").next())
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + PAGE_SIZE).min(state.submissions.len());
        let next = (end < state.submissions.len()).then(|| {
            format!(
                "https://kf.example.org/api/v2/assets/{}/data.json?start={}",
                ASSET_ID, end
            )
        });

        Ok(SubmissionPage {
            count: Some(state.submissions.len() as u64),
            next,
            results: state.submissions[start..end].to_vec(),
        })
    }

    async fn create_export(
        &self,
        _asset_id: &str,
        request: &ExportRequest,
    ) -> BridgeResult<ExportJob> {
        let mut state = self.state.lock().unwrap();
        state.exports_created.push(request.clone());
        let uid = format!("exp{}", state.exports_created.len());
        ExportJob::from_raw(Self::export_payload(&uid, "created"))
    }

    async fn get_export(&self, _asset_id: &str, export_id: &str) -> BridgeResult<ExportJob> {
        let mut state = self.state.lock().unwrap();
        state.export_polls += 1;
        if state.poll_transport_error {
            return Err(BridgeError::Transport("connection reset".to_string()));
        }
        ExportJob::from_raw(Self::export_payload(export_id, &state.export_status))
    }

    async fn download(&self, url: &str, format: ExportFormat) -> BridgeResult<ArtifactContent> {
        if let Some(message) = self.state.lock().unwrap().download_error.clone() {
            return Err(BridgeError::Transport(message));
        }
        Ok(if format.is_binary() {
            ArtifactContent::Binary(Bytes::from(format!("binary:{}", url)))
        } else {
            ArtifactContent::Text(format!("text:{}", url))
        })
    }

    async fn download_questionnaire(
        &self,
        asset_id: &str,
        _format: QuestionnaireFormat,
    ) -> BridgeResult<ArtifactContent> {
        if let Some(message) = self.state.lock().unwrap().questionnaire_error.clone() {
            return Err(BridgeError::Transport(message));
        }
        Ok(ArtifactContent::Binary(Bytes::from(format!("xls:{}", asset_id))))
    }

    async fn list_surveys(&self) -> BridgeResult<Vec<AssetMetadata>> {
        Ok(self.state.lock().unwrap().asset.clone().into_iter().collect())
    }

    async fn test_token(&self) -> bool {
        true
    }
}

pub struct FakeFactory {
    platform: Arc<FakePlatform>,
}

impl SurveyProviderFactory for FakeFactory {
    fn connect(&self, identity: &str, _token: &str) -> BridgeResult<Arc<dyn SurveyProvider>> {
        self.platform
            .state
            .lock()
            .unwrap()
            .connected_as
            .push(identity.to_string());
        Ok(self.platform.clone())
    }
}

// ============================================================================
// Host Seams
// ============================================================================

/// Records jobs instead of running them.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<(Duration, JobRequest)>>,
    fail: Mutex<bool>,
}

impl RecordingQueue {
    /// Remove and decode every recorded job.
    pub fn take(&self) -> Vec<(Duration, DownloadTask)> {
        self.jobs
            .lock()
            .unwrap()
            .drain(..)
            .map(|(delay, job)| {
                assert_eq!(job.task, DOWNLOAD_TASK);
                (delay, job.decode::<DownloadTask>().unwrap())
            })
            .collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, job)| job.title.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue_after(&self, delay: Duration, job: JobRequest) -> BridgeResult<JobHandle> {
        if *self.fail.lock().unwrap() {
            return Err(BridgeError::NotAvailable("queue offline".to_string()));
        }
        self.jobs.lock().unwrap().push((delay, job));
        Ok(JobHandle::new())
    }

    async fn job_status(&self, _handle: &JobHandle) -> BridgeResult<JobStatus> {
        Ok(JobStatus::Scheduled)
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    files: Mutex<HashMap<(String, String), ArtifactContent>>,
}

impl MemoryArtifacts {
    pub fn get(&self, namespace: &str, file_name: &str) -> Option<ArtifactContent> {
        self.files
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), file_name.to_string()))
            .cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn write_artifact(
        &self,
        namespace: &str,
        file_name: &str,
        content: ArtifactContent,
    ) -> BridgeResult<StoredArtifact> {
        let size = content.len() as u64;
        self.files
            .lock()
            .unwrap()
            .insert((namespace.to_string(), file_name.to_string()), content);
        Ok(StoredArtifact {
            location: PathBuf::from(format!("/artifacts/{}/{}", namespace, file_name)),
            size,
        })
    }

    async fn read_artifact(&self, namespace: &str, file_name: &str) -> BridgeResult<Bytes> {
        self.get(namespace, file_name)
            .map(ArtifactContent::into_bytes)
            .ok_or_else(|| BridgeError::NotFound(file_name.to_string()))
    }
}

#[derive(Default)]
pub struct StaticCredentials {
    tokens: Mutex<HashMap<UserId, String>>,
}

impl StaticCredentials {
    pub fn insert(&self, user: &UserId, token: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(user.clone(), token.to_string());
    }

    pub fn remove(&self, user: &UserId) {
        self.tokens.lock().unwrap().remove(user);
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn token_for(&self, user: &UserId) -> core_auth::Result<String> {
        self.tokens
            .lock()
            .unwrap()
            .get(user)
            .cloned()
            .ok_or_else(|| AuthError::MissingToken {
                user_id: user.to_string(),
            })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub queue: Arc<RecordingQueue>,
    pub artifacts: Arc<MemoryArtifacts>,
    pub credentials: Arc<StaticCredentials>,
    pub clock: Arc<FixedClock>,
    pub events: EventBus,
    pub ctx: SyncContext,
    pub coordinator: SyncCoordinator,
    pub worker: DownloadWorker,
    pub user: UserId,
}

impl Harness {
    pub async fn new(submissions: usize) -> Self {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(FixedClock::new(t0()));
        let platform = FakePlatform::with_submissions(submissions);
        let queue = Arc::new(RecordingQueue::default());
        let artifacts = Arc::new(MemoryArtifacts::default());
        let credentials = Arc::new(StaticCredentials::default());
        let events = EventBus::new(256);
        let user = UserId::new(OWNER);
        credentials.insert(&user, "0df5c1e7");

        let config = SyncConfig::builder()
            .database_path("/tmp/survey-sync-tests.db")
            .artifact_dir("/tmp/survey-sync-artifacts")
            .build()
            .unwrap();

        let ctx = SyncContext {
            resources: Arc::new(
                SqliteResourceRepository::new(pool.clone())
                    .with_clock(clock.clone())
                    .with_stale_after(config.stale_after),
            ),
            datasets: Arc::new(SqliteDatasetRepository::new(pool)),
            providers: Arc::new(FakeFactory {
                platform: platform.clone(),
            }),
            credentials: credentials.clone(),
            artifacts: artifacts.clone(),
            queue: queue.clone(),
            clock: clock.clone(),
            events: events.clone(),
        };

        Self {
            coordinator: SyncCoordinator::new(ctx.clone(), &config),
            worker: DownloadWorker::new(ctx.clone(), &config),
            platform,
            queue,
            artifacts,
            credentials,
            clock,
            events,
            ctx,
            user,
        }
    }

    /// Run every job currently queued, once. Jobs they enqueue stay queued.
    pub async fn run_queued(&self) -> Vec<(DownloadTask, Duration, WorkerOutcome)> {
        let mut outcomes = Vec::new();
        for (delay, task) in self.queue.take() {
            let outcome = self.worker.run(&task).await;
            outcomes.push((task, delay, outcome));
        }
        outcomes
    }

    /// Run queued jobs until the queue is empty.
    pub async fn run_until_idle(&self) -> Vec<WorkerOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..50 {
            let round = self.run_queued().await;
            if round.is_empty() {
                break;
            }
            outcomes.extend(round.into_iter().map(|(_, _, outcome)| outcome));
        }
        outcomes
    }
}
