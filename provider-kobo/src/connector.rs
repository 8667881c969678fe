//! KoboToolbox API connector implementation
//!
//! Implements the `SurveyProvider` trait for the KoboToolbox v2 REST API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::ArtifactContent;
use bridge_traits::survey::{
    AssetMetadata, ExportFormat, ExportJob, ExportRequest, QuestionnaireFormat, SubmissionPage,
    SurveyProvider, SurveyProviderFactory,
};
use core_runtime::config::{AuthScheme, SyncConfig};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::cache::{LruResponseCache, ResponseCache};
use crate::error::KoboError;
use crate::types::{AssetListResponse, CurrentUser};

/// First page of the asset listing; also used to validate a token.
const ASSET_LIST_PATH: &str = "assets.json?limit=100";

/// Attempts per request before a 429/5xx is surfaced
const MAX_RETRIES: u32 = 3;

/// How a GET interacts with the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachePolicy {
    /// Serve from cache when fresh, populate on miss
    Use,
    /// Skip the lookup but store the fresh response
    Refresh,
    /// Never read or write the cache
    Bypass,
}

impl CachePolicy {
    fn from_force(force: bool) -> Self {
        if force {
            CachePolicy::Refresh
        } else {
            CachePolicy::Use
        }
    }
}

/// KoboToolbox API connector
///
/// One connector is bound to one requesting identity and one token.
///
/// # Features
///
/// - Asset metadata with manager-permission detection
/// - Cursor-walked submission pages
/// - Export creation, polling and result download
/// - Response cache namespaced by identity
/// - Exponential backoff for rate limiting and server errors
///
/// # Example
///
/// ```ignore
/// use provider_kobo::KoboConnector;
/// use bridge_traits::survey::SurveyProvider;
///
/// let connector = KoboConnector::new(http_client, cache, &config, "officer", token);
/// let asset = connector.get_asset("aBcD1234", false).await?;
/// ```
pub struct KoboConnector {
    http_client: Arc<dyn HttpClient>,
    cache: Arc<dyn ResponseCache>,

    /// Cache namespace; the local user the token belongs to
    identity: String,
    token: String,
    auth_scheme: AuthScheme,

    kobo_url: String,
    base_url: String,
    request_timeout: Duration,

    current_user: OnceCell<CurrentUser>,
}

impl KoboConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        cache: Arc<dyn ResponseCache>,
        config: &SyncConfig,
        identity: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            cache,
            identity: identity.into(),
            token: token.into(),
            auth_scheme: config.auth_scheme,
            kobo_url: config.kobo_url.clone(),
            base_url: config.api_base_url(),
            request_timeout: config.request_timeout,
            current_user: OnceCell::new(),
        }
    }

    /// Absolute URLs (pagination cursors, export results) pass through.
    fn resolve_url(&self, resource_url: &str) -> String {
        if resource_url.starts_with("http") {
            resource_url.to_string()
        } else {
            format!("{}{}", self.base_url, resource_url)
        }
    }

    fn request(&self, method: HttpMethod, url: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .authorization(self.auth_scheme.as_str(), self.token.as_str())
            .timeout(self.request_timeout)
    }

    /// Execute API request with retry logic
    ///
    /// Implements exponential backoff for rate limiting and transient errors.
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            match self.http_client.execute(request.clone()).await {
                Ok(response) => {
                    let status = response.status;

                    if response.is_success() {
                        debug!("API request succeeded: status={}", status);
                        return Ok(response);
                    } else if status == 429 || response.is_server_error() {
                        attempt += 1;
                        if attempt >= MAX_RETRIES {
                            warn!(
                                "API request failed after {} attempts: status={}",
                                MAX_RETRIES, status
                            );
                            return Err(KoboError::ApiError {
                                status_code: status,
                                message: format!("Request failed after {} retries", MAX_RETRIES),
                            });
                        }

                        let backoff_ms = 100u64 * 2u64.pow(attempt);
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt, MAX_RETRIES, status, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    } else {
                        warn!("API request failed: status={}", status);
                        return Err(KoboError::from_status(status, &response.body));
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES || !e.is_transient() {
                        warn!("API request failed after {} attempts: {}", attempt, e);
                        return Err(e.into());
                    }

                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt, MAX_RETRIES, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn get_json(&self, resource_url: &str, policy: CachePolicy) -> crate::Result<Value> {
        let url = self.resolve_url(resource_url);

        if policy == CachePolicy::Use {
            if let Some(cached) = self.cache.get(&self.identity, &url).await {
                return Ok(cached);
            }
        }

        let request = self
            .request(HttpMethod::Get, &url)
            .header("Accept", "application/json");
        let response = self.execute_with_retry(request).await?;

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| KoboError::ParseError(format!("{} returned non-JSON body: {}", url, e)))?;

        if policy != CachePolicy::Bypass {
            self.cache.put(&self.identity, &url, value.clone()).await;
        }

        Ok(value)
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        resource_url: &str,
        policy: CachePolicy,
    ) -> crate::Result<T> {
        let value = self.get_json(resource_url, policy).await?;
        serde_json::from_value(value).map_err(|e| KoboError::ParseError(e.to_string()))
    }

    async fn get_raw(&self, resource_url: &str) -> crate::Result<HttpResponse> {
        let url = self.resolve_url(resource_url);
        self.execute_with_retry(self.request(HttpMethod::Get, &url))
            .await
    }

    /// The token owner, fetched once per connector.
    async fn current_user(&self) -> crate::Result<&CurrentUser> {
        let me_url = format!("{}/me", self.kobo_url);
        self.current_user
            .get_or_try_init(|| async { self.get_typed(&me_url, CachePolicy::Use).await })
            .await
    }

    async fn with_manager_flag(&self, mut asset: AssetMetadata) -> crate::Result<AssetMetadata> {
        let username = &self.current_user().await?.username;
        let manage_permission = format!("{}permissions/manage_asset.json", self.base_url);
        let user_url = format!("{}users/{}.json", self.base_url, username);

        asset.user_is_manager = asset
            .permissions
            .iter()
            .any(|p| p.permission == manage_permission && p.user == user_url);

        Ok(asset)
    }
}

#[async_trait]
impl SurveyProvider for KoboConnector {
    #[instrument(skip(self), fields(asset_id = %asset_id))]
    async fn get_asset(&self, asset_id: &str, force: bool) -> Result<AssetMetadata> {
        let path = format!("assets/{}.json", asset_id);
        let asset: AssetMetadata = self
            .get_typed(&path, CachePolicy::from_force(force))
            .await?;

        debug!(submissions = asset.submission_count, "Fetched asset metadata");

        Ok(self.with_manager_flag(asset).await?)
    }

    #[instrument(skip(self), fields(asset_id = %asset_id))]
    async fn list_submissions(
        &self,
        asset_id: &str,
        cursor: Option<&str>,
    ) -> Result<SubmissionPage> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => format!("assets/{}/data.json", asset_id),
        };

        let page: SubmissionPage = self.get_typed(&url, CachePolicy::Bypass).await?;

        debug!(
            results = page.results.len(),
            has_next = page.next.is_some(),
            "Fetched submission page"
        );

        Ok(page)
    }

    #[instrument(skip(self, request), fields(asset_id = %asset_id, format = %request.format))]
    async fn create_export(&self, asset_id: &str, request: &ExportRequest) -> Result<ExportJob> {
        if !request.format.requires_export() {
            return Err(KoboError::InvalidFormat(request.format.to_string()).into());
        }

        let url = self.resolve_url(&format!("assets/{}/exports/?format=json", asset_id));
        let http_request = self
            .request(HttpMethod::Post, &url)
            .header("Accept", "application/json")
            .json(request)?;

        let response = self.execute_with_retry(http_request).await?;
        let raw: Value = serde_json::from_slice(&response.body)
            .map_err(|e| KoboError::ParseError(e.to_string()))?;
        let job = ExportJob::from_raw(raw)?;

        info!(export_id = %job.uid, "Export created");

        Ok(job)
    }

    #[instrument(skip(self), fields(asset_id = %asset_id, export_id = %export_id))]
    async fn get_export(&self, asset_id: &str, export_id: &str) -> Result<ExportJob> {
        let path = format!("assets/{}/exports/{}/?format=json", asset_id, export_id);
        let raw = self.get_json(&path, CachePolicy::Bypass).await?;
        ExportJob::from_raw(raw)
    }

    #[instrument(skip(self, url), fields(format = %format))]
    async fn download(&self, url: &str, format: ExportFormat) -> Result<ArtifactContent> {
        let response = self.get_raw(url).await?;

        info!(bytes = response.body.len(), "Downloaded export result");

        if format.is_binary() {
            Ok(ArtifactContent::Binary(response.body))
        } else {
            Ok(ArtifactContent::Text(response.text()?))
        }
    }

    #[instrument(skip(self), fields(asset_id = %asset_id))]
    async fn download_questionnaire(
        &self,
        asset_id: &str,
        format: QuestionnaireFormat,
    ) -> Result<ArtifactContent> {
        let path = format!("assets/{}.{}", asset_id, format.as_str());
        let response = self.get_raw(&path).await?;

        Ok(ArtifactContent::Binary(response.body))
    }

    #[instrument(skip(self))]
    async fn list_surveys(&self) -> Result<Vec<AssetMetadata>> {
        info!("Listing surveys");

        let mut surveys = Vec::new();
        let mut next = Some(ASSET_LIST_PATH.to_string());

        while let Some(url) = next {
            let page: AssetListResponse = self.get_typed(&url, CachePolicy::Use).await?;
            surveys.extend(page.results.into_iter().filter(|asset| asset.is_survey()));
            next = page.next.filter(|url| !url.is_empty());
        }

        let mut annotated = Vec::with_capacity(surveys.len());
        for survey in surveys {
            annotated.push(self.with_manager_flag(survey).await?);
        }

        info!(count = annotated.len(), "Listed surveys");

        Ok(annotated)
    }

    async fn test_token(&self) -> bool {
        match self.get_json(ASSET_LIST_PATH, CachePolicy::Bypass).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Token check failed");
                false
            }
        }
    }
}

/// Builds `KoboConnector`s that share one HTTP client and one cache.
pub struct KoboConnectorFactory {
    http_client: Arc<dyn HttpClient>,
    cache: Arc<dyn ResponseCache>,
    config: SyncConfig,
}

impl KoboConnectorFactory {
    /// Cache sized from `cache_capacity`; a zero `cache_ttl` disables it.
    pub fn new(http_client: Arc<dyn HttpClient>, config: SyncConfig) -> Self {
        let cache = LruResponseCache::for_ttl(config.cache_capacity, config.cache_ttl);
        Self::with_cache(http_client, cache, config)
    }

    pub fn with_cache(
        http_client: Arc<dyn HttpClient>,
        cache: Arc<dyn ResponseCache>,
        config: SyncConfig,
    ) -> Self {
        Self {
            http_client,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> Arc<dyn ResponseCache> {
        Arc::clone(&self.cache)
    }
}

impl SurveyProviderFactory for KoboConnectorFactory {
    fn connect(&self, identity: &str, token: &str) -> Result<Arc<dyn SurveyProvider>> {
        if token.trim().is_empty() {
            return Err(BridgeError::Unauthorized(
                "No survey platform token provided".to_string(),
            ));
        }

        Ok(Arc::new(KoboConnector::new(
            Arc::clone(&self.http_client),
            Arc::clone(&self.cache),
            &self.config,
            identity,
            token,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::survey::ExportStatus;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const ME: &str = r#"{"username": "officer"}"#;

    fn ok(body: impl Into<Bytes>) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
        })
    }

    fn status(code: u16, body: &'static str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: code,
            headers: HashMap::new(),
            body: Bytes::from(body),
        })
    }

    fn config() -> SyncConfig {
        SyncConfig::builder()
            .kobo_url("https://kf.example.org")
            .database_path("/tmp/sync.db")
            .artifact_dir("/tmp/artifacts")
            .build()
            .unwrap()
    }

    fn connector(mock_http: MockHttpClient) -> KoboConnector {
        KoboConnector::new(
            Arc::new(mock_http),
            Arc::new(LruResponseCache::new(16, Duration::from_secs(600))),
            &config(),
            "officer",
            "secret",
        )
    }

    fn asset_json(manager: &str) -> String {
        format!(
            r#"{{
                "uid": "a1",
                "name": "Household survey",
                "asset_type": "survey",
                "owner__username": "officer",
                "deployment__submission_count": 100,
                "settings": {{
                    "sector": {{"label": "Health", "value": "health"}},
                    "country": [{{"label": "Kenya", "value": "KEN"}}],
                    "description": "Round 3"
                }},
                "permissions": [
                    {{"permission": "https://kf.example.org/api/v2/permissions/view_asset.json",
                      "user": "https://kf.example.org/api/v2/users/AnonymousUser.json"}},
                    {{"permission": "https://kf.example.org/api/v2/permissions/manage_asset.json",
                      "user": "https://kf.example.org/api/v2/users/{}.json"}}
                ]
            }}"#,
            manager
        )
    }

    #[tokio::test]
    async fn test_get_asset_detects_manager() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(2).returning(|req| {
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Token secret".to_string())
            );

            if req.url == "https://kf.example.org/me" {
                ok(ME)
            } else {
                assert_eq!(req.url, "https://kf.example.org/api/v2/assets/a1.json");
                ok(asset_json("officer"))
            }
        });

        let asset = connector(mock_http).get_asset("a1", false).await.unwrap();

        assert_eq!(asset.uid, "a1");
        assert_eq!(asset.submission_count, 100);
        assert_eq!(asset.settings.country.unwrap().value, "KEN");
        assert!(asset.user_is_manager);
    }

    #[tokio::test]
    async fn test_get_asset_without_manage_permission() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(2).returning(|req| {
            if req.url.ends_with("/me") {
                ok(ME)
            } else {
                ok(asset_json("someone_else"))
            }
        });

        let asset = connector(mock_http).get_asset("a1", false).await.unwrap();
        assert!(!asset.user_is_manager);
    }

    #[tokio::test]
    async fn test_get_asset_is_cached_unless_forced() {
        let mut mock_http = MockHttpClient::new();

        // asset + me, then a forced asset refetch; me stays memoised
        mock_http.expect_execute().times(3).returning(|req| {
            if req.url.ends_with("/me") {
                ok(ME)
            } else {
                ok(asset_json("officer"))
            }
        });

        let connector = connector(mock_http);
        connector.get_asset("a1", false).await.unwrap();
        connector.get_asset("a1", false).await.unwrap();
        connector.get_asset("a1", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| status(401, r#"{"detail": "Invalid token."}"#));

        let err = connector(mock_http).get_asset("a1", false).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| ok("<html>maintenance</html>"));

        let err = connector(mock_http).get_asset("a1", false).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_then_surface_as_transport() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(MAX_RETRIES as usize)
            .returning(|_| status(503, ""));

        let err = connector(mock_http)
            .get_export("a1", "e1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[tokio::test]
    async fn test_list_submissions_follows_cursor() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(2).returning(|req| {
            if req.url == "https://kf.example.org/api/v2/assets/a1/data.json" {
                ok(r#"{
                    "count": 3,
                    "next": "https://kf.example.org/api/v2/assets/a1/data.json?start=2",
                    "results": [{"_id": 1}, {"_id": 2}]
                }"#)
            } else {
                assert!(req.url.ends_with("start=2"));
                ok(r#"{"count": 3, "next": null, "results": [{"_id": 3}]}"#)
            }
        });

        let connector = connector(mock_http);
        let first = connector.list_submissions("a1", None).await.unwrap();
        assert_eq!(first.results.len(), 2);

        let second = connector
            .list_submissions("a1", first.next.as_deref())
            .await
            .unwrap();
        assert_eq!(second.results.len(), 1);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_create_export_posts_payload() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(
                req.url,
                "https://kf.example.org/api/v2/assets/a1/exports/?format=json"
            );

            let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["type"], "spss_labels");
            assert_eq!(body["lang"], "_default");
            assert_eq!(body["fields"], serde_json::json!(["q1"]));
            assert!(body.get("query").is_none());

            Ok(HttpResponse {
                status: 201,
                headers: HashMap::new(),
                body: Bytes::from(r#"{"uid": "e1", "status": "created"}"#),
            })
        });

        let request = ExportRequest {
            format: ExportFormat::SpssLabels,
            fields_from_all_versions: true,
            group_sep: "/".to_string(),
            hierarchy_in_labels: true,
            lang: "_default".to_string(),
            multiple_select: "both".to_string(),
            flatten: true,
            query: None,
            fields: vec!["q1".to_string()],
        };

        let job = connector(mock_http)
            .create_export("a1", &request)
            .await
            .unwrap();
        assert_eq!(job.uid, "e1");
        assert_eq!(job.status, ExportStatus::Created);
    }

    #[tokio::test]
    async fn test_create_export_rejected() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| status(400, r#"{"fields": ["unknown field"]}"#));

        let request = ExportRequest {
            format: ExportFormat::Csv,
            fields_from_all_versions: true,
            group_sep: "/".to_string(),
            hierarchy_in_labels: true,
            lang: "_default".to_string(),
            multiple_select: "both".to_string(),
            flatten: true,
            query: None,
            fields: Vec::new(),
        };

        let err = connector(mock_http)
            .create_export("a1", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(msg) if msg.contains("unknown field")));
    }

    #[tokio::test]
    async fn test_get_export_is_never_cached() {
        let mut mock_http = MockHttpClient::new();
        let mut polls = 0;

        mock_http.expect_execute().times(2).returning(move |_| {
            polls += 1;
            if polls == 1 {
                ok(r#"{"uid": "e1", "status": "processing", "result": ""}"#)
            } else {
                ok(r#"{"uid": "e1", "status": "complete",
                       "result": "https://kf.example.org/exports/e1.csv"}"#)
            }
        });

        let connector = connector(mock_http);
        let first = connector.get_export("a1", "e1").await.unwrap();
        assert!(first.status.is_in_progress());
        assert!(first.result.is_none());

        let second = connector.get_export("a1", "e1").await.unwrap();
        assert_eq!(second.status, ExportStatus::Complete);
        assert_eq!(
            second.result.as_deref(),
            Some("https://kf.example.org/exports/e1.csv")
        );
    }

    #[tokio::test]
    async fn test_download_binary_and_text() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(2).returning(|req| {
            assert!(!req.headers.contains_key("Accept"));
            if req.url.ends_with(".xls") {
                ok(vec![0xD0, 0xCF, 0x11, 0xE0])
            } else {
                ok("_id,q1\n1,yes\n")
            }
        });

        let connector = connector(mock_http);

        let xls = connector
            .download("https://kf.example.org/exports/e1.xls", ExportFormat::Xls)
            .await
            .unwrap();
        assert!(matches!(xls, ArtifactContent::Binary(ref b) if b.len() == 4));

        let csv = connector
            .download("https://kf.example.org/exports/e1.csv", ExportFormat::Csv)
            .await
            .unwrap();
        assert_eq!(csv, ArtifactContent::Text("_id,q1\n1,yes\n".to_string()));
    }

    #[tokio::test]
    async fn test_download_questionnaire_url() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://kf.example.org/api/v2/assets/a1.xls");
            ok(vec![1, 2, 3])
        });

        let content = connector(mock_http)
            .download_questionnaire("a1", QuestionnaireFormat::Xls)
            .await
            .unwrap();
        assert_eq!(content.len(), 3);
    }

    #[tokio::test]
    async fn test_list_surveys_filters_and_paginates() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(3).returning(|req| {
            if req.url.ends_with("/me") {
                ok(ME)
            } else if req.url.ends_with("assets.json?limit=100") {
                ok(r#"{
                    "next": "https://kf.example.org/api/v2/assets.json?limit=100&offset=100",
                    "results": [
                        {"uid": "a1", "asset_type": "survey"},
                        {"uid": "t1", "asset_type": "template"}
                    ]
                }"#)
            } else {
                ok(r#"{"next": null, "results": [{"uid": "a2", "asset_type": "survey"}]}"#)
            }
        });

        let surveys = connector(mock_http).list_surveys().await.unwrap();
        let uids: Vec<_> = surveys.iter().map(|s| s.uid.as_str()).collect();

        assert_eq!(uids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_token_check() {
        let mut valid = MockHttpClient::new();
        valid
            .expect_execute()
            .times(1)
            .returning(|_| ok(r#"{"next": null, "results": []}"#));
        assert!(connector(valid).test_token().await);

        let mut invalid = MockHttpClient::new();
        invalid
            .expect_execute()
            .times(1)
            .returning(|_| status(401, "Invalid token."));
        assert!(!connector(invalid).test_token().await);
    }

    #[tokio::test]
    async fn test_factory_rejects_blank_token() {
        let factory = KoboConnectorFactory::new(Arc::new(MockHttpClient::new()), config());

        assert!(matches!(
            factory.connect("officer", "  "),
            Err(BridgeError::Unauthorized(_))
        ));
        assert!(factory.connect("officer", "secret").is_ok());
    }

    #[tokio::test]
    async fn test_bearer_scheme() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer secret".to_string())
            );
            ok(r#"{"uid": "e1", "status": "complete"}"#)
        });

        let config = SyncConfig::builder()
            .kobo_url("https://kf.example.org")
            .auth_scheme(AuthScheme::Bearer)
            .database_path("/tmp/sync.db")
            .artifact_dir("/tmp/artifacts")
            .build()
            .unwrap();
        let connector = KoboConnector::new(
            Arc::new(mock_http),
            Arc::new(crate::cache::DisabledCache),
            &config,
            "officer",
            "secret",
        );

        connector.get_export("a1", "e1").await.unwrap();
    }
}
