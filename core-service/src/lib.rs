//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, artifact storage) into the survey sync core. It opens the SQLite
//! pool, applies the schema, registers the download handler on the job queue
//! and hands back a [`SurveySyncService`] exposing the coordinator.
//!
//! Desktop and server hosts enable the `desktop-shims` feature (default) to
//! get [`CoreDependencies::desktop`], backed by `reqwest`, the OS keychain and
//! the local filesystem.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_desktop::TokioJobQueue;
use bridge_traits::{
    background::JobQueue,
    error::BridgeError,
    http::HttpClient,
    storage::{ArtifactStore, SecureStore},
    survey::SurveyProviderFactory,
    time::{Clock, SystemClock},
};
use core_auth::{AuthError, TokenStore, UserId};
use core_runtime::config::SyncConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_sync::{
    create_pool, DatabaseConfig, DownloadWorker, SqliteDatasetRepository,
    SqliteResourceRepository, SyncContext, SyncCoordinator, SyncError, DOWNLOAD_TASK,
};
use provider_kobo::{KoboConnectorFactory, ResponseCache};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

#[cfg(feature = "desktop-shims")]
use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient, TokioArtifactStore};

/// Aggregated handle to the bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            http_client,
            secure_store,
            artifacts,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Desktop defaults: `reqwest` transport, OS keychain and artifacts under
    /// `config.artifact_dir`.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(config: &SyncConfig) -> Result<Self> {
        let http_client = ReqwestHttpClient::with_timeout(config.request_timeout)
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        Ok(Self::new(
            Arc::new(http_client),
            Arc::new(KeyringSecureStore::new()),
            Arc::new(TokioArtifactStore::new(config.artifact_dir.clone())),
        ))
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SurveySyncService {
    config: SyncConfig,
    coordinator: Arc<SyncCoordinator>,
    tokens: TokenStore,
    providers: Arc<dyn SurveyProviderFactory>,
    cache: Arc<dyn ResponseCache>,
    queue: Arc<TokioJobQueue>,
    events: EventBus,
    pool: SqlitePool,
}

impl SurveySyncService {
    /// Open the database and wire the sync core.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or its schema applied.
    pub async fn new(config: SyncConfig, deps: CoreDependencies) -> Result<Self> {
        info!(
            kobo_url = %config.kobo_url,
            database = %config.database_path.display(),
            "Starting survey sync service"
        );

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;

        let events = EventBus::default();
        let tokens = TokenStore::new(Arc::clone(&deps.secure_store));
        let factory = KoboConnectorFactory::new(Arc::clone(&deps.http_client), config.clone());
        let cache = factory.cache();
        let providers: Arc<dyn SurveyProviderFactory> = Arc::new(factory);
        let queue = Arc::new(TokioJobQueue::new());

        let resources = SqliteResourceRepository::new(pool.clone())
            .with_clock(Arc::clone(&deps.clock))
            .with_stale_after(config.stale_after);

        let ctx = SyncContext {
            resources: Arc::new(resources),
            datasets: Arc::new(SqliteDatasetRepository::new(pool.clone())),
            providers: Arc::clone(&providers),
            credentials: Arc::new(tokens.clone()),
            artifacts: Arc::clone(&deps.artifacts),
            queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
            clock: Arc::clone(&deps.clock),
            events: events.clone(),
        };

        let worker = Arc::new(DownloadWorker::new(ctx.clone(), &config));
        queue
            .register_handler(DOWNLOAD_TASK, move |job| {
                let worker = Arc::clone(&worker);
                async move {
                    let outcome = worker
                        .handle(job)
                        .await
                        .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
                    debug!(outcome = ?outcome, "Download job finished");
                    Ok(())
                }
            })
            .await;

        let coordinator = Arc::new(SyncCoordinator::new(ctx, &config));

        Ok(Self {
            config,
            coordinator,
            tokens,
            providers,
            cache,
            queue,
            events,
            pool,
        })
    }

    /// Import, update check and refresh operations.
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The queue download jobs run on.
    pub fn queue(&self) -> Arc<TokioJobQueue> {
        Arc::clone(&self.queue)
    }

    /// Validate `token` against the platform and store it for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the platform refuses the token;
    /// nothing is stored in that case. An accepted token drops every cached
    /// platform response.
    pub async fn register_token(&self, user: &UserId, token: &str) -> Result<()> {
        let accepted = match self.providers.connect(user.as_str(), token) {
            Ok(provider) => provider.test_token().await,
            Err(BridgeError::Unauthorized(_)) => false,
            Err(e) => return Err(SyncError::from(e).into()),
        };

        if !accepted {
            warn!(user_id = %user, "Survey platform token rejected");
            self.emit(AuthEvent::TokenRejected {
                user_id: user.to_string(),
            });
            return Err(AuthError::InvalidToken.into());
        }

        self.tokens.store_token(user, token).await?;
        self.cache.clear().await;
        self.emit(AuthEvent::TokenRegistered {
            user_id: user.to_string(),
        });

        Ok(())
    }

    pub async fn remove_token(&self, user: &UserId) -> Result<()> {
        self.tokens.delete_token(user).await?;
        self.cache.clear().await;
        self.emit(AuthEvent::TokenRemoved {
            user_id: user.to_string(),
        });
        Ok(())
    }

    pub async fn has_token(&self, user: &UserId) -> Result<bool> {
        Ok(self.tokens.has_token(user).await?)
    }

    /// Abort queued downloads and close the database.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        self.pool.close().await;
        info!("Survey sync service stopped");
    }

    fn emit(&self, event: AuthEvent) {
        self.events.emit(CoreEvent::Auth(event)).ok();
    }
}

/// Build a service with the desktop bridge implementations.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::SyncConfig;
///
/// let config = SyncConfig::builder()
///     .database_path("/var/lib/survey-sync/sync.db")
///     .artifact_dir("/var/lib/survey-sync/artifacts")
///     .build()?;
/// let service = core_service::bootstrap_desktop(config).await?;
/// let status = service.coordinator().import_status("aXk3Survey").await;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: SyncConfig) -> Result<SurveySyncService> {
    let deps = CoreDependencies::desktop(&config)?;
    SurveySyncService::new(config, deps).await
}
