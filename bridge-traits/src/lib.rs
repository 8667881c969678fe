//! # Host Bridge Traits
//!
//! Capability contracts between the survey sync core and the host it runs in.
//!
//! ## Overview
//!
//! The core never talks to the network, the filesystem, the OS keychain or a
//! task scheduler directly. Each of those is a trait here, implemented once per
//! host (see `bridge-desktop`) and injected at construction time.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP transport
//! - [`SurveyProvider`](survey::SurveyProvider) - Authenticated survey platform access
//! - [`SurveyProviderFactory`](survey::SurveyProviderFactory) - Per-identity provider construction
//!
//! ### Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Secret Service)
//! - [`ArtifactStore`](storage::ArtifactStore) - Where downloaded files are materialized
//!
//! ### Scheduling
//! - [`JobQueue`](background::JobQueue) - Fire-and-forget jobs with delayed enqueue
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Its variants keep
//! the remote failure class (unauthorized, rejected, transport, not found)
//! intact across the trait boundary so the core can decide what is retryable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! behind `Arc` across tasks.

pub mod background;
pub mod error;
pub mod http;
pub mod storage;
pub mod survey;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{JobHandle, JobQueue, JobRequest, JobStatus};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::{ArtifactContent, ArtifactStore, SecureStore, StoredArtifact};
pub use survey::{
    submission_stream, AssetMetadata, ExportFormat, ExportJob, ExportRequest, ExportStatus,
    QuestionnaireFormat, Submission, SubmissionPage, SurveyProvider, SurveyProviderFactory,
};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
