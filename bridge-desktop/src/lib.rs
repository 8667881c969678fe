//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `ArtifactStore` using `tokio::fs`
//! - `SecureStore` using the `keyring` crate
//! - `JobQueue` using Tokio tasks and timers
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioArtifactStore, TokioJobQueue};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let artifacts = TokioArtifactStore::new("/var/lib/survey-sync/artifacts");
//!     let queue = TokioJobQueue::new();
//!
//!     // Hand these to the sync service
//!     Ok(())
//! }
//! ```

mod background;
mod filesystem;
mod http;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use background::{JobHandler, TokioJobQueue, DEFAULT_FINISHED_RETENTION};
pub use filesystem::TokioArtifactStore;
pub use http::ReqwestHttpClient;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
