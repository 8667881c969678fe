//! Workspace entry crate.
//!
//! Re-exports the service façade so host applications can depend on a single
//! crate. The `desktop-shims` feature (default) enables the desktop bridge
//! implementations and [`bootstrap_desktop`].

pub use core_service::*;

pub use core_auth::UserId;
pub use core_runtime::config::{AuthScheme, SyncConfig};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_sync::{ImportStatus, RefreshRequest, SyncError};
