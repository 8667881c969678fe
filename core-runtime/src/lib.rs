//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the survey sync crates:
//! - Logging and tracing infrastructure
//! - Configuration with fail-fast validation
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! its settings and the broadcast channel used to report cycle progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthScheme, SyncConfig};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SyncEvent};
