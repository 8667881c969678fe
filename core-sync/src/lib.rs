//! # Survey Sync Module
//!
//! Keeps local survey artifacts in step with a remote survey platform.
//!
//! ## Overview
//!
//! A survey is imported once as a [`Dataset`] owning one questionnaire
//! resource and one resource per requested data format. Each resource is
//! tracked by a [`SyncedResource`] whose status only moves
//! `pending → complete` or `pending → error`; a new cycle is the only way
//! back to `pending`.
//!
//! ## Components
//!
//! - **Resource Model** (`resource`): Resource targets, status rules and cycle resets
//! - **Dataset** (`dataset`): The local aggregate created at import
//! - **Repositories** (`repository`): SQLite persistence with cycle-fenced writes
//! - **Export Planner** (`planner`): Filter input parsing and per-format planning
//! - **Download Worker** (`worker`): One download attempt per queued job
//! - **Sync Coordinator** (`coordinator`): Import, update checks and refresh cycles

pub mod context;
pub mod coordinator;
pub mod dataset;
pub mod db;
pub mod error;
pub mod planner;
pub mod repository;
pub mod resource;
pub mod worker;

pub use context::SyncContext;
pub use coordinator::{
    new_submissions, ImportOutcome, RefreshOutcome, RefreshRequest, SurveySummary,
    SyncCoordinator, QUESTIONNAIRE_RESOURCE,
};
pub use dataset::Dataset;
pub use db::{create_pool, create_test_pool, initialize, DatabaseConfig};
pub use error::{Result, SyncError};
pub use planner::{FormatPlan, ImportPlan, RawFilterInput};
pub use repository::{
    DatasetRepository, ResourceRepository, SqliteDatasetRepository, SqliteResourceRepository,
};
pub use resource::{
    CycleReset, DatasetId, DateRange, DownloadStatus, FilterParams, ImportStatus, MultipleSelect,
    ResourceId, ResourceKind, ResourceTarget, StatusPatch, SyncedResource,
};
pub use worker::{DownloadTask, DownloadWorker, WorkerOutcome, DOWNLOAD_TASK};
