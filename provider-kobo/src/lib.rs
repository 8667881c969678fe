//! # KoboToolbox Provider
//!
//! Implements `SurveyProvider` for the KoboToolbox v2 REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Asset metadata with manager-permission detection
//! - Cursor-walked submission pages
//! - Export creation, polling and result download
//! - Questionnaire download
//! - A response cache collaborator namespaced by requesting identity

pub mod cache;
pub mod connector;
pub mod error;
pub mod types;

pub use cache::{DisabledCache, LruResponseCache, ResponseCache};
pub use connector::{KoboConnector, KoboConnectorFactory};
pub use error::{KoboError, Result};
