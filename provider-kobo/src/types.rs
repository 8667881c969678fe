//! KoboToolbox API response types
//!
//! Envelopes the v2 API wraps around the shared wire types.

use bridge_traits::survey::AssetMetadata;
use serde::Deserialize;

/// `GET assets.json` page
///
/// See: https://kf.kobotoolbox.org/api/v2/docs/
#[derive(Debug, Deserialize)]
pub struct AssetListResponse {
    #[serde(default)]
    pub count: Option<u64>,

    /// Absolute URL of the next page
    #[serde(default)]
    pub next: Option<String>,

    #[serde(default)]
    pub results: Vec<AssetMetadata>,
}

/// `GET {kobo_url}/me`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub username: String,
}
