//! Local dataset aggregate created when a survey is first imported.

use crate::resource::DatasetId;
use bridge_traits::survey::{AssetMetadata, LabeledValue};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    /// Remote asset uid
    pub asset_id: String,
    pub title: String,
    pub owner: String,
    pub notes: String,
    pub sector: Option<LabeledValue>,
    pub country: Option<LabeledValue>,
    /// Whose token the download workers use
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn from_asset(asset: &AssetMetadata, created_by: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: DatasetId::new(),
            asset_id: asset.uid.clone(),
            title: asset.name.clone(),
            owner: asset.owner.clone(),
            notes: import_notes(asset),
            sector: asset.settings.sector.clone(),
            country: asset.settings.country.clone(),
            created_by,
            created_at: now,
        }
    }
}

/// Notes block describing where the dataset came from.
pub fn import_notes(asset: &AssetMetadata) -> String {
    let mut notes = format!(
        "Dataset imported from survey platform\nOwner: {}",
        asset.owner
    );

    if let Some(sector) = &asset.settings.sector {
        notes.push_str(&format!("\nSector: {}", sector.label));
    }
    if let Some(country) = &asset.settings.country {
        notes.push_str(&format!("\nCountry: {} ({})", country.label, country.value));
    }
    if let Some(description) = asset
        .settings
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        notes.push_str(&format!(
            "\nOriginal resource description: {}",
            description
        ));
    }

    notes
}
