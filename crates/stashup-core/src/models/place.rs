use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

/// Structured-data entity an upload depicts (the target of the image claim).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceTarget {
    /// Entity id, e.g. `Q42`.
    pub id: String,
    pub name: String,
    /// Existing primary image reference, if the entity already has one.
    #[serde(default)]
    pub image_value: Option<String>,
    #[serde(default)]
    pub location: Option<LatLng>,
}

impl PlaceTarget {
    pub fn has_image(&self) -> bool {
        self.image_value
            .as_deref()
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Local cache entry for a place shown on the map.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub entity_id: String,
    pub name: String,
    pub pic: Option<String>,
    pub updated_at: DateTime<Utc>,
}
