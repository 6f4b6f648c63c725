use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server-side metadata of a committed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub page_id: Option<String>,
    /// File name without the namespace prefix.
    pub filename: String,
    pub image_url: Option<String>,
    pub thumb_url: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub sha1: Option<String>,
    pub date_uploaded: Option<DateTime<Utc>>,
    /// Descriptions keyed by language code.
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}
