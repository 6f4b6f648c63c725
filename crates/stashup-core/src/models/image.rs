use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device image listed by the gallery selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub path: String,
    /// Folder ("bucket") the image lives in.
    pub bucket_id: i64,
    pub bucket_name: String,
    pub sha1: Option<String>,
    pub date_modified: Option<DateTime<Utc>>,
}
