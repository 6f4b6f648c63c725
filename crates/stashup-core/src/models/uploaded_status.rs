use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record written once per successful upload, keyed by the original hash.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedStatus {
    pub original_sha1: String,
    /// Hash recomputed from the local resource after the upload.
    pub modified_sha1: String,
    pub integrity_ok: bool,
    pub uploaded: bool,
    pub last_updated: DateTime<Utc>,
}

impl UploadedStatus {
    pub fn new(original_sha1: String, modified_sha1: String) -> Self {
        let integrity_ok = !modified_sha1.is_empty() && original_sha1 == modified_sha1;
        Self {
            original_sha1,
            modified_sha1,
            integrity_ok,
            uploaded: true,
            last_updated: Utc::now(),
        }
    }
}

/// Image the user marked as not meant for upload.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotForUploadStatus {
    pub image_sha1: String,
    pub marked_at: DateTime<Utc>,
}
