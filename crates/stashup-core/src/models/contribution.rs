use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::{CanonicalRecord, ChunkInfo, PlaceTarget};
use crate::naming::file_page_title;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContributionState {
    Queued,
    InProgress,
    Paused,
    Failed,
    Completed,
}

impl ContributionState {
    /// States of contributions that still occupy the upload queue.
    pub const PENDING: [ContributionState; 4] = [
        ContributionState::InProgress,
        ContributionState::Failed,
        ContributionState::Queued,
        ContributionState::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionState::Queued => "queued",
            ContributionState::InProgress => "in_progress",
            ContributionState::Paused => "paused",
            ContributionState::Failed => "failed",
            ContributionState::Completed => "completed",
        }
    }

    /// Failed and Paused contributions may go back to the queue.
    pub fn can_requeue(&self) -> bool {
        matches!(self, ContributionState::Failed | ContributionState::Paused)
    }
}

impl Display for ContributionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContributionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ContributionState::Queued),
            "in_progress" => Ok(ContributionState::InProgress),
            "paused" => Ok(ContributionState::Paused),
            "failed" => Ok(ContributionState::Failed),
            "completed" => Ok(ContributionState::Completed),
            _ => Err(anyhow::anyhow!("Invalid contribution state: {}", s)),
        }
    }
}

/// One user-submitted file pending or having completed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub page_id: String,
    /// Desired remote file name, without the `File:` prefix.
    pub filename: String,
    pub display_title: String,
    pub local_path: String,
    /// Original resource the file was picked from. Only contributions with one
    /// get an integrity audit record.
    pub content_uri: Option<String>,
    pub state: ContributionState,
    pub transferred: i64,
    pub chunk_info: Option<ChunkInfo>,
    pub place: Option<PlaceTarget>,
    /// Page text committed with the file.
    pub wikitext: String,
    pub captions: BTreeMap<String, String>,
    /// Entity ids the file depicts.
    pub depictions: Vec<String>,
    pub error_info: Option<String>,
    pub image_sha1: String,
    pub canonical: Option<CanonicalRecord>,
    pub date_created: DateTime<Utc>,
    pub date_upload_started: Option<DateTime<Utc>>,
    pub date_modified: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: Option<String>,
) -> Result<Option<T>, sqlx::Error> {
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            sqlx::Error::Decode(format!("Failed to parse {}: {}", column, e).into())
        })
    })
    .transpose()
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Contribution {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Contribution {
            page_id: row.try_get("page_id")?,
            filename: row.try_get("filename")?,
            display_title: row.try_get("display_title")?,
            local_path: row.try_get("local_path")?,
            content_uri: row.try_get("content_uri")?,
            state: row.try_get::<String, _>("state")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse state: {}", e).into())
            })?,
            transferred: row.try_get("transferred")?,
            chunk_info: decode_json("chunk_info", row.try_get("chunk_info")?)?,
            place: decode_json("place", row.try_get("place")?)?,
            wikitext: row.try_get("wikitext")?,
            captions: decode_json("captions", row.try_get("captions")?)?.unwrap_or_default(),
            depictions: decode_json("depictions", row.try_get("depictions")?)?
                .unwrap_or_default(),
            error_info: row.try_get("error_info")?,
            image_sha1: row.try_get("image_sha1")?,
            canonical: decode_json("canonical", row.try_get("canonical")?)?,
            date_created: row.try_get("date_created")?,
            date_upload_started: row.try_get("date_upload_started")?,
            date_modified: row.try_get("date_modified")?,
        })
    }
}

impl Contribution {
    /// A freshly submitted contribution, waiting in the queue.
    pub fn new_queued(
        page_id: impl Into<String>,
        filename: impl Into<String>,
        local_path: impl Into<String>,
        image_sha1: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let now = Utc::now();
        Self {
            page_id: page_id.into(),
            display_title: display_title_of(&filename),
            filename,
            local_path: local_path.into(),
            content_uri: None,
            state: ContributionState::Queued,
            transferred: 0,
            chunk_info: None,
            place: None,
            wikitext: String::new(),
            captions: BTreeMap::new(),
            depictions: Vec::new(),
            error_info: None,
            image_sha1: image_sha1.into(),
            canonical: None,
            date_created: now,
            date_upload_started: Some(now),
            date_modified: now,
        }
    }

    /// Submission timestamp the queue orders by.
    pub fn upload_started_at(&self) -> DateTime<Utc> {
        self.date_upload_started.unwrap_or(self.date_created)
    }

    pub fn file_page_title(&self) -> String {
        file_page_title(&self.filename)
    }

    /// A place target without coordinates cannot be checked against the upload,
    /// so no claim is made for it.
    pub fn has_invalid_location(&self) -> bool {
        self.place
            .as_ref()
            .map(|p| p.location.is_none())
            .unwrap_or(false)
    }

    pub fn clear_chunks(&mut self) {
        self.chunk_info = None;
    }

    /// Tag and numeric id identifying this upload's notification.
    pub fn notification_identity(&self) -> (String, i32) {
        let tag = self.local_path.clone();
        let id = string_hash(&format!("{}{}", self.local_path, self.filename));
        (tag, id)
    }

    /// Completed copy of this record, merged with the server's canonical metadata.
    pub fn complete_with(&self, record: CanonicalRecord) -> Contribution {
        let mut completed = self.clone();
        completed.state = ContributionState::Completed;
        completed.filename = record.filename.clone();
        completed.chunk_info = None;
        completed.error_info = None;
        completed.canonical = Some(record);
        completed.date_modified = Utc::now();
        completed
    }
}

fn display_title_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename[..idx].to_string(),
        _ => filename.to_string(),
    }
}

/// 31-multiplier string hash; stable across runs so notification ids survive restarts.
fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}
