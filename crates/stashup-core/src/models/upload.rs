use serde::{Deserialize, Serialize};

use crate::naming::file_page_title;

/// Resume point of a chunked stash transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Stash key returned by the server for the partial upload.
    pub file_key: String,
    /// Byte offset of the next chunk to send.
    pub next_offset: u64,
    pub next_chunk_index: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StashUploadState {
    Success,
    Paused,
    Cancelled,
    Failed,
}

/// Outcome of phase 1. Lives only for the current attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashUploadResult {
    pub state: StashUploadState,
    pub file_key: Option<String>,
    pub error_message: Option<String>,
}

impl StashUploadResult {
    pub fn success(file_key: impl Into<String>) -> Self {
        Self {
            state: StashUploadState::Success,
            file_key: Some(file_key.into()),
            error_message: None,
        }
    }

    pub fn paused() -> Self {
        Self {
            state: StashUploadState::Paused,
            file_key: None,
            error_message: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            state: StashUploadState::Cancelled,
            file_key: None,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            state: StashUploadState::Failed,
            file_key: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Outcome of phase 2 (commit from stash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// "Success", or the warning/error code the server returned instead.
    pub result: String,
    pub file_key: String,
    /// Final remote file name as the server recorded it.
    pub filename: String,
}

impl UploadResult {
    pub fn is_successful(&self) -> bool {
        self.result == "Success"
    }

    /// `File:Name_with_underscores.jpg`
    pub fn canonical_file_name(&self) -> String {
        file_page_title(&self.filename).replace(' ', "_")
    }
}

/// Events the stash transfer emits while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Transferred { transferred: u64, total: u64 },
    ChunkUploaded(ChunkInfo),
}
