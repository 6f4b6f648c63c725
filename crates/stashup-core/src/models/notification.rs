use serde::{Deserialize, Serialize};

use super::Contribution;

/// Which upload a notification belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub page_id: String,
    pub display_title: String,
    pub tag: String,
    pub id: i32,
}

impl From<&Contribution> for NotificationTarget {
    fn from(contribution: &Contribution) -> Self {
        let (tag, id) = contribution.notification_identity();
        Self {
            page_id: contribution.page_id.clone(),
            display_title: contribution.display_title.clone(),
            tag,
            id,
        }
    }
}

/// Result of the image claim on a structured-data target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceEditOutcome {
    pub place_id: String,
    pub revision_id: Option<i64>,
    /// The target already had an image, so no claim was made.
    pub skipped: bool,
}

/// Discrete presentation intents emitted by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Uploads are about to be processed; `count` is the current queue size.
    Starting { count: usize },
    StartingDismissed,
    Progress {
        target: NotificationTarget,
        percent: u8,
        /// All bytes are sent and the server is assembling the file.
        finishing: bool,
    },
    Success { target: NotificationTarget },
    Failed {
        target: NotificationTarget,
        error: Option<String>,
    },
    Paused { target: NotificationTarget },
    Cancelled { target: NotificationTarget },
    InvalidLogin { target: NotificationTarget },
    PlaceEditOutcome(PlaceEditOutcome),
}

impl NotificationEvent {
    /// Stable name used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Starting { .. } => "starting",
            NotificationEvent::StartingDismissed => "starting_dismissed",
            NotificationEvent::Progress { .. } => "progress",
            NotificationEvent::Success { .. } => "success",
            NotificationEvent::Failed { .. } => "failed",
            NotificationEvent::Paused { .. } => "paused",
            NotificationEvent::Cancelled { .. } => "cancelled",
            NotificationEvent::InvalidLogin { .. } => "invalid_login",
            NotificationEvent::PlaceEditOutcome(_) => "place_edit_outcome",
        }
    }
}

/// Percentage of `transferred` over `total`, clamped to 0..=100.
pub fn progress_percent(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (transferred as f64 / total as f64 * 100.0) as u64;
    pct.min(100) as u8
}
