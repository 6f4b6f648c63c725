//! Collaborator traits
//!
//! The upload worker talks to persistence, the media repository and the host
//! platform only through these traits. The store crate, the HTTP client crate and
//! the binary provide the implementations; tests use in-memory mocks.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{AppError, UploadError};
use crate::models::{
    CanonicalRecord, Contribution, ContributionState, NotificationEvent, Place, PlaceTarget,
    ProgressEvent, StashUploadResult, UploadResult, UploadedStatus,
};
use crate::transfer::TransferHandle;

/// Persistent queue of contributions.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    /// Contributions in any of `states`, oldest submission first (ties by page id).
    async fn list_by_state(
        &self,
        states: &[ContributionState],
    ) -> Result<Vec<Contribution>, AppError>;

    async fn get(&self, page_id: &str) -> Result<Option<Contribution>, AppError>;

    /// Inserts or replaces the record with the same page id.
    async fn save(&self, contribution: &Contribution) -> Result<(), AppError>;

    /// Deletes `old` and inserts `new` in one transaction.
    async fn delete_and_insert(
        &self,
        old: &Contribution,
        new: &Contribution,
    ) -> Result<(), AppError>;

    /// Returns whether a record was deleted.
    async fn delete(&self, page_id: &str) -> Result<bool, AppError>;

    /// Moves InProgress records untouched for longer than `grace` to Paused.
    /// Returns the number of records moved.
    async fn recover_stale(&self, grace: chrono::Duration) -> Result<u64, AppError>;
}

/// Integrity audit records.
#[async_trait]
pub trait UploadedStatusStore: Send + Sync {
    /// No-op when a record for the same original hash exists. Returns whether a row was written.
    async fn insert_uploaded(&self, status: &UploadedStatus) -> Result<bool, AppError>;

    async fn get(&self, original_sha1: &str) -> Result<Option<UploadedStatus>, AppError>;
}

#[async_trait]
pub trait PlaceStore: Send + Sync {
    async fn fetch(&self, entity_id: &str) -> Result<Option<Place>, AppError>;
    async fn save(&self, place: &Place) -> Result<(), AppError>;
}

/// Two-phase upload against the media repository.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Phase 1: streams the local file into the server stash, resuming from the
    /// contribution's checkpoint when it has one. Checks `control` between chunks.
    async fn stash_upload(
        &self,
        filename: &str,
        contribution: &Contribution,
        progress_tx: UnboundedSender<ProgressEvent>,
        control: &TransferHandle,
    ) -> Result<StashUploadResult, UploadError>;

    /// Phase 2: publishes stashed content under `filename`.
    async fn commit_from_stash(
        &self,
        contribution: &Contribution,
        filename: &str,
        file_key: &str,
    ) -> Result<UploadResult, UploadError>;

    async fn page_exists(&self, title: &str) -> Result<bool, UploadError>;
}

#[async_trait]
pub trait StructuredDataService: Send + Sync {
    /// Claims the uploaded file as the target's primary image. Returns the revision id.
    async fn attach_image_reference(
        &self,
        place: &PlaceTarget,
        filename: &str,
        captions: &BTreeMap<String, String>,
    ) -> Result<Option<i64>, UploadError>;

    /// Adds depicted entities and captions to the uploaded file's media entity.
    async fn add_depictions_and_captions(
        &self,
        upload_result: &UploadResult,
        contribution: &Contribution,
    ) -> Result<(), UploadError>;
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn fetch_canonical_record(&self, title: &str) -> Result<CanonicalRecord, UploadError>;
}

/// Receives presentation intents. Rendering them is up to the host.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Host hook invoked when the session token is rejected.
#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_invalid_login(&self, username: Option<&str>);
}

/// Logs every intent through `tracing`.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, event: NotificationEvent) {
        match &event {
            NotificationEvent::Starting { count } => {
                tracing::info!(kind = event.kind(), count = count, "Uploads starting");
            }
            NotificationEvent::StartingDismissed => {
                tracing::debug!(kind = event.kind(), "Uploads starting dismissed");
            }
            NotificationEvent::Progress {
                target,
                percent,
                finishing,
            } => {
                tracing::debug!(
                    kind = event.kind(),
                    page_id = %target.page_id,
                    percent = percent,
                    finishing = finishing,
                    "Upload progress"
                );
            }
            NotificationEvent::Success { target } => {
                tracing::info!(kind = event.kind(), page_id = %target.page_id, title = %target.display_title, "Upload succeeded");
            }
            NotificationEvent::Failed { target, error } => {
                tracing::warn!(
                    kind = event.kind(),
                    page_id = %target.page_id,
                    error = error.as_deref().unwrap_or(""),
                    "Upload failed"
                );
            }
            NotificationEvent::Paused { target } => {
                tracing::info!(kind = event.kind(), page_id = %target.page_id, "Upload paused");
            }
            NotificationEvent::Cancelled { target } => {
                tracing::info!(kind = event.kind(), page_id = %target.page_id, "Upload cancelled");
            }
            NotificationEvent::InvalidLogin { target } => {
                tracing::warn!(kind = event.kind(), page_id = %target.page_id, "Login session expired");
            }
            NotificationEvent::PlaceEditOutcome(outcome) => {
                tracing::info!(
                    kind = event.kind(),
                    place_id = %outcome.place_id,
                    revision_id = ?outcome.revision_id,
                    skipped = outcome.skipped,
                    "Place edit finished"
                );
            }
        }
    }
}

/// Only logs; hosts with a login flow provide their own hook.
pub struct NoOpSessionHook;

#[async_trait]
impl SessionHook for NoOpSessionHook {
    async fn on_invalid_login(&self, username: Option<&str>) {
        tracing::warn!(
            username = username.unwrap_or("<unknown>"),
            "Invalid login session; re-authentication required"
        );
    }
}
