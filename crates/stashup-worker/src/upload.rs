//! Two-phase upload of a single contribution.
//!
//! Phase 1 streams the file into the server stash, phase 2 publishes it under a
//! collision-free name. Every exit path leaves the contribution out of
//! InProgress: Completed, Failed, Paused, or deleted when the user discarded it.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use stashup_core::models::{
    Contribution, ContributionState, NotificationEvent, NotificationTarget, StashUploadResult,
    StashUploadState, UploadResult,
};
use stashup_core::{
    ErrorClass, LogLevel, TransferHandle, UploadError, WorkerConfig, INVALID_TOKEN_ERROR_MESSAGE,
};

use crate::completion::record_completion;
use crate::context::UploadContext;
use crate::control::TransferControl;
use crate::edit::run_place_edit;
use crate::naming::resolve_unique_name;
use crate::progress::spawn_progress_pump;

/// Where a processed contribution ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed,
    Failed,
    Paused,
    /// Discarded by the user; the record is gone.
    Cancelled,
}

fn log_upload_error(error: &UploadError, page_id: &str, message: &str) {
    match error.log_level() {
        LogLevel::Error => {
            tracing::error!(page_id = %page_id, error = %error, error_code = error.error_code(), "{}", message)
        }
        LogLevel::Warn => {
            tracing::warn!(page_id = %page_id, error = %error, error_code = error.error_code(), "{}", message)
        }
        LogLevel::Debug => {
            tracing::debug!(page_id = %page_id, error = %error, error_code = error.error_code(), "{}", message)
        }
    }
}

#[derive(Clone)]
pub(crate) struct UploadProcessor {
    ctx: UploadContext,
    config: WorkerConfig,
    control: TransferControl,
}

impl UploadProcessor {
    pub(crate) fn new(ctx: UploadContext, config: WorkerConfig, control: TransferControl) -> Self {
        Self {
            ctx,
            config,
            control,
        }
    }

    /// Uploads one InProgress contribution. `Err` only for errors that must abort
    /// the drain (store failures); everything else is recorded on the contribution.
    #[tracing::instrument(
        skip_all,
        fields(page_id = %contribution.page_id, filename = %contribution.filename)
    )]
    pub(crate) async fn process(
        &self,
        contribution: Contribution,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let page_id = contribution.page_id.clone();
        let handle = self.control.register(&page_id).await;
        let stashed = self.stash(contribution, &handle, cancel).await;
        self.control.unregister(&page_id).await;
        let (contribution, stash_result) = stashed?;

        let file_key = match stash_result.state {
            StashUploadState::Success => stash_result.file_key,
            StashUploadState::Paused => return self.pause(contribution).await,
            StashUploadState::Cancelled => return self.discard(contribution).await,
            StashUploadState::Failed => {
                let message = stash_result
                    .error_message
                    .unwrap_or_else(|| "Stash upload failed".to_string());
                return self.fail(contribution, message).await;
            }
        };
        let Some(file_key) = file_key else {
            return self
                .fail(contribution, "Stash upload returned no file key".to_string())
                .await;
        };

        if cancel.is_cancelled() {
            tracing::info!("Worker cancelled after stash, not committing");
            return self
                .fail(contribution, "Upload cancelled before commit".to_string())
                .await;
        }

        self.commit(contribution, &file_key).await
    }

    /// Phase 1. Returns the contribution with the progress the pump persisted.
    async fn stash(
        &self,
        contribution: Contribution,
        handle: &TransferHandle,
        cancel: &CancellationToken,
    ) -> Result<(Contribution, StashUploadResult), UploadError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = spawn_progress_pump(
            contribution.clone(),
            self.ctx.contributions.clone(),
            self.ctx.notifications.clone(),
            self.config.progress_rate_per_sec,
            rx,
        );
        let watcher = {
            let cancel = cancel.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                handle.pause();
            })
        };

        let result = self
            .ctx
            .uploads
            .stash_upload(&contribution.filename, &contribution, tx, handle)
            .await;
        watcher.abort();

        let contribution = pump
            .await
            .map_err(|e| UploadError::Internal(format!("Progress task failed: {}", e)))??;

        let result = match result {
            Ok(result) => result,
            Err(e) if e.class() == ErrorClass::FatalWorker => return Err(e),
            Err(e) => {
                log_upload_error(&e, &contribution.page_id, "Stash upload raised an error");
                StashUploadResult::failed(e.user_message())
            }
        };
        Ok((contribution, result))
    }

    /// Phase 2 on a successful stash.
    async fn commit(
        &self,
        contribution: Contribution,
        file_key: &str,
    ) -> Result<UploadOutcome, UploadError> {
        let filename =
            match resolve_unique_name(self.ctx.uploads.as_ref(), &contribution.filename).await {
                Ok(filename) => filename,
                Err(e) => return self.fail_commit(contribution, e).await,
            };

        let upload_result = match self
            .ctx
            .uploads
            .commit_from_stash(&contribution, &filename, file_key)
            .await
        {
            Ok(result) if result.is_successful() => result,
            Ok(result) => {
                return self
                    .fail_commit(contribution, UploadError::Commit(result.result))
                    .await
            }
            Err(e) => return self.fail_commit(contribution, e).await,
        };

        tracing::info!(filename = %upload_result.filename, "Committed from stash");
        self.finish(contribution, upload_result).await
    }

    async fn fail_commit(
        &self,
        contribution: Contribution,
        error: UploadError,
    ) -> Result<UploadOutcome, UploadError> {
        if error.class() == ErrorClass::FatalWorker {
            return Err(error);
        }
        log_upload_error(&error, &contribution.page_id, "Commit from stash failed");
        if error.requires_checkpoint_reset() {
            tracing::info!(
                page_id = %contribution.page_id,
                error_code = error.error_code(),
                "Clearing chunk checkpoint after stash error"
            );
        }
        self.fail(contribution, error.user_message()).await
    }

    /// Secondary edits, completion, then the success intent.
    async fn finish(
        &self,
        contribution: Contribution,
        upload_result: UploadResult,
    ) -> Result<UploadOutcome, UploadError> {
        if let Err(e) = self
            .ctx
            .structured_data
            .add_depictions_and_captions(&upload_result, &contribution)
            .await
        {
            log_upload_error(&e, &contribution.page_id, "Adding depictions and captions failed");
        }

        if let Some(place) = &contribution.place {
            run_place_edit(&self.ctx, &self.config, &contribution, place, &upload_result).await;
        }

        match record_completion(&self.ctx, &contribution, &upload_result).await {
            Ok(_) => {
                self.ctx
                    .notifications
                    .notify(NotificationEvent::Success {
                        target: (&contribution).into(),
                    })
                    .await;
                Ok(UploadOutcome::Completed)
            }
            Err(e) => {
                tracing::error!(
                    page_id = %contribution.page_id,
                    error = %e,
                    "Uploaded file could not be recorded as completed"
                );
                self.fail(contribution, e.to_string()).await
            }
        }
    }

    async fn fail(
        &self,
        mut contribution: Contribution,
        message: String,
    ) -> Result<UploadOutcome, UploadError> {
        contribution.state = ContributionState::Failed;
        contribution.error_info = Some(message.clone());
        contribution.clear_chunks();
        contribution.date_modified = Utc::now();
        self.ctx.contributions.save(&contribution).await?;

        let target = NotificationTarget::from(&contribution);
        self.ctx
            .notifications
            .notify(NotificationEvent::Failed {
                target: target.clone(),
                error: Some(message.clone()),
            })
            .await;

        if message == INVALID_TOKEN_ERROR_MESSAGE {
            self.ctx
                .notifications
                .notify(NotificationEvent::InvalidLogin { target })
                .await;
            self.ctx
                .session
                .on_invalid_login(self.config.username.as_deref())
                .await;
        }
        Ok(UploadOutcome::Failed)
    }

    /// Moves a contribution out of InProgress after a drain-aborting error.
    /// Returns false when the store rejected the write too.
    pub(crate) async fn release(&self, mut contribution: Contribution, reason: &str) -> bool {
        contribution.state = ContributionState::Failed;
        contribution.error_info = Some(format!("Upload interrupted: {}", reason));
        contribution.clear_chunks();
        contribution.date_modified = Utc::now();
        match self.ctx.contributions.save(&contribution).await {
            Ok(()) => {
                tracing::warn!(page_id = %contribution.page_id, "Released interrupted upload as failed");
                true
            }
            Err(e) => {
                tracing::error!(
                    page_id = %contribution.page_id,
                    error = %e,
                    "Could not release interrupted upload"
                );
                false
            }
        }
    }

    async fn pause(&self, mut contribution: Contribution) -> Result<UploadOutcome, UploadError> {
        contribution.state = ContributionState::Paused;
        contribution.date_modified = Utc::now();
        self.ctx.contributions.save(&contribution).await?;
        tracing::info!(
            page_id = %contribution.page_id,
            transferred = contribution.transferred,
            "Upload paused"
        );
        self.ctx
            .notifications
            .notify(NotificationEvent::Paused {
                target: (&contribution).into(),
            })
            .await;
        Ok(UploadOutcome::Paused)
    }

    async fn discard(&self, contribution: Contribution) -> Result<UploadOutcome, UploadError> {
        self.ctx.contributions.delete(&contribution.page_id).await?;
        tracing::info!(page_id = %contribution.page_id, "Upload cancelled, record removed");
        self.ctx
            .notifications
            .notify(NotificationEvent::Cancelled {
                target: (&contribution).into(),
            })
            .await;
        Ok(UploadOutcome::Cancelled)
    }
}
