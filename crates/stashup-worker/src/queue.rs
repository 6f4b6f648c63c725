//! Upload queue: single-flight drain loop, stale InProgress recovery and the
//! follow loop used by long-running hosts.
//!
//! Cancellation: [`UploadWorker::run`] honours a [`CancellationToken`]. A transfer
//! interrupted in the stash phase is paused and can be resumed later; the drain then
//! stops after the current contribution.
//!
//! A store error aborts the drain. The contribution being uploaded is then moved to
//! Failed, now or at the start of the next run if the store is still refusing writes.

use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use stashup_core::models::{Contribution, ContributionState, NotificationEvent};
use stashup_core::{UploadError, WorkerConfig};

use crate::context::UploadContext;
use crate::control::TransferControl;
use crate::upload::{UploadOutcome, UploadProcessor};

/// How a drain cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Queued items remain; run again.
    Reschedule,
    /// Nothing left to upload.
    Done,
    /// A store error aborted the cycle.
    Failure(String),
    /// Another drain is running on this worker.
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: WorkerOutcome,
    pub uploads_started: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
    pub cancelled: usize,
}

impl DrainReport {
    fn new(outcome: WorkerOutcome) -> Self {
        Self {
            outcome,
            uploads_started: 0,
            completed: 0,
            failed: 0,
            paused: 0,
            cancelled: 0,
        }
    }

    fn record(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Completed => self.completed += 1,
            UploadOutcome::Failed => self.failed += 1,
            UploadOutcome::Paused => self.paused += 1,
            UploadOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Oldest submission first, ties by page id.
fn next_queued(pending: &[Contribution]) -> Option<&Contribution> {
    pending
        .iter()
        .filter(|c| c.state == ContributionState::Queued)
        .min_by(|a, b| {
            a.upload_started_at()
                .cmp(&b.upload_started_at())
                .then_with(|| a.page_id.cmp(&b.page_id))
        })
}

#[derive(Clone)]
pub struct UploadWorker {
    ctx: UploadContext,
    config: WorkerConfig,
    control: TransferControl,
    processor: UploadProcessor,
    single_flight: Arc<Semaphore>,
    /// Contributions an aborted drain could not move out of InProgress, with the reason.
    stranded: Arc<Mutex<Vec<(Contribution, String)>>>,
}

impl UploadWorker {
    pub fn new(ctx: UploadContext, config: WorkerConfig) -> Self {
        let control = TransferControl::new();
        let processor = UploadProcessor::new(ctx.clone(), config.clone(), control.clone());
        Self {
            ctx,
            config,
            control,
            processor,
            single_flight: Arc::new(Semaphore::new(1)),
            stranded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle for pausing or cancelling the active transfer from the host.
    pub fn control(&self) -> TransferControl {
        self.control.clone()
    }

    /// Moves abandoned InProgress records to Paused. No-op unless a grace period
    /// is configured.
    pub async fn recover_stale(&self) -> Result<u64, UploadError> {
        if !self.config.stale_recovery_enabled() {
            return Ok(0);
        }
        let grace = chrono::Duration::seconds(self.config.stale_in_progress_grace_secs);
        let recovered = self.ctx.contributions.recover_stale(grace).await?;
        if recovered > 0 {
            tracing::warn!(
                recovered = recovered,
                grace_secs = self.config.stale_in_progress_grace_secs,
                "Recovered stale in-progress contributions"
            );
        }
        Ok(recovered)
    }

    /// One drain cycle over the queue.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: &CancellationToken) -> DrainReport {
        let Ok(_permit) = self.single_flight.clone().try_acquire_owned() else {
            tracing::debug!("Drain already running");
            return DrainReport::new(WorkerOutcome::AlreadyRunning);
        };

        self.release_stranded().await;
        if let Err(e) = self.recover_stale().await {
            tracing::error!(error = %e, "Stale recovery failed");
            return DrainReport::new(WorkerOutcome::Failure(e.to_string()));
        }

        let mut report = DrainReport::new(WorkerOutcome::Done);
        let drained = self.drain(cancel, &mut report).await;
        self.ctx
            .notifications
            .notify(NotificationEvent::StartingDismissed)
            .await;

        report.outcome = match drained {
            Ok(()) => match self.has_queued().await {
                Ok(true) => WorkerOutcome::Reschedule,
                Ok(false) => WorkerOutcome::Done,
                Err(e) => WorkerOutcome::Failure(e.to_string()),
            },
            Err(e) => {
                tracing::error!(error = %e, error_code = e.error_code(), "Drain aborted");
                WorkerOutcome::Failure(e.to_string())
            }
        };

        tracing::info!(
            outcome = ?report.outcome,
            uploads_started = report.uploads_started,
            completed = report.completed,
            failed = report.failed,
            paused = report.paused,
            cancelled = report.cancelled,
            "Drain finished"
        );
        report
    }

    async fn drain(
        &self,
        cancel: &CancellationToken,
        report: &mut DrainReport,
    ) -> Result<(), UploadError> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!("Drain cancelled");
                return Ok(());
            }

            let pending = self
                .ctx
                .contributions
                .list_by_state(&ContributionState::PENDING)
                .await?;
            if let Some(active) = pending
                .iter()
                .find(|c| c.state == ContributionState::InProgress)
            {
                tracing::warn!(
                    page_id = %active.page_id,
                    "A contribution is already in progress, not starting another"
                );
                return Ok(());
            }

            let queued = pending
                .iter()
                .filter(|c| c.state == ContributionState::Queued)
                .count();
            let Some(next) = next_queued(&pending) else {
                return Ok(());
            };

            self.ctx
                .notifications
                .notify(NotificationEvent::Starting { count: queued })
                .await;

            let Some(mut contribution) = self.ctx.contributions.get(&next.page_id).await? else {
                tracing::debug!(page_id = %next.page_id, "Contribution removed before start");
                continue;
            };
            if contribution.state != ContributionState::Queued {
                continue;
            }

            contribution.state = ContributionState::InProgress;
            contribution.transferred = 0;
            contribution.date_modified = chrono::Utc::now();
            self.ctx.contributions.save(&contribution).await?;
            report.uploads_started += 1;

            let snapshot = contribution.clone();
            match self.processor.process(contribution, cancel).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    let reason = e.user_message();
                    if !self.processor.release(snapshot.clone(), &reason).await {
                        self.stranded.lock().await.push((snapshot, reason));
                    }
                    report.failed += 1;
                    return Err(e);
                }
            }
        }
    }

    /// Retries releasing contributions left InProgress by an earlier aborted drain.
    async fn release_stranded(&self) {
        let stranded = std::mem::take(&mut *self.stranded.lock().await);
        let mut still_stranded = Vec::new();
        for (contribution, reason) in stranded {
            let current = match self.ctx.contributions.get(&contribution.page_id).await {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(page_id = %contribution.page_id, error = %e, "Stranded upload lookup failed");
                    still_stranded.push((contribution, reason));
                    continue;
                }
            };
            if current.state != ContributionState::InProgress {
                continue;
            }
            if !self.processor.release(current, &reason).await {
                still_stranded.push((contribution, reason));
            }
        }
        self.stranded.lock().await.extend(still_stranded);
    }

    async fn has_queued(&self) -> Result<bool, UploadError> {
        let queued = self
            .ctx
            .contributions
            .list_by_state(&[ContributionState::Queued])
            .await?;
        Ok(!queued.is_empty())
    }

    /// Drains repeatedly until `cancel` fires, waiting the poll interval between
    /// cycles that made no progress.
    pub async fn follow(&self, cancel: CancellationToken) {
        let poll_interval = self.config.poll_interval();
        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "Upload worker started"
        );

        loop {
            let report = self.run(&cancel).await;
            let again = matches!(report.outcome, WorkerOutcome::Reschedule)
                && report.uploads_started > 0;
            if again && !cancel.is_cancelled() {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Upload worker shutting down");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        tracing::info!("Upload worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{StashBehavior, TestHarness};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn queued_at(page_id: &str, filename: &str, minutes_ago: i64) -> Contribution {
        let mut c = Contribution::new_queued(page_id, filename, "/nonexistent/f.jpg", "sha");
        c.date_upload_started = Some(Utc::now() - ChronoDuration::minutes(minutes_ago));
        c
    }

    #[tokio::test]
    async fn drains_oldest_first() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("b", "Second.jpg", 5));
        harness
            .contributions
            .add_contribution(queued_at("a", "Third.jpg", 1));
        harness
            .contributions
            .add_contribution(queued_at("c", "First.jpg", 10));

        let report = harness.worker().run(&CancellationToken::new()).await;

        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(report.uploads_started, 3);
        assert_eq!(report.completed, 3);
        assert_eq!(
            harness.uploads.commits(),
            vec![
                "First.jpg".to_string(),
                "Second.jpg".to_string(),
                "Third.jpg".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn never_more_than_one_in_progress() {
        let harness = TestHarness::new();
        for i in 0..4 {
            harness
                .contributions
                .add_contribution(queued_at(&format!("p{i}"), &format!("F{i}.jpg"), 10 - i));
        }
        harness
            .uploads
            .set_stash_behavior("p2", StashBehavior::Fail("stashfailed".to_string()));

        harness.worker().run(&CancellationToken::new()).await;

        assert_eq!(harness.contributions.max_in_progress(), 1);
    }

    #[tokio::test]
    async fn existing_in_progress_blocks_drain() {
        let harness = TestHarness::new();
        let mut active = queued_at("active", "Active.jpg", 20);
        active.state = ContributionState::InProgress;
        harness.contributions.add_contribution(active);
        harness
            .contributions
            .add_contribution(queued_at("q", "Queued.jpg", 5));

        let report = harness.worker().run(&CancellationToken::new()).await;

        assert_eq!(report.uploads_started, 0);
        assert_eq!(report.outcome, WorkerOutcome::Reschedule);
        assert!(harness.uploads.commits().is_empty());
    }

    #[tokio::test]
    async fn rerun_after_crash_skips_completed() {
        let harness = TestHarness::new();
        let mut done = queued_at("done", "Done.jpg", 30);
        done.state = ContributionState::Completed;
        harness.contributions.add_contribution(done);
        harness
            .contributions
            .add_contribution(queued_at("next", "Next.jpg", 10));
        harness
            .contributions
            .add_contribution(queued_at("later", "Later.jpg", 1));

        let report = harness.worker().run(&CancellationToken::new()).await;

        assert_eq!(report.uploads_started, 2);
        assert_eq!(
            harness.uploads.commits(),
            vec!["Next.jpg".to_string(), "Later.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn emits_starting_and_dismissal() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness
            .contributions
            .add_contribution(queued_at("b", "B.jpg", 1));

        harness.worker().run(&CancellationToken::new()).await;

        let events = harness.sink.events();
        assert_eq!(events[0], NotificationEvent::Starting { count: 2 });
        assert!(events.contains(&NotificationEvent::Starting { count: 1 }));
        assert_eq!(events.last(), Some(&NotificationEvent::StartingDismissed));
    }

    #[tokio::test]
    async fn empty_queue_is_done() {
        let harness = TestHarness::new();
        let report = harness.worker().run(&CancellationToken::new()).await;
        assert_eq!(report.outcome, WorkerOutcome::Done);
        assert_eq!(report.uploads_started, 0);
    }

    #[tokio::test]
    async fn store_error_is_failure() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness.contributions.fail_saves(true);

        let report = harness.worker().run(&CancellationToken::new()).await;
        assert!(matches!(report.outcome, WorkerOutcome::Failure(_)));
    }

    #[tokio::test]
    async fn store_error_mid_upload_does_not_leave_record_in_progress() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness
            .contributions
            .add_contribution(queued_at("b", "B.jpg", 1));
        let gate = harness.uploads.hold_stash("a");
        let worker = harness.worker();

        let first = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(&CancellationToken::new()).await })
        };
        gate.wait_entered().await;
        harness.contributions.fail_saves(true);
        gate.release();
        let first = first.await.unwrap();
        assert!(matches!(first.outcome, WorkerOutcome::Failure(_)));
        assert_eq!(
            harness.contributions.snapshot("a").unwrap().state,
            ContributionState::InProgress
        );

        harness.contributions.fail_saves(false);
        let second = worker.run(&CancellationToken::new()).await;

        let a = harness.contributions.snapshot("a").unwrap();
        assert_eq!(a.state, ContributionState::Failed);
        assert!(a.error_info.unwrap().starts_with("Upload interrupted"));
        assert!(a.chunk_info.is_none());
        assert_eq!(second.uploads_started, 1);
        assert_eq!(
            harness.contributions.snapshot("b").unwrap().state,
            ContributionState::Completed
        );
    }

    #[tokio::test]
    async fn fatal_commit_error_releases_record() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness.uploads.set_commit_error(UploadError::Internal("boom".to_string()));

        let report = harness.worker().run(&CancellationToken::new()).await;

        assert!(matches!(report.outcome, WorkerOutcome::Failure(_)));
        assert_eq!(report.failed, 1);
        let a = harness.contributions.snapshot("a").unwrap();
        assert_eq!(a.state, ContributionState::Failed);
        assert_eq!(a.error_info.as_deref(), Some("Upload interrupted: Internal error"));
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        let gate = harness.uploads.hold_stash("a");
        let worker = harness.worker();

        let first = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(&CancellationToken::new()).await })
        };
        gate.wait_entered().await;

        let second = worker.run(&CancellationToken::new()).await;
        assert_eq!(second.outcome, WorkerOutcome::AlreadyRunning);

        gate.release();
        let first = first.await.unwrap();
        assert_eq!(first.completed, 1);

        let third = worker.run(&CancellationToken::new()).await;
        assert_eq!(third.outcome, WorkerOutcome::Done);
    }

    #[tokio::test]
    async fn cancellation_stops_after_current_and_reschedules() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness
            .contributions
            .add_contribution(queued_at("b", "B.jpg", 1));
        harness
            .uploads
            .set_stash_behavior("a", StashBehavior::WaitForSignal);
        let worker = harness.worker();
        let cancel = CancellationToken::new();

        let run = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(&cancel).await })
        };
        while worker.control().active_ids().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        let report = run.await.unwrap();

        assert_eq!(report.outcome, WorkerOutcome::Reschedule);
        assert_eq!(report.paused, 1);
        assert_eq!(
            harness.contributions.snapshot("a").unwrap().state,
            ContributionState::Paused
        );
        assert_eq!(
            harness.contributions.snapshot("b").unwrap().state,
            ContributionState::Queued
        );
    }

    #[tokio::test]
    async fn host_pause_through_control() {
        let harness = TestHarness::new();
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        harness
            .uploads
            .set_stash_behavior("a", StashBehavior::WaitForSignal);
        let worker = harness.worker();

        let run = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(&CancellationToken::new()).await })
        };
        let control = worker.control();
        while !control.pause("a").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let report = run.await.unwrap();

        assert_eq!(report.paused, 1);
        assert_eq!(report.outcome, WorkerOutcome::Done);
    }

    #[tokio::test]
    async fn stale_recovery_runs_before_drain_when_enabled() {
        let mut harness = TestHarness::new();
        harness.config.stale_in_progress_grace_secs = 60;
        let mut stale = queued_at("stale", "Stale.jpg", 30);
        stale.state = ContributionState::InProgress;
        stale.date_modified = Utc::now() - ChronoDuration::minutes(10);
        harness.contributions.add_contribution(stale);
        harness
            .contributions
            .add_contribution(queued_at("q", "Queued.jpg", 5));

        let report = harness.worker().run(&CancellationToken::new()).await;

        assert_eq!(
            harness.contributions.snapshot("stale").unwrap().state,
            ContributionState::Paused
        );
        assert_eq!(report.uploads_started, 1);
        assert_eq!(report.outcome, WorkerOutcome::Done);
    }

    #[tokio::test]
    async fn stale_recovery_disabled_by_default() {
        let harness = TestHarness::new();
        assert_eq!(harness.worker().recover_stale().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn follow_stops_on_cancel() {
        let mut harness = TestHarness::new();
        harness.config.poll_interval_ms = 10;
        harness
            .contributions
            .add_contribution(queued_at("a", "A.jpg", 2));
        let worker = harness.worker();
        let cancel = CancellationToken::new();

        let follow = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.follow(cancel).await })
        };
        while harness.uploads.commits().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), follow)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn drains_against_sqlite_store() {
        use stashup_core::ContributionStore;
        use stashup_db::{setup_database, ContributionRepository};

        let pool = setup_database("sqlite::memory:", 1).await.unwrap();
        let repo = Arc::new(ContributionRepository::new(pool));
        let harness = TestHarness::new();
        let ctx = UploadContext {
            contributions: repo.clone(),
            ..harness.context()
        };
        repo.save(&queued_at("older", "Older.jpg", 10)).await.unwrap();
        repo.save(&queued_at("newer", "Newer.jpg", 1)).await.unwrap();

        let report = UploadWorker::new(ctx, harness.config.clone())
            .run(&CancellationToken::new())
            .await;

        assert_eq!(report.completed, 2);
        assert_eq!(
            harness.uploads.commits(),
            vec!["Older.jpg".to_string(), "Newer.jpg".to_string()]
        );
        let older = repo.get("older").await.unwrap().unwrap();
        assert_eq!(older.state, ContributionState::Completed);
        assert!(older.canonical.is_some());
    }
}
