//! Per-contribution progress pump.
//!
//! The stash transfer reports every chunk; the pump persists the checkpoint and
//! forwards a rate-limited stream of progress intents.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use stashup_core::models::{progress_percent, Contribution, NotificationEvent, ProgressEvent};
use stashup_core::{AppError, ContributionStore, NotificationSink};

#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    /// Starts empty; the first event of a transfer always passes on its own.
    pub(crate) fn new(refill_rate: f64) -> Self {
        Self {
            tokens: 0.0,
            capacity: refill_rate.max(1.0),
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    pub(crate) fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct ProgressPump {
    contribution: Contribution,
    store: Arc<dyn ContributionStore>,
    sink: Arc<dyn NotificationSink>,
    bucket: TokenBucket,
    seen_first: bool,
}

impl ProgressPump {
    async fn handle(&mut self, event: ProgressEvent) -> Result<(), AppError> {
        match event {
            ProgressEvent::Transferred { transferred, total } => {
                let finishing = total > 0 && transferred >= total;
                let forced = !self.seen_first || finishing;
                self.seen_first = true;
                if !forced && !self.bucket.try_acquire() {
                    return Ok(());
                }

                self.contribution.transferred = transferred as i64;
                self.contribution.date_modified = Utc::now();
                self.store.save(&self.contribution).await?;
                self.sink
                    .notify(NotificationEvent::Progress {
                        target: (&self.contribution).into(),
                        percent: progress_percent(transferred, total),
                        finishing,
                    })
                    .await;
            }
            ProgressEvent::ChunkUploaded(info) => {
                tracing::debug!(
                    page_id = %self.contribution.page_id,
                    chunk = info.next_chunk_index,
                    total_chunks = info.total_chunks,
                    "Chunk checkpoint"
                );
                self.contribution.transferred = info.next_offset as i64;
                self.contribution.chunk_info = Some(info);
                self.contribution.date_modified = Utc::now();
                self.store.save(&self.contribution).await?;
            }
        }
        Ok(())
    }
}

/// Consumes `rx` until the sender side is dropped and returns the contribution
/// with its last persisted progress. The first store error stops persistence and
/// is returned once the channel closes.
pub(crate) fn spawn_progress_pump(
    contribution: Contribution,
    store: Arc<dyn ContributionStore>,
    sink: Arc<dyn NotificationSink>,
    rate_per_sec: f64,
    mut rx: UnboundedReceiver<ProgressEvent>,
) -> JoinHandle<Result<Contribution, AppError>> {
    tokio::spawn(async move {
        let mut pump = ProgressPump {
            contribution,
            store,
            sink,
            bucket: TokenBucket::new(rate_per_sec),
            seen_first: false,
        };
        let mut failure = None;
        while let Some(event) = rx.recv().await {
            if failure.is_some() {
                continue;
            }
            if let Err(e) = pump.handle(event).await {
                tracing::error!(
                    page_id = %pump.contribution.page_id,
                    error = %e,
                    "Failed to persist upload progress"
                );
                failure = Some(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(pump.contribution),
        }
    })
}
