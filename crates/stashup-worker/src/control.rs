//! Pause and cancel requests for the transfer in flight.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use stashup_core::TransferHandle;

/// Registry of active transfers, shared between the worker and the host.
#[derive(Clone, Default)]
pub struct TransferControl {
    active: Arc<Mutex<HashMap<String, TransferHandle>>>,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, page_id: &str) -> TransferHandle {
        let handle = TransferHandle::new();
        self.active
            .lock()
            .await
            .insert(page_id.to_string(), handle.clone());
        handle
    }

    pub(crate) async fn unregister(&self, page_id: &str) {
        self.active.lock().await.remove(page_id);
    }

    /// Asks the transfer of `page_id` to stop after the current chunk and keep its
    /// checkpoint. Returns false when no such transfer is running.
    pub async fn pause(&self, page_id: &str) -> bool {
        match self.active.lock().await.get(page_id) {
            Some(handle) => {
                handle.pause();
                tracing::info!(page_id = %page_id, "Pause requested");
                true
            }
            None => false,
        }
    }

    /// Asks the transfer of `page_id` to stop and discard the contribution.
    pub async fn cancel(&self, page_id: &str) -> bool {
        match self.active.lock().await.get(page_id) {
            Some(handle) => {
                handle.cancel();
                tracing::info!(page_id = %page_id, "Cancel requested");
                true
            }
            None => false,
        }
    }

    pub async fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
