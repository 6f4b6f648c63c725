//! Collaborators the upload worker needs.
//!
//! The binary fills this with the SQLite repositories, the HTTP clients and a
//! notification sink; tests fill it with in-memory mocks.

use std::sync::Arc;

use stashup_core::{
    ContributionStore, MetadataService, NoOpSessionHook, NotificationSink, PlaceStore,
    SessionHook, StructuredDataService, TracingNotificationSink, UploadService,
    UploadedStatusStore,
};

#[derive(Clone)]
pub struct UploadContext {
    pub contributions: Arc<dyn ContributionStore>,
    pub uploaded_status: Arc<dyn UploadedStatusStore>,
    pub places: Arc<dyn PlaceStore>,
    pub uploads: Arc<dyn UploadService>,
    pub structured_data: Arc<dyn StructuredDataService>,
    pub metadata: Arc<dyn MetadataService>,
    pub notifications: Arc<dyn NotificationSink>,
    pub session: Arc<dyn SessionHook>,
}

impl UploadContext {
    /// Context with the logging notification sink and the logging session hook.
    pub fn new(
        contributions: Arc<dyn ContributionStore>,
        uploaded_status: Arc<dyn UploadedStatusStore>,
        places: Arc<dyn PlaceStore>,
        uploads: Arc<dyn UploadService>,
        structured_data: Arc<dyn StructuredDataService>,
        metadata: Arc<dyn MetadataService>,
    ) -> Self {
        Self {
            contributions,
            uploaded_status,
            places,
            uploads,
            structured_data,
            metadata,
            notifications: Arc::new(TracingNotificationSink),
            session: Arc::new(NoOpSessionHook),
        }
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_session_hook(mut self, session: Arc<dyn SessionHook>) -> Self {
        self.session = session;
        self
    }
}
