//! In-memory collaborators for worker tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use stashup_core::models::{
    CanonicalRecord, ChunkInfo, Contribution, ContributionState, NotificationEvent, Place,
    PlaceTarget, ProgressEvent, StashUploadResult, UploadResult, UploadedStatus,
};
use stashup_core::naming::FILE_NAMESPACE;
use stashup_core::{
    AppError, ContributionStore, MetadataService, NotificationSink, PlaceStore, SessionHook,
    StructuredDataService, TransferHandle, TransferSignal, UploadError, UploadService,
    UploadedStatusStore, WorkerConfig,
};

use crate::context::UploadContext;
use crate::queue::UploadWorker;

/// Mock contribution store that records the highest number of simultaneous
/// InProgress records it ever held.
#[derive(Clone)]
pub struct MockContributionStore {
    items: Arc<Mutex<HashMap<String, Contribution>>>,
    max_in_progress: Arc<Mutex<usize>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MockContributionStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(HashMap::new())),
            max_in_progress: Arc::new(Mutex::new(0)),
            fail_saves: Arc::new(Mutex::new(false)),
        }
    }

    pub fn add_contribution(&self, contribution: Contribution) {
        self.items
            .lock()
            .unwrap()
            .insert(contribution.page_id.clone(), contribution);
    }

    pub fn snapshot(&self, page_id: &str) -> Option<Contribution> {
        self.items.lock().unwrap().get(page_id).cloned()
    }

    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }

    pub fn max_in_progress(&self) -> usize {
        *self.max_in_progress.lock().unwrap()
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(AppError::Internal("disk full".to_string()));
        }
        Ok(())
    }

    fn record_in_progress(&self, items: &HashMap<String, Contribution>) {
        let count = items
            .values()
            .filter(|c| c.state == ContributionState::InProgress)
            .count();
        let mut max = self.max_in_progress.lock().unwrap();
        *max = (*max).max(count);
    }
}

impl Default for MockContributionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContributionStore for MockContributionStore {
    async fn list_by_state(
        &self,
        states: &[ContributionState],
    ) -> Result<Vec<Contribution>, AppError> {
        let mut items: Vec<Contribution> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|c| states.contains(&c.state))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.upload_started_at()
                .cmp(&b.upload_started_at())
                .then_with(|| a.page_id.cmp(&b.page_id))
        });
        Ok(items)
    }

    async fn get(&self, page_id: &str) -> Result<Option<Contribution>, AppError> {
        Ok(self.snapshot(page_id))
    }

    async fn save(&self, contribution: &Contribution) -> Result<(), AppError> {
        self.check_writable()?;
        let mut items = self.items.lock().unwrap();
        items.insert(contribution.page_id.clone(), contribution.clone());
        self.record_in_progress(&items);
        Ok(())
    }

    async fn delete_and_insert(
        &self,
        old: &Contribution,
        new: &Contribution,
    ) -> Result<(), AppError> {
        self.check_writable()?;
        let mut items = self.items.lock().unwrap();
        items.remove(&old.page_id);
        items.insert(new.page_id.clone(), new.clone());
        self.record_in_progress(&items);
        Ok(())
    }

    async fn delete(&self, page_id: &str) -> Result<bool, AppError> {
        self.check_writable()?;
        Ok(self.items.lock().unwrap().remove(page_id).is_some())
    }

    async fn recover_stale(&self, grace: chrono::Duration) -> Result<u64, AppError> {
        let cutoff = chrono::Utc::now() - grace;
        let mut recovered = 0;
        for c in self.items.lock().unwrap().values_mut() {
            if c.state == ContributionState::InProgress && c.date_modified < cutoff {
                c.state = ContributionState::Paused;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

/// How the mock stash transfer behaves for one page id.
#[derive(Debug)]
pub enum StashBehavior {
    Fail(String),
    Error(UploadError),
    PauseAfterFirstChunk,
    Cancelled,
    /// Loops until the transfer handle is paused or cancelled.
    WaitForSignal,
}

/// Lets a test hold a stash transfer open and observe that it started.
#[derive(Clone)]
pub struct StashGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl StashGate {
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Clone)]
pub struct MockUploadService {
    existing_pages: Arc<Mutex<HashSet<String>>>,
    every_page_exists: Arc<Mutex<bool>>,
    fail_page_checks: Arc<Mutex<bool>>,
    stash_behaviors: Arc<Mutex<HashMap<String, StashBehavior>>>,
    gates: Arc<Mutex<HashMap<String, StashGate>>>,
    cancel_on_success: Arc<Mutex<Option<CancellationToken>>>,
    commit_result: Arc<Mutex<String>>,
    commit_error: Arc<Mutex<Option<UploadError>>>,
    commits: Arc<Mutex<Vec<String>>>,
}

impl MockUploadService {
    pub fn new() -> Self {
        Self {
            existing_pages: Arc::new(Mutex::new(HashSet::new())),
            every_page_exists: Arc::new(Mutex::new(false)),
            fail_page_checks: Arc::new(Mutex::new(false)),
            stash_behaviors: Arc::new(Mutex::new(HashMap::new())),
            gates: Arc::new(Mutex::new(HashMap::new())),
            cancel_on_success: Arc::new(Mutex::new(None)),
            commit_result: Arc::new(Mutex::new("Success".to_string())),
            commit_error: Arc::new(Mutex::new(None)),
            commits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_existing_page(&self, title: &str) {
        self.existing_pages
            .lock()
            .unwrap()
            .insert(title.to_string());
    }

    pub fn treat_every_page_as_existing(&self, value: bool) {
        *self.every_page_exists.lock().unwrap() = value;
    }

    pub fn fail_page_checks(&self, fail: bool) {
        *self.fail_page_checks.lock().unwrap() = fail;
    }

    pub fn set_stash_behavior(&self, page_id: &str, behavior: StashBehavior) {
        self.stash_behaviors
            .lock()
            .unwrap()
            .insert(page_id.to_string(), behavior);
    }

    pub fn hold_stash(&self, page_id: &str) -> StashGate {
        let gate = StashGate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.gates
            .lock()
            .unwrap()
            .insert(page_id.to_string(), gate.clone());
        gate
    }

    pub fn cancel_on_stash_success(&self, token: CancellationToken) {
        *self.cancel_on_success.lock().unwrap() = Some(token);
    }

    pub fn set_commit_result(&self, result: &str) {
        *self.commit_result.lock().unwrap() = result.to_string();
    }

    pub fn set_commit_error(&self, error: UploadError) {
        *self.commit_error.lock().unwrap() = Some(error);
    }

    /// File names passed to commit, in order.
    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }
}

impl Default for MockUploadService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for MockUploadService {
    async fn stash_upload(
        &self,
        _filename: &str,
        contribution: &Contribution,
        progress_tx: UnboundedSender<ProgressEvent>,
        control: &TransferHandle,
    ) -> Result<StashUploadResult, UploadError> {
        let page_id = contribution.page_id.clone();
        let file_key = format!("stash.{}", page_id);
        let first_chunk = ChunkInfo {
            file_key: file_key.clone(),
            next_offset: 50,
            next_chunk_index: 1,
            total_chunks: 2,
        };

        let gate = self.gates.lock().unwrap().get(&page_id).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let _ = progress_tx.send(ProgressEvent::Transferred {
            transferred: 0,
            total: 100,
        });

        let behavior = self.stash_behaviors.lock().unwrap().remove(&page_id);
        match behavior {
            Some(StashBehavior::Fail(message)) => return Ok(StashUploadResult::failed(message)),
            Some(StashBehavior::Error(e)) => return Err(e),
            Some(StashBehavior::PauseAfterFirstChunk) => {
                let _ = progress_tx.send(ProgressEvent::ChunkUploaded(first_chunk));
                return Ok(StashUploadResult::paused());
            }
            Some(StashBehavior::Cancelled) => return Ok(StashUploadResult::cancelled()),
            Some(StashBehavior::WaitForSignal) => loop {
                match control.signal() {
                    TransferSignal::Pause => return Ok(StashUploadResult::paused()),
                    TransferSignal::Cancel => return Ok(StashUploadResult::cancelled()),
                    TransferSignal::Continue => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            },
            None => {}
        }

        let _ = progress_tx.send(ProgressEvent::ChunkUploaded(first_chunk));
        let _ = progress_tx.send(ProgressEvent::Transferred {
            transferred: 100,
            total: 100,
        });
        if let Some(token) = self.cancel_on_success.lock().unwrap().take() {
            token.cancel();
        }
        Ok(StashUploadResult::success(file_key))
    }

    async fn commit_from_stash(
        &self,
        _contribution: &Contribution,
        filename: &str,
        file_key: &str,
    ) -> Result<UploadResult, UploadError> {
        self.commits.lock().unwrap().push(filename.to_string());
        if let Some(error) = self.commit_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(UploadResult {
            result: self.commit_result.lock().unwrap().clone(),
            file_key: file_key.to_string(),
            filename: filename.to_string(),
        })
    }

    async fn page_exists(&self, title: &str) -> Result<bool, UploadError> {
        if *self.fail_page_checks.lock().unwrap() {
            return Err(UploadError::Network("timed out".to_string()));
        }
        if *self.every_page_exists.lock().unwrap() {
            return Ok(true);
        }
        Ok(self.existing_pages.lock().unwrap().contains(title))
    }
}

#[derive(Clone)]
pub struct MockStructuredData {
    revision: Arc<Mutex<Option<i64>>>,
    claims: Arc<Mutex<Vec<String>>>,
    fail_claims: Arc<Mutex<bool>>,
    fail_depictions: Arc<Mutex<bool>>,
}

impl MockStructuredData {
    pub fn new() -> Self {
        Self {
            revision: Arc::new(Mutex::new(Some(1))),
            claims: Arc::new(Mutex::new(Vec::new())),
            fail_claims: Arc::new(Mutex::new(false)),
            fail_depictions: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_revision(&self, revision: Option<i64>) {
        *self.revision.lock().unwrap() = revision;
    }

    pub fn fail_claims(&self, fail: bool) {
        *self.fail_claims.lock().unwrap() = fail;
    }

    pub fn fail_depictions(&self, fail: bool) {
        *self.fail_depictions.lock().unwrap() = fail;
    }

    /// Entity ids an image claim was attempted on.
    pub fn claims(&self) -> Vec<String> {
        self.claims.lock().unwrap().clone()
    }
}

impl Default for MockStructuredData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructuredDataService for MockStructuredData {
    async fn attach_image_reference(
        &self,
        place: &PlaceTarget,
        _filename: &str,
        _captions: &BTreeMap<String, String>,
    ) -> Result<Option<i64>, UploadError> {
        self.claims.lock().unwrap().push(place.id.clone());
        if *self.fail_claims.lock().unwrap() {
            return Err(UploadError::SecondaryEdit("no-such-entity".to_string()));
        }
        Ok(*self.revision.lock().unwrap())
    }

    async fn add_depictions_and_captions(
        &self,
        _upload_result: &UploadResult,
        _contribution: &Contribution,
    ) -> Result<(), UploadError> {
        if *self.fail_depictions.lock().unwrap() {
            return Err(UploadError::SecondaryEdit("protectedpage".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockMetadata {
    fail: Arc<Mutex<bool>>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl MetadataService for MockMetadata {
    async fn fetch_canonical_record(&self, title: &str) -> Result<CanonicalRecord, UploadError> {
        if *self.fail.lock().unwrap() {
            return Err(UploadError::Network("metadata unavailable".to_string()));
        }
        let filename = title
            .strip_prefix(FILE_NAMESPACE)
            .unwrap_or(title)
            .replace('_', " ");
        Ok(CanonicalRecord {
            page_id: Some("1".to_string()),
            image_url: Some(format!("https://upload.example.org/{}", filename)),
            filename,
            ..Default::default()
        })
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotificationSink {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.kind().to_string())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
pub struct RecordingSessionHook {
    calls: Arc<Mutex<Vec<Option<String>>>>,
}

impl RecordingSessionHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionHook for RecordingSessionHook {
    async fn on_invalid_login(&self, username: Option<&str>) {
        self.calls
            .lock()
            .unwrap()
            .push(username.map(str::to_string));
    }
}

#[derive(Clone, Default)]
pub struct MockUploadedStatusStore {
    items: Arc<Mutex<HashMap<String, UploadedStatus>>>,
}

impl MockUploadedStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<UploadedStatus> {
        self.items.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl UploadedStatusStore for MockUploadedStatusStore {
    async fn insert_uploaded(&self, status: &UploadedStatus) -> Result<bool, AppError> {
        let mut items = self.items.lock().unwrap();
        if items.contains_key(&status.original_sha1) {
            return Ok(false);
        }
        items.insert(status.original_sha1.clone(), status.clone());
        Ok(true)
    }

    async fn get(&self, original_sha1: &str) -> Result<Option<UploadedStatus>, AppError> {
        Ok(self.items.lock().unwrap().get(original_sha1).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MockPlaceStore {
    items: Arc<Mutex<HashMap<String, Place>>>,
}

impl MockPlaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<Place> {
        self.items.lock().unwrap().get(entity_id).cloned()
    }
}

#[async_trait]
impl PlaceStore for MockPlaceStore {
    async fn fetch(&self, entity_id: &str) -> Result<Option<Place>, AppError> {
        Ok(self.get(entity_id))
    }

    async fn save(&self, place: &Place) -> Result<(), AppError> {
        self.items
            .lock()
            .unwrap()
            .insert(place.entity_id.clone(), place.clone());
        Ok(())
    }
}

/// All mocks wired together, plus a worker configuration for tests.
pub struct TestHarness {
    pub contributions: Arc<MockContributionStore>,
    pub uploaded_status: Arc<MockUploadedStatusStore>,
    pub places: Arc<MockPlaceStore>,
    pub uploads: Arc<MockUploadService>,
    pub structured_data: Arc<MockStructuredData>,
    pub metadata: Arc<MockMetadata>,
    pub sink: Arc<RecordingNotificationSink>,
    pub session: Arc<RecordingSessionHook>,
    pub config: WorkerConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            contributions: Arc::new(MockContributionStore::new()),
            uploaded_status: Arc::new(MockUploadedStatusStore::new()),
            places: Arc::new(MockPlaceStore::new()),
            uploads: Arc::new(MockUploadService::new()),
            structured_data: Arc::new(MockStructuredData::new()),
            metadata: Arc::new(MockMetadata::new()),
            sink: Arc::new(RecordingNotificationSink::new()),
            session: Arc::new(RecordingSessionHook::new()),
            config: WorkerConfig {
                home_url: "https://commons.example.org/wiki/".to_string(),
                username: Some("Tester".to_string()),
                progress_rate_per_sec: 100.0,
                poll_interval_ms: 50,
                stale_in_progress_grace_secs: 0,
            },
        }
    }

    pub fn context(&self) -> UploadContext {
        UploadContext {
            contributions: self.contributions.clone(),
            uploaded_status: self.uploaded_status.clone(),
            places: self.places.clone(),
            uploads: self.uploads.clone(),
            structured_data: self.structured_data.clone(),
            metadata: self.metadata.clone(),
            notifications: self.sink.clone(),
            session: self.session.clone(),
        }
    }

    pub fn worker(&self) -> UploadWorker {
        UploadWorker::new(self.context(), self.config.clone())
    }
}
