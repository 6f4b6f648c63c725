//! Gallery selection state: which images of a folder are shown and which are selected.

use std::collections::{BTreeSet, HashSet};

use crate::models::{Contribution, Image, NotForUploadStatus, UploadedStatus};

#[derive(Debug, Clone, Default)]
pub struct SelectorConfig {
    pub bucket_id: i64,
    /// Show images that were already uploaded, marked or queued.
    pub show_already_actioned: bool,
    pub single_selection: bool,
    /// Last image the user looked at, for scroll restoration.
    pub last_item_id: Option<i64>,
}

/// Images the user already acted on, identified by content hash or local path.
#[derive(Debug, Clone, Default)]
pub struct ActionedImages {
    hashes: HashSet<String>,
    paths: HashSet<String>,
}

impl ActionedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uploaded<'a>(mut self, statuses: impl IntoIterator<Item = &'a UploadedStatus>) -> Self {
        self.hashes
            .extend(statuses.into_iter().map(|s| s.original_sha1.clone()));
        self
    }

    pub fn with_not_for_upload<'a>(
        mut self,
        marks: impl IntoIterator<Item = &'a NotForUploadStatus>,
    ) -> Self {
        self.hashes
            .extend(marks.into_iter().map(|m| m.image_sha1.clone()));
        self
    }

    /// Contributions still in the upload queue.
    pub fn with_pending<'a>(mut self, pending: impl IntoIterator<Item = &'a Contribution>) -> Self {
        for contribution in pending {
            if !contribution.image_sha1.is_empty() {
                self.hashes.insert(contribution.image_sha1.clone());
            }
            self.paths.insert(contribution.local_path.clone());
        }
        self
    }

    pub fn contains(&self, image: &Image) -> bool {
        image
            .sha1
            .as_ref()
            .map(|h| self.hashes.contains(h))
            .unwrap_or(false)
            || self.paths.contains(&image.path)
    }
}

pub struct ImageSelector {
    config: SelectorConfig,
    images: Vec<Image>,
    actioned: ActionedImages,
    visible: Vec<Image>,
    selected: BTreeSet<i64>,
}

impl ImageSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            images: Vec::new(),
            actioned: ActionedImages::default(),
            visible: Vec::new(),
            selected: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Replaces the image set with the images of the configured bucket.
    pub fn load(&mut self, images: Vec<Image>, actioned: ActionedImages) {
        let bucket_id = self.config.bucket_id;
        self.images = images
            .into_iter()
            .filter(|image| image.bucket_id == bucket_id)
            .collect();
        self.actioned = actioned;
        let known: HashSet<i64> = self.images.iter().map(|i| i.id).collect();
        self.selected.retain(|id| known.contains(id));
        self.recompute();
    }

    pub fn visible(&self) -> &[Image] {
        &self.visible
    }

    pub fn is_actioned(&self, image: &Image) -> bool {
        self.actioned.contains(image)
    }

    /// Toggles the switch; the caller persists the preference.
    pub fn set_show_already_actioned(&mut self, show: bool) {
        self.config.show_already_actioned = show;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.visible = if self.config.show_already_actioned {
            self.images.clone()
        } else {
            self.images
                .iter()
                .filter(|image| !self.actioned.contains(image))
                .cloned()
                .collect()
        };
    }

    /// Returns false when the image is not part of the loaded bucket.
    pub fn select(&mut self, image_id: i64) -> bool {
        if !self.images.iter().any(|i| i.id == image_id) {
            return false;
        }
        if self.config.single_selection {
            self.selected.clear();
        }
        self.selected.insert(image_id);
        true
    }

    pub fn deselect(&mut self, image_id: i64) {
        self.selected.remove(&image_id);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, image_id: i64) -> bool {
        self.selected.contains(&image_id)
    }

    /// Selected images in load order.
    pub fn selected(&self) -> Vec<&Image> {
        self.images
            .iter()
            .filter(|i| self.selected.contains(&i.id))
            .collect()
    }

    /// Drops an image from the actionable set, e.g. after it was marked or queued.
    pub fn remove_image(&mut self, image_id: i64) {
        self.images.retain(|i| i.id != image_id);
        self.selected.remove(&image_id);
        self.recompute();
    }

    /// Position of `image_id` among the visible images, 0 when absent.
    pub fn index_of(&self, image_id: i64) -> usize {
        self.visible
            .iter()
            .position(|i| i.id == image_id)
            .unwrap_or(0)
    }

    /// Scroll position to restore; only meaningful while actioned images are hidden.
    pub fn restore_position(&self) -> Option<usize> {
        if self.config.show_already_actioned {
            return None;
        }
        self.config.last_item_id.map(|id| self.index_of(id))
    }

    pub fn show_all_actioned_notice(&self, is_loading: bool) -> bool {
        !is_loading && !self.config.show_already_actioned && self.visible.is_empty()
    }
}
