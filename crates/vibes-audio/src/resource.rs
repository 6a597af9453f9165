//! Audio Resource Lifecycle Tracking
//!
//! Every playback element, local track, media stream and object URL created
//! on behalf of a session is registered here under a string key. Cleanup is
//! best-effort per resource kind: a failure releasing one kind is logged and
//! the remaining kinds are still released. The bookkeeping entry is always
//! removed, so a resource is released at most once.
//!
//! ```text
//! register("voice:ana", element)     ──▶ entries["voice:ana"]
//! update("upload", object_url)       ──▶ merge into entries["upload"]
//! cleanup("voice:ana")               ──▶ release_element ─▶ entry removed
//! cleanup_all()                      ──▶ every entry, in key order
//! ```

use std::collections::BTreeMap;

use tracing::{debug, warn};
use vibes_common::MediaStreamId;

use crate::backend::{ElementId, LocalTrackId, ResourceReleaser};

/// Resources held under one key. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedResources {
    /// Playback element.
    pub element: Option<ElementId>,
    /// Locally published track.
    pub track: Option<LocalTrackId>,
    /// Media stream whose tracks must be stopped.
    pub media_stream: Option<MediaStreamId>,
    /// Object URL to revoke.
    pub object_url: Option<String>,
}

impl TrackedResources {
    /// Only an element.
    #[must_use]
    pub fn element(element: ElementId) -> Self {
        Self {
            element: Some(element),
            ..Self::default()
        }
    }

    /// Set the element.
    #[must_use]
    pub fn with_element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    /// Set the local track.
    #[must_use]
    pub fn with_track(mut self, track: LocalTrackId) -> Self {
        self.track = Some(track);
        self
    }

    /// Set the media stream.
    #[must_use]
    pub fn with_media_stream(mut self, stream: MediaStreamId) -> Self {
        self.media_stream = Some(stream);
        self
    }

    /// Set the object URL.
    #[must_use]
    pub fn with_object_url(mut self, url: impl Into<String>) -> Self {
        self.object_url = Some(url.into());
        self
    }

    /// Overwrite fields that are set in `patch`.
    pub fn merge(&mut self, patch: Self) {
        if patch.element.is_some() {
            self.element = patch.element;
        }
        if patch.track.is_some() {
            self.track = patch.track;
        }
        if patch.media_stream.is_some() {
            self.media_stream = patch.media_stream;
        }
        if patch.object_url.is_some() {
            self.object_url = patch.object_url;
        }
    }

    /// True if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element.is_none()
            && self.track.is_none()
            && self.media_stream.is_none()
            && self.object_url.is_none()
    }
}

/// Registry of platform resources owned by a session.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    entries: BTreeMap<String, TrackedResources>,
}

impl ResourceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resources under `id`.
    ///
    /// Re-registering an existing id replaces the entry without releasing the
    /// previous resources; call [`Self::cleanup`] first if they are stale.
    pub fn register(&mut self, id: impl Into<String>, resources: TrackedResources) {
        let id = id.into();
        if self.entries.insert(id.clone(), resources).is_some() {
            warn!(resource = %id, "Resource entry replaced without cleanup");
        } else {
            debug!(resource = %id, "Registered resource");
        }
    }

    /// Merge `patch` into the entry for `id`, creating it if absent.
    pub fn update(&mut self, id: impl Into<String>, patch: TrackedResources) {
        self.entries.entry(id.into()).or_default().merge(patch);
    }

    /// Whether an entry exists for `id`.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TrackedResources> {
        self.entries.get(id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release and forget the entry for `id`. Returns false if absent.
    pub fn cleanup<R: ResourceReleaser + ?Sized>(&mut self, id: &str, releaser: &mut R) -> bool {
        let Some(resources) = self.entries.remove(id) else {
            return false;
        };
        release(id, resources, releaser);
        true
    }

    /// Release and forget every entry.
    pub fn cleanup_all<R: ResourceReleaser + ?Sized>(&mut self, releaser: &mut R) -> usize {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        for (id, resources) in entries {
            release(&id, resources, releaser);
        }
        if count > 0 {
            debug!("Released {} tracked resources", count);
        }
        count
    }
}

fn release<R: ResourceReleaser + ?Sized>(id: &str, resources: TrackedResources, releaser: &mut R) {
    if let Some(element) = resources.element {
        if let Err(e) = releaser.release_element(element) {
            warn!(resource = %id, "Failed to release element: {e}");
        }
    }
    if let Some(track) = resources.track {
        if let Err(e) = releaser.stop_local_track(track) {
            warn!(resource = %id, "Failed to stop local track: {e}");
        }
    }
    if let Some(stream) = resources.media_stream {
        if let Err(e) = releaser.stop_stream(stream) {
            warn!(resource = %id, "Failed to stop media stream: {e}");
        }
    }
    if let Some(url) = resources.object_url {
        if let Err(e) = releaser.revoke_object_url(&url) {
            warn!(resource = %id, "Failed to revoke object URL: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioBackend, ElementOptions};
    use crate::headless::{HeadlessBackend, HeadlessFailures};

    fn element(backend: &mut HeadlessBackend, stream: u64) -> ElementId {
        backend
            .create_element(MediaStreamId::new(stream), ElementOptions::music())
            .expect("element")
    }

    #[test]
    fn test_register_and_cleanup() {
        let mut backend = HeadlessBackend::new();
        let mut tracker = ResourceTracker::new();
        let el = element(&mut backend, 1);

        tracker.register("voice:ana", TrackedResources::element(el));
        assert!(tracker.has("voice:ana"));

        assert!(tracker.cleanup("voice:ana", &mut backend));
        assert!(!tracker.has("voice:ana"));
        assert!(backend.element(el).is_none());

        // Second cleanup is a no-op.
        assert!(!tracker.cleanup("voice:ana", &mut backend));
    }

    #[test]
    fn test_update_merges_fields() {
        let mut tracker = ResourceTracker::new();
        tracker.update("upload", TrackedResources::default().with_object_url("blob:1"));
        tracker.update("upload", TrackedResources::default().with_track(LocalTrackId::new(7)));

        let entry = tracker.get("upload").expect("entry");
        assert_eq!(entry.object_url.as_deref(), Some("blob:1"));
        assert_eq!(entry.track, Some(LocalTrackId::new(7)));
    }

    #[test]
    fn test_cleanup_releases_every_kind() {
        let mut backend = HeadlessBackend::new();
        let mut tracker = ResourceTracker::new();
        let el = element(&mut backend, 2);
        let url = backend.create_object_url();

        tracker.register(
            "upload",
            TrackedResources::element(el)
                .with_track(LocalTrackId::new(3))
                .with_media_stream(MediaStreamId::new(2))
                .with_object_url(url.clone()),
        );
        tracker.cleanup("upload", &mut backend);

        assert!(backend.element(el).is_none());
        assert!(backend.is_track_stopped(LocalTrackId::new(3)));
        assert!(backend.is_stream_stopped(MediaStreamId::new(2)));
        assert!(!backend.is_url_live(&url));
    }

    #[test]
    fn test_cleanup_continues_after_failure() {
        let mut backend = HeadlessBackend::with_failures(HeadlessFailures {
            element_release: true,
            ..HeadlessFailures::default()
        });
        let mut tracker = ResourceTracker::new();
        let el = element(&mut backend, 4);
        let url = backend.create_object_url();

        tracker.register(
            "upload",
            TrackedResources::element(el).with_object_url(url.clone()),
        );
        assert!(tracker.cleanup("upload", &mut backend));

        // Element release reported an error, URL was still revoked and entry removed.
        assert!(!backend.is_url_live(&url));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cleanup_all_empties_registry() {
        let mut backend = HeadlessBackend::new();
        let mut tracker = ResourceTracker::new();
        let mut urls = Vec::new();
        for i in 0..4 {
            let el = element(&mut backend, i);
            let url = backend.create_object_url();
            tracker.register(
                format!("r{i}"),
                TrackedResources::element(el).with_object_url(url.clone()),
            );
            urls.push(url);
        }

        assert_eq!(tracker.cleanup_all(&mut backend), 4);
        assert!(tracker.is_empty());
        assert_eq!(backend.element_count(), 0);
        assert_eq!(backend.playing_count(), 0);
        assert!(urls.iter().all(|u| !backend.is_url_live(u)));
    }
}
