//! Autoplay gesture gate.
//!
//! When the platform refuses `play()` until the user interacts with the page,
//! the element is armed here. The host forwards the next click, touch or key
//! event through [`GestureResumeGate::resume`], which retries playback on every
//! armed element. Arms are one-shot: an element is disarmed as soon as it
//! plays, and every arm expires after the configured timeout so no listener
//! outlives its usefulness.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::ElementId;

/// Default lifetime of an armed gesture listener.
pub const DEFAULT_GESTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// User interaction that satisfies autoplay policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureKind {
    /// Mouse click.
    Click,
    /// Touch start.
    Touch,
    /// Key press.
    Key,
}

#[derive(Debug, Clone)]
struct ArmedElement {
    element: ElementId,
    owner: String,
    remaining: Duration,
}

/// Elements waiting for a user gesture to start playback.
#[derive(Debug)]
pub struct GestureResumeGate {
    armed: Vec<ArmedElement>,
    timeout: Duration,
}

impl Default for GestureResumeGate {
    fn default() -> Self {
        Self::new(DEFAULT_GESTURE_TIMEOUT)
    }
}

impl GestureResumeGate {
    /// Create a gate whose arms expire after `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            armed: Vec::new(),
            timeout,
        }
    }

    /// Arm an element. Re-arming restarts its timeout.
    pub fn arm(&mut self, owner: impl Into<String>, element: ElementId) {
        self.disarm(element);
        let owner = owner.into();
        debug!(owner = %owner, "Armed gesture resume for {:?}", element);
        self.armed.push(ArmedElement {
            element,
            owner,
            remaining: self.timeout,
        });
    }

    /// Disarm one element. Returns true if it was armed.
    pub fn disarm(&mut self, element: ElementId) -> bool {
        let before = self.armed.len();
        self.armed.retain(|a| a.element != element);
        self.armed.len() != before
    }

    /// Disarm every element armed by `owner`.
    pub fn disarm_owner(&mut self, owner: &str) -> usize {
        let before = self.armed.len();
        self.armed.retain(|a| a.owner != owner);
        before - self.armed.len()
    }

    /// Disarm everything.
    pub fn disarm_all(&mut self) -> usize {
        let count = self.armed.len();
        self.armed.clear();
        count
    }

    /// Whether the host should keep gesture listeners installed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.armed.is_empty()
    }

    /// Number of armed elements.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Whether a specific element is armed.
    #[must_use]
    pub fn is_element_armed(&self, element: ElementId) -> bool {
        self.armed.iter().any(|a| a.element == element)
    }

    /// Age every arm by `dt` and drop expired ones.
    pub fn update(&mut self, dt: Duration) -> Vec<ElementId> {
        let mut expired = Vec::new();
        self.armed.retain_mut(|a| {
            a.remaining = a.remaining.saturating_sub(dt);
            if a.remaining.is_zero() {
                expired.push(a.element);
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            debug!("Gesture resume expired for {} elements", expired.len());
        }
        expired
    }

    /// Retry playback on every armed element; `play` returns true on success.
    ///
    /// Elements that start playing are disarmed, the rest stay armed until
    /// they succeed or expire.
    pub fn resume<F>(&mut self, kind: GestureKind, mut play: F) -> usize
    where
        F: FnMut(ElementId) -> bool,
    {
        let before = self.armed.len();
        self.armed.retain(|a| !play(a.element));
        let resumed = before - self.armed.len();
        if resumed > 0 {
            info!("Resumed {} blocked elements after {:?}", resumed, kind);
        }
        resumed
    }
}
