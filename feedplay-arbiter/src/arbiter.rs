//! Playback Arbiter service object
//!
//! Pairs the visibility tracker with the arbitration engine behind a
//! cloneable handle. Construct one per feed and hand it to every playback
//! client of that feed; independent feeds get independent arbiters.
//!
//! Every operation runs to completion synchronously. The mutex only makes
//! the handle shareable; no call holds it across a suspension point.

use crate::engine::ArbitrationEngine;
use crate::error::Result;
use crate::media::MediaElement;
use crate::tracker::{Observation, VisibilityTracker};
use feedplay_common::config::ArbiterConfig;
use feedplay_common::events::EventBus;
use feedplay_common::{ElementId, Rect};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Subscription to active-id decisions. Drop it to unsubscribe.
pub type ActiveIdReceiver = watch::Receiver<Option<ElementId>>;

struct ArbiterInner {
    tracker: VisibilityTracker,
    engine: ArbitrationEngine,
}

#[derive(Clone)]
pub struct PlaybackArbiter {
    inner: Arc<Mutex<ArbiterInner>>,
    events: Arc<EventBus>,
}

impl PlaybackArbiter {
    pub fn new(config: &ArbiterConfig) -> Self {
        Self::with_event_bus(config, Arc::new(EventBus::new(config.event_bus_capacity)))
    }

    pub fn with_event_bus(config: &ArbiterConfig, events: Arc<EventBus>) -> Self {
        let inner = ArbiterInner {
            tracker: VisibilityTracker::new(config.thresholds()),
            engine: ArbitrationEngine::new(config.visibility_threshold, events.clone()),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterInner> {
        // State is consistent after every operation, so a poisoned lock is usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin tracking an element
    ///
    /// Returns false, leaving the existing registration untouched, if the id
    /// is already registered.
    pub fn register(&self, id: &ElementId, element: &Arc<dyn MediaElement>) -> bool {
        let mut inner = self.lock();
        if !inner.tracker.register(id, element) {
            return false;
        }
        inner.engine.track(id);
        debug!("Registered element {}", id);
        true
    }

    /// Stop tracking an element; clears active status if it held it.
    /// Idempotent.
    pub fn unregister(&self, id: &ElementId) {
        let mut inner = self.lock();
        inner.tracker.unregister(id);
        if inner.engine.forget(id) {
            debug!("Unregistered element {}", id);
        }
    }

    /// Run one observation pass against the viewport and apply the result
    pub fn observe(&self, viewport: Rect) {
        let mut inner = self.lock();
        let sample = inner.tracker.sample(&viewport);
        if !sample.observations.is_empty() {
            inner.engine.on_visibility_change(&sample.observations);
        }
        for id in &sample.released {
            inner.engine.forget(id);
        }
    }

    /// Apply observations measured by the host itself
    pub fn report_visibility(&self, observations: &[Observation]) {
        self.lock().engine.on_visibility_change(observations);
    }

    pub fn manual_play(&self, id: &ElementId) -> Result<()> {
        self.lock().engine.manual_play(id)
    }

    pub fn manual_pause(&self, id: &ElementId) -> Result<()> {
        self.lock().engine.manual_pause(id)
    }

    pub fn active_id(&self) -> Option<ElementId> {
        self.lock().engine.active_id()
    }

    pub fn subscribe(&self) -> ActiveIdReceiver {
        self.lock().engine.subscribe()
    }

    pub fn is_registered(&self, id: &ElementId) -> bool {
        self.lock().tracker.contains(id)
    }

    pub fn is_user_paused(&self, id: &ElementId) -> bool {
        self.lock().engine.is_user_paused(id)
    }

    pub fn ratio(&self, id: &ElementId) -> Option<f64> {
        self.lock().engine.ratio(id)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
