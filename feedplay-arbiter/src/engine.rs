//! Arbitration Engine
//!
//! Owns the authoritative answer to "which element may play". All ratio,
//! suppression and override state lives here and is only mutated through
//! the public operations below.
//!
//! Decision, run after every visibility batch:
//! 1. Candidate = most visible element with ratio above the threshold.
//!    Ties go to the earliest-registered element.
//! 2. A user-played element still above the threshold overrides the candidate.
//! 3. A user-played element at or below the threshold is released.
//! 4. If the winner was paused by the user, nothing plays. There is no
//!    fallback to a runner-up.
//! 5. An element whose ratio reaches exactly 0 loses its user pause / user
//!    play state.
//! 6. The result is published only when it differs from the previous one.

use crate::error::{Error, Result};
use crate::tracker::Observation;
use chrono::Utc;
use feedplay_common::events::{EventBus, FeedEvent};
use feedplay_common::ElementId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug)]
struct TrackedElement {
    ratio: f64,
    /// Registration order, for tie-breaking
    seq: u64,
}

pub struct ArbitrationEngine {
    threshold: f64,
    elements: HashMap<ElementId, TrackedElement>,
    next_seq: u64,
    user_paused: HashSet<ElementId>,
    user_played: Option<ElementId>,
    active_tx: watch::Sender<Option<ElementId>>,
    events: Arc<EventBus>,
}

impl ArbitrationEngine {
    pub fn new(threshold: f64, events: Arc<EventBus>) -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            threshold,
            elements: HashMap::new(),
            next_seq: 0,
            user_paused: HashSet::new(),
            user_played: None,
            active_tx,
            events,
        }
    }

    /// Current decision
    pub fn active_id(&self) -> Option<ElementId> {
        self.active_tx.borrow().clone()
    }

    /// Receiver for decision changes; drop it to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<Option<ElementId>> {
        self.active_tx.subscribe()
    }

    /// Start tracking an element at ratio 0.0. No-op if already tracked.
    pub fn track(&mut self, id: &ElementId) -> bool {
        if self.elements.contains_key(id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.elements
            .insert(id.clone(), TrackedElement { ratio: 0.0, seq });
        self.events.emit_lossy(FeedEvent::ElementRegistered {
            id: id.clone(),
            timestamp: Utc::now(),
        });
        true
    }

    /// Stop tracking an element
    ///
    /// Drops every trace of the id. If it held playback, active status is
    /// cleared immediately; the next visibility batch picks a successor.
    pub fn forget(&mut self, id: &ElementId) -> bool {
        if self.elements.remove(id).is_none() {
            return false;
        }
        self.user_paused.remove(id);
        if self.user_played.as_ref() == Some(id) {
            self.user_played = None;
        }

        let was_active = self.active_tx.borrow().as_ref() == Some(id);
        if was_active {
            self.publish(None);
        }
        self.events.emit_lossy(FeedEvent::ElementUnregistered {
            id: id.clone(),
            was_active,
            timestamp: Utc::now(),
        });
        true
    }

    /// Apply a batch of visibility observations, then recompute once
    ///
    /// Observations for unknown ids are discarded.
    pub fn on_visibility_change(&mut self, observations: &[Observation]) {
        for observation in observations {
            let Some(tracked) = self.elements.get_mut(&observation.id) else {
                debug!(
                    "Discarding observation for unregistered element {}",
                    observation.id
                );
                continue;
            };

            tracked.ratio = if observation.ratio.is_finite() {
                observation.ratio.clamp(0.0, 1.0)
            } else {
                0.0
            };

            if tracked.ratio == 0.0 {
                self.clear_suppression(&observation.id);
            }
        }

        let next = self.decide();
        self.publish(next);
    }

    /// User explicitly started `id`; it becomes active immediately
    pub fn manual_play(&mut self, id: &ElementId) -> Result<()> {
        if !self.elements.contains_key(id) {
            return Err(Error::StaleRegistration(id.clone()));
        }
        self.user_paused.remove(id);
        self.user_played = Some(id.clone());
        self.events.emit_lossy(FeedEvent::ManualPlay {
            id: id.clone(),
            timestamp: Utc::now(),
        });
        self.publish(Some(id.clone()));
        Ok(())
    }

    /// User explicitly paused `id`; it will not be auto-selected again until
    /// it leaves view entirely or the user plays it
    pub fn manual_pause(&mut self, id: &ElementId) -> Result<()> {
        if !self.elements.contains_key(id) {
            return Err(Error::StaleRegistration(id.clone()));
        }
        self.user_paused.insert(id.clone());
        if self.user_played.as_ref() == Some(id) {
            self.user_played = None;
        }
        self.events.emit_lossy(FeedEvent::ManualPause {
            id: id.clone(),
            timestamp: Utc::now(),
        });
        if self.active_tx.borrow().as_ref() == Some(id) {
            self.publish(None);
        }
        Ok(())
    }

    pub fn ratio(&self, id: &ElementId) -> Option<f64> {
        self.elements.get(id).map(|t| t.ratio)
    }

    pub fn is_user_paused(&self, id: &ElementId) -> bool {
        self.user_paused.contains(id)
    }

    pub fn user_played(&self) -> Option<&ElementId> {
        self.user_played.as_ref()
    }

    pub fn tracked_count(&self) -> usize {
        self.elements.len()
    }

    fn clear_suppression(&mut self, id: &ElementId) {
        let mut cleared = self.user_paused.remove(id);
        if self.user_played.as_ref() == Some(id) {
            self.user_played = None;
            cleared = true;
        }
        if cleared {
            debug!("Element {} left view, user intent reset", id);
            self.events.emit_lossy(FeedEvent::SuppressionCleared {
                id: id.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    fn decide(&mut self) -> Option<ElementId> {
        let candidate = self
            .elements
            .iter()
            .filter(|(_, tracked)| tracked.ratio > self.threshold)
            .max_by(|(_, a), (_, b)| {
                a.ratio
                    .total_cmp(&b.ratio)
                    // Earlier registration ranks higher on equal ratios
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .map(|(id, _)| id.clone());

        let winner = match self.user_played.take() {
            Some(id) if self.ratio(&id).unwrap_or(0.0) > self.threshold => {
                self.user_played = Some(id.clone());
                Some(id)
            }
            Some(id) => {
                debug!("User-played element {} scrolled away, releasing", id);
                candidate
            }
            None => candidate,
        };

        match winner {
            Some(id) if self.user_paused.contains(&id) => {
                debug!("Best element {} was paused by user, staying silent", id);
                None
            }
            other => other,
        }
    }

    fn publish(&mut self, next: Option<ElementId>) {
        let previous = self.active_tx.borrow().clone();
        if previous == next {
            return;
        }
        info!(
            "Active element: {} -> {}",
            previous.as_ref().map_or("none", |id| id.as_str()),
            next.as_ref().map_or("none", |id| id.as_str())
        );
        self.active_tx.send_replace(next.clone());
        self.events.emit_lossy(FeedEvent::ActiveChanged {
            previous,
            current: next,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(ids: &[&str]) -> ArbitrationEngine {
        let mut engine = ArbitrationEngine::new(0.5, Arc::new(EventBus::new(64)));
        for id in ids {
            engine.track(&ElementId::new(*id));
        }
        engine
    }

    fn observe(engine: &mut ArbitrationEngine, batch: &[(&str, f64)]) {
        let observations: Vec<Observation> = batch
            .iter()
            .map(|(id, ratio)| Observation::new(*id, *ratio))
            .collect();
        engine.on_visibility_change(&observations);
    }

    fn id(s: &str) -> ElementId {
        ElementId::new(s)
    }

    #[test]
    fn test_most_visible_wins() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.3)]);
        assert_eq!(engine.active_id(), Some(id("a")));

        observe(&mut engine, &[("a", 0.6), ("b", 0.8)]);
        assert_eq!(engine.active_id(), Some(id("b")));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("a", 0.5)]);
        assert_eq!(engine.active_id(), None);

        observe(&mut engine, &[("a", 0.5000001)]);
        assert_eq!(engine.active_id(), Some(id("a")));
    }

    #[test]
    fn test_tie_goes_to_earliest_registered() {
        // Registration order, not id order or batch order
        let mut engine = engine_with(&["zeta", "alpha"]);
        observe(&mut engine, &[("alpha", 0.8), ("zeta", 0.8)]);
        assert_eq!(engine.active_id(), Some(id("zeta")));
    }

    #[test]
    fn test_manual_play_overrides_more_visible() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.9)]);
        assert_eq!(engine.active_id(), Some(id("a")));

        engine.manual_play(&id("b")).unwrap();
        assert_eq!(engine.active_id(), Some(id("b")));

        observe(&mut engine, &[("a", 1.0), ("b", 0.6)]);
        assert_eq!(engine.active_id(), Some(id("b")));
        assert_eq!(engine.user_played(), Some(&id("b")));
    }

    #[test]
    fn test_manual_play_released_at_threshold() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.7), ("b", 0.9)]);
        engine.manual_play(&id("a")).unwrap();

        observe(&mut engine, &[("a", 0.5)]);
        assert_eq!(engine.user_played(), None);
        assert_eq!(engine.active_id(), Some(id("b")));
    }

    #[test]
    fn test_manual_pause_does_not_fall_back() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.6)]);
        engine.manual_pause(&id("a")).unwrap();
        assert_eq!(engine.active_id(), None);

        // Still silent on the next batch while A remains the best candidate
        observe(&mut engine, &[("b", 0.7)]);
        assert_eq!(engine.active_id(), None);
    }

    #[test]
    fn test_suppressed_element_can_lose_to_better_one() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.2)]);
        engine.manual_pause(&id("a")).unwrap();

        observe(&mut engine, &[("a", 0.6), ("b", 0.95)]);
        assert_eq!(engine.active_id(), Some(id("b")));
    }

    #[test]
    fn test_zero_ratio_clears_suppression() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("a", 0.9)]);
        engine.manual_pause(&id("a")).unwrap();
        assert!(engine.is_user_paused(&id("a")));

        observe(&mut engine, &[("a", 0.3)]);
        assert!(engine.is_user_paused(&id("a")));

        observe(&mut engine, &[("a", 0.0)]);
        assert!(!engine.is_user_paused(&id("a")));

        observe(&mut engine, &[("a", 0.8)]);
        assert_eq!(engine.active_id(), Some(id("a")));
    }

    #[test]
    fn test_manual_play_clears_suppression() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("a", 0.9)]);
        engine.manual_pause(&id("a")).unwrap();
        engine.manual_play(&id("a")).unwrap();

        assert!(!engine.is_user_paused(&id("a")));
        assert_eq!(engine.active_id(), Some(id("a")));
    }

    #[test]
    fn test_whole_batch_applied_before_decision() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.1)]);
        let mut rx = engine.subscribe();

        // A leaves while B arrives in the same batch
        observe(&mut engine, &[("a", 0.2), ("b", 0.9)]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(id("b")));
    }

    #[test]
    fn test_publish_only_on_change() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("a", 0.9)]);
        let mut rx = engine.subscribe();

        observe(&mut engine, &[("a", 0.95)]);
        assert!(!rx.has_changed().unwrap());

        observe(&mut engine, &[("a", 0.1)]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[test]
    fn test_stale_observation_discarded() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("ghost", 1.0), ("a", 0.7)]);
        assert_eq!(engine.active_id(), Some(id("a")));
        assert_eq!(engine.ratio(&id("ghost")), None);
    }

    #[test]
    fn test_intents_for_unknown_ids_are_stale() {
        let mut engine = engine_with(&[]);
        assert!(matches!(
            engine.manual_play(&id("x")),
            Err(Error::StaleRegistration(_))
        ));
        assert!(matches!(
            engine.manual_pause(&id("x")),
            Err(Error::StaleRegistration(_))
        ));
        assert_eq!(engine.active_id(), None);
    }

    #[test]
    fn test_forget_active_clears_immediately() {
        let mut engine = engine_with(&["a", "b"]);
        observe(&mut engine, &[("a", 0.9), ("b", 0.7)]);

        assert!(engine.forget(&id("a")));
        assert_eq!(engine.active_id(), None);
        assert!(!engine.forget(&id("a")));
        assert_eq!(engine.ratio(&id("b")), Some(0.7));
    }

    #[test]
    fn test_non_finite_ratio_treated_as_zero() {
        let mut engine = engine_with(&["a"]);
        observe(&mut engine, &[("a", f64::NAN)]);
        assert_eq!(engine.ratio(&id("a")), Some(0.0));
        assert_eq!(engine.active_id(), None);
    }

    #[test]
    fn test_events_emitted() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let mut engine = ArbitrationEngine::new(0.5, bus);

        engine.track(&id("a"));
        observe(&mut engine, &[("a", 0.9)]);
        engine.manual_pause(&id("a")).unwrap();
        observe(&mut engine, &[("a", 0.0)]);

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "ElementRegistered",
                "ActiveChanged",
                "ManualPause",
                "ActiveChanged",
                "SuppressionCleared",
            ]
        );
    }
}
