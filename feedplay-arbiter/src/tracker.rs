//! Visibility Tracker
//!
//! Measures what fraction of each registered element lies inside the
//! viewport and reports the elements whose ratio moved into a different
//! threshold band since the last pass.
//!
//! Holds only `Weak` handles. An element whose owner dropped it is reported
//! once at ratio 0.0 and then released, so no stale entry outlives one
//! observation cycle.

use crate::media::MediaElement;
use feedplay_common::{ElementId, Rect};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// One visibility measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: ElementId,
    pub ratio: f64,
}

impl Observation {
    pub fn new(id: impl Into<ElementId>, ratio: f64) -> Self {
        Self {
            id: id.into(),
            ratio,
        }
    }
}

/// Result of one observation pass
#[derive(Debug, Default)]
pub struct Sample {
    /// Ratio changes to feed to the arbitration engine, as one batch
    pub observations: Vec<Observation>,

    /// Elements whose handle was dropped; no longer observed
    pub released: Vec<ElementId>,
}

struct ObservedElement {
    handle: Weak<dyn MediaElement>,
    /// Threshold band at the last report (None until first observed)
    last_band: Option<usize>,
}

pub struct VisibilityTracker {
    thresholds: Vec<f64>,
    elements: HashMap<ElementId, ObservedElement>,
}

impl VisibilityTracker {
    /// Create with an ascending threshold ladder (e.g. 0.0, 0.1, ..., 1.0)
    pub fn new(thresholds: Vec<f64>) -> Self {
        Self {
            thresholds,
            elements: HashMap::new(),
        }
    }

    /// Begin observing an element
    ///
    /// Returns false (and does nothing) if the id is already registered.
    pub fn register(&mut self, id: &ElementId, element: &Arc<dyn MediaElement>) -> bool {
        if self.elements.contains_key(id) {
            debug!("Element {} already observed", id);
            return false;
        }
        element.tag(id);
        self.elements.insert(
            id.clone(),
            ObservedElement {
                handle: Arc::downgrade(element),
                last_band: None,
            },
        );
        true
    }

    /// Stop observing an element. Returns whether it was observed.
    pub fn unregister(&mut self, id: &ElementId) -> bool {
        self.elements.remove(id).is_some()
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Run one observation pass against `viewport`
    ///
    /// Elements without bounds or with zero area measure 0.0 but stay
    /// observed, since they may be laid out again later.
    pub fn sample(&mut self, viewport: &Rect) -> Sample {
        let mut sample = Sample::default();

        for (id, observed) in self.elements.iter_mut() {
            let ratio = match observed.handle.upgrade() {
                Some(element) => element
                    .bounds()
                    .map(|bounds| bounds.visible_ratio(viewport))
                    .unwrap_or(0.0),
                None => {
                    // Final zero, whatever band it was in
                    sample.released.push(id.clone());
                    sample.observations.push(Observation::new(id.clone(), 0.0));
                    continue;
                }
            };

            let band = band_of(&self.thresholds, ratio);
            if observed.last_band != Some(band) {
                observed.last_band = Some(band);
                sample.observations.push(Observation::new(id.clone(), ratio));
            }
        }

        for id in &sample.released {
            debug!("Element {} dropped without unregister, releasing", id);
            self.elements.remove(id);
        }

        sample
    }
}

/// Band index for `ratio`
///
/// A ratio lying exactly on a threshold gets a band of its own, so moving
/// off the selection threshold (e.g. 0.5 → 0.55) is always reported.
fn band_of(thresholds: &[f64], ratio: f64) -> usize {
    let ratio = if ratio.is_nan() { 0.0 } else { ratio };
    let below = thresholds.iter().filter(|t| **t < ratio).count();
    let on = thresholds.iter().any(|t| *t == ratio);
    2 * below + usize::from(on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct Block {
        bounds: Mutex<Option<Rect>>,
        tagged: Mutex<Option<ElementId>>,
    }

    impl Block {
        fn at(y: f64, height: f64) -> Arc<Self> {
            Arc::new(Self {
                bounds: Mutex::new(Some(Rect::new(0.0, y, 100.0, height))),
                tagged: Mutex::new(None),
            })
        }

        fn set_bounds(&self, bounds: Option<Rect>) {
            *self.bounds.lock().unwrap() = bounds;
        }
    }

    impl MediaElement for Block {
        fn bounds(&self) -> Option<Rect> {
            *self.bounds.lock().unwrap()
        }
        fn play(&self) -> crate::media::PlayAttempt {
            futures::future::ready(Ok(())).boxed()
        }
        fn pause(&self) {}
        fn set_muted(&self, _muted: bool) {}
        fn tag(&self, id: &ElementId) {
            *self.tagged.lock().unwrap() = Some(id.clone());
        }
    }

    fn tenths() -> Vec<f64> {
        (0..=10).map(|i| i as f64 / 10.0).collect()
    }

    fn viewport() -> Rect {
        Rect::new(0.0, 0.0, 100.0, 100.0)
    }

    #[test]
    fn test_band_boundaries() {
        let t = tenths();
        assert_eq!(band_of(&t, 0.0), 1);
        assert_eq!(band_of(&t, 0.05), 2);
        assert_eq!(band_of(&t, 0.5), 11);
        assert_eq!(band_of(&t, 0.55), 12);
        assert_eq!(band_of(&t, 0.58), 12);
        assert_eq!(band_of(&t, 0.97), 20);
        assert_eq!(band_of(&t, 1.0), 21);
        assert_eq!(band_of(&t, f64::NAN), band_of(&t, 0.0));
    }

    #[test]
    fn test_register_tags_and_is_idempotent() {
        let mut tracker = VisibilityTracker::new(tenths());
        let block = Block::at(0.0, 50.0);
        let element: Arc<dyn MediaElement> = block.clone();
        let id = ElementId::new("a");

        assert!(tracker.register(&id, &element));
        assert!(!tracker.register(&id, &element));
        assert_eq!(tracker.len(), 1);
        assert_eq!(block.tagged.lock().unwrap().as_ref(), Some(&id));
    }

    #[test]
    fn test_first_sample_reports_everything() {
        let mut tracker = VisibilityTracker::new(tenths());
        let a: Arc<dyn MediaElement> = Block::at(0.0, 50.0);
        let b: Arc<dyn MediaElement> = Block::at(200.0, 50.0);
        tracker.register(&"a".into(), &a);
        tracker.register(&"b".into(), &b);

        let mut observations = tracker.sample(&viewport()).observations;
        observations.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(
            observations,
            vec![Observation::new("a", 1.0), Observation::new("b", 0.0)]
        );
    }

    #[test]
    fn test_reports_only_band_crossings() {
        let mut tracker = VisibilityTracker::new(tenths());
        let block = Block::at(0.0, 100.0);
        let element: Arc<dyn MediaElement> = block.clone();
        tracker.register(&"a".into(), &element);
        tracker.sample(&viewport());

        // 1.0 → 0.97: off the 1.0 threshold, new band
        block.set_bounds(Some(Rect::new(0.0, 3.0, 100.0, 100.0)));
        assert_eq!(tracker.sample(&viewport()).observations.len(), 1);

        // 0.97 → 0.95: same band, nothing reported
        block.set_bounds(Some(Rect::new(0.0, 5.0, 100.0, 100.0)));
        assert!(tracker.sample(&viewport()).observations.is_empty());

        // 0.95 → 0.45: crosses several thresholds, reported with exact ratio
        block.set_bounds(Some(Rect::new(0.0, 55.0, 100.0, 100.0)));
        let observations = tracker.sample(&viewport()).observations;
        assert_eq!(observations, vec![Observation::new("a", 0.45)]);
    }

    #[test]
    fn test_detached_element_measures_zero_but_stays_observed() {
        let mut tracker = VisibilityTracker::new(tenths());
        let block = Block::at(0.0, 100.0);
        let element: Arc<dyn MediaElement> = block.clone();
        tracker.register(&"a".into(), &element);
        tracker.sample(&viewport());

        block.set_bounds(None);
        let sample = tracker.sample(&viewport());
        assert_eq!(sample.observations, vec![Observation::new("a", 0.0)]);
        assert!(sample.released.is_empty());
        assert!(tracker.contains(&"a".into()));

        block.set_bounds(Some(Rect::new(0.0, 0.0, 100.0, 0.0)));
        assert!(tracker.sample(&viewport()).observations.is_empty());
    }

    #[test]
    fn test_dropped_element_released_after_one_cycle() {
        let mut tracker = VisibilityTracker::new(tenths());
        let element: Arc<dyn MediaElement> = Block::at(0.0, 100.0);
        tracker.register(&"a".into(), &element);
        tracker.sample(&viewport());

        drop(element);
        let sample = tracker.sample(&viewport());
        assert_eq!(sample.observations, vec![Observation::new("a", 0.0)]);
        assert_eq!(sample.released, vec![ElementId::new("a")]);
        assert!(tracker.is_empty());

        let next = tracker.sample(&viewport());
        assert!(next.observations.is_empty());
        assert!(next.released.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut tracker = VisibilityTracker::new(tenths());
        let element: Arc<dyn MediaElement> = Block::at(0.0, 100.0);
        tracker.register(&"a".into(), &element);

        assert!(tracker.unregister(&"a".into()));
        assert!(!tracker.unregister(&"a".into()));
    }
}
