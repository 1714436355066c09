//! Foreground / background signal
//!
//! The host reports whether the application is currently in the
//! foreground (a browser tab being visible, a mobile app being resumed).
//! Playback clients pause themselves while suspended without touching
//! arbitration state.

use chrono::Utc;
use feedplay_common::events::{EventBus, FeedEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct ForegroundSignal {
    tx: Arc<watch::Sender<bool>>,
    events: Arc<EventBus>,
}

impl ForegroundSignal {
    /// Starts in the foreground
    pub fn new(events: Arc<EventBus>) -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            tx: Arc::new(tx),
            events,
        }
    }

    pub fn is_foreground(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn suspend(&self) {
        self.set(false);
    }

    pub fn resume(&self) {
        self.set(true);
    }

    fn set(&self, foreground: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != foreground;
            *current = foreground;
            changed
        });
        if changed {
            info!(
                "Application {}",
                if foreground { "resumed" } else { "suspended" }
            );
            self.events.emit_lossy(FeedEvent::ForegroundChanged {
                foreground,
                timestamp: Utc::now(),
            });
        }
    }
}
