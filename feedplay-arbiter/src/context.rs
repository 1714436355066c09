//! Per-feed dependency bundle
//!
//! Everything a playback client needs from its surroundings, passed down
//! explicitly rather than looked up from hidden global state.

use crate::arbiter::PlaybackArbiter;
use crate::foreground::ForegroundSignal;
use feedplay_common::config::ArbiterConfig;
use feedplay_common::events::EventBus;
use feedplay_common::mute::{MuteState, MuteStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct FeedContext {
    pub arbiter: PlaybackArbiter,
    pub foreground: ForegroundSignal,
    pub mute: MuteState,
}

impl FeedContext {
    /// Build a fresh arbiter, foreground signal and mute state sharing one EventBus
    pub fn new(config: &ArbiterConfig, mute_store: Arc<dyn MuteStore>) -> Self {
        let events = Arc::new(EventBus::new(config.event_bus_capacity));
        Self {
            arbiter: PlaybackArbiter::with_event_bus(config, events.clone()),
            foreground: ForegroundSignal::new(events.clone()),
            mute: MuteState::new(mute_store).with_event_bus(events),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.arbiter.events()
    }
}
