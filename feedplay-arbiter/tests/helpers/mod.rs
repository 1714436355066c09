//! Test helpers for feedplay-arbiter integration tests
//!
//! Provides a feed builder that mounts scripted elements in a vertical
//! column and drives all clients through one observation cycle at a time.

use feedplay_arbiter::scenario::ScriptedElement;
use feedplay_arbiter::{FeedContext, PlaybackClient, VisualState};
use feedplay_common::config::ArbiterConfig;
use feedplay_common::mute::MemoryMuteStore;
use feedplay_common::{ElementId, Rect};
use std::sync::Arc;

pub const VIEWPORT_WIDTH: f64 = 400.0;
pub const VIEWPORT_HEIGHT: f64 = 800.0;

pub struct TestPlayer {
    pub element: Arc<ScriptedElement>,
    pub client: PlaybackClient,
}

pub struct TestFeed {
    pub context: FeedContext,
    pub players: Vec<TestPlayer>,
    pub scroll_top: f64,
}

impl TestFeed {
    pub fn new() -> Self {
        Self {
            context: FeedContext::new(
                &ArbiterConfig::default(),
                Arc::new(MemoryMuteStore::default()),
            ),
            players: Vec::new(),
            scroll_top: 0.0,
        }
    }

    /// Mount a player occupying [top, top + height) of the feed column
    pub fn mount(&mut self, id: &str, top: f64, height: f64) -> &mut Self {
        let element = Arc::new(ScriptedElement::new(Rect::new(
            0.0,
            top,
            VIEWPORT_WIDTH,
            height,
        )));
        let client = PlaybackClient::mount(&self.context, Some(ElementId::new(id)), element.clone())
            .unwrap_or_else(|e| panic!("mount {}: {}", id, e));
        self.players.push(TestPlayer { element, client });
        self
    }

    pub fn player(&mut self, id: &str) -> &mut TestPlayer {
        self.players
            .iter_mut()
            .find(|p| p.client.id().as_str() == id)
            .unwrap_or_else(|| panic!("no player {}", id))
    }

    pub fn viewport(&self) -> Rect {
        Rect::new(0.0, self.scroll_top, VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
    }

    /// One full cycle: observe, sync every client, settle play requests
    pub async fn cycle(&mut self) {
        self.context.arbiter.observe(self.viewport());
        for player in &mut self.players {
            player.client.sync();
        }
        for player in &mut self.players {
            player.client.settle().await;
        }
    }

    pub async fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top;
        self.cycle().await;
    }

    pub fn active(&self) -> Option<String> {
        self.context
            .arbiter
            .active_id()
            .map(|id| id.as_str().to_string())
    }

    pub fn state(&mut self, id: &str) -> VisualState {
        self.player(id).client.visual_state()
    }

    /// Ids whose underlying element is currently playing
    pub fn playing(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.element.is_playing())
            .map(|p| p.client.id().as_str().to_string())
            .collect()
    }
}
