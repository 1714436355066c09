//! Playback Client
//!
//! Bridges one media element to the arbiter. The client:
//! - registers on mount and unregisters on unmount (or drop)
//! - plays when its id becomes active and pauses when it stops being active
//! - turns explicit clicks into `manual_play` / `manual_pause` intents
//! - pauses while the application is suspended and resumes afterwards if
//!   it is still the active element
//! - applies the shared mute flag
//!
//! Play requests are asynchronous. Each one carries a generation number;
//! outcomes of superseded requests, or outcomes arriving after unmount, are
//! dropped. A rejected request leaves the client paused and is not retried.

use crate::arbiter::{ActiveIdReceiver, PlaybackArbiter};
use crate::context::FeedContext;
use crate::error::{Error, Result};
use crate::media::MediaElement;
use chrono::Utc;
use feedplay_common::events::FeedEvent;
use feedplay_common::mute::MuteState;
use feedplay_common::ElementId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Longest [`PlaybackClient::settle`] waits for a host's play request
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the player should currently show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualState {
    Paused,
    /// Play requested, outcome pending
    Starting,
    Playing,
    /// Playing but stalled waiting for data
    Buffering,
}

impl std::fmt::Display for VisualState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualState::Paused => write!(f, "paused"),
            VisualState::Starting => write!(f, "starting"),
            VisualState::Playing => write!(f, "playing"),
            VisualState::Buffering => write!(f, "buffering"),
        }
    }
}

#[derive(Debug)]
struct PlayOutcome {
    generation: u64,
    result: std::result::Result<(), String>,
}

pub struct PlaybackClient {
    id: ElementId,
    element: Arc<dyn MediaElement>,
    arbiter: PlaybackArbiter,
    mute: MuteState,
    active_rx: ActiveIdReceiver,
    foreground_rx: watch::Receiver<bool>,
    mute_rx: watch::Receiver<bool>,
    visual: VisualState,
    was_active: bool,
    foreground: bool,
    /// Paused because the application was suspended, not by the user
    auto_paused: bool,
    generation: u64,
    outcome_tx: mpsc::UnboundedSender<PlayOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<PlayOutcome>,
    mounted: bool,
}

impl PlaybackClient {
    /// Register `element` with the feed's arbiter
    ///
    /// A fresh id is generated when none is supplied. Fails with
    /// [`Error::DuplicateId`] if another mounted element holds the id; that
    /// element keeps its registration.
    pub fn mount(
        context: &FeedContext,
        id: Option<ElementId>,
        element: Arc<dyn MediaElement>,
    ) -> Result<Self> {
        let id = id.unwrap_or_else(ElementId::generate);
        if !context.arbiter.register(&id, &element) {
            warn!("Element id {} already mounted, refusing duplicate", id);
            return Err(Error::DuplicateId(id));
        }
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let mut mute_rx = context.mute.subscribe();
        element.set_muted(*mute_rx.borrow_and_update());

        let mut foreground_rx = context.foreground.subscribe();
        let foreground = *foreground_rx.borrow_and_update();

        Ok(Self {
            id,
            element,
            arbiter: context.arbiter.clone(),
            mute: context.mute.clone(),
            active_rx: context.arbiter.subscribe(),
            foreground_rx,
            mute_rx,
            visual: VisualState::Paused,
            was_active: false,
            foreground,
            auto_paused: false,
            generation: 0,
            outcome_tx,
            outcome_rx,
            mounted: true,
        })
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn visual_state(&self) -> VisualState {
        self.visual
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Playing from the user's point of view (including pending and stalled)
    pub fn is_playing(&self) -> bool {
        matches!(
            self.visual,
            VisualState::Starting | VisualState::Playing | VisualState::Buffering
        )
    }

    /// Catch up with everything that changed since the last call
    ///
    /// Applies settled play outcomes, mute broadcasts, foreground changes
    /// and arbitration decisions, in that order. Hosts call this after each
    /// event they deliver.
    pub fn sync(&mut self) {
        if !self.mounted {
            return;
        }

        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.apply_outcome(outcome);
        }

        if self.mute_rx.has_changed().unwrap_or(false) {
            let muted = *self.mute_rx.borrow_and_update();
            self.element.set_muted(muted);
        }

        let foreground = *self.foreground_rx.borrow_and_update();
        if foreground != self.foreground {
            self.foreground = foreground;
            if foreground {
                self.on_resumed();
            } else {
                self.on_suspended();
            }
        }

        let is_active = self.active_rx.borrow_and_update().as_ref() == Some(&self.id);
        if is_active != self.was_active {
            self.was_active = is_active;
            if is_active {
                if !self.foreground {
                    // Granted while in the background; play on resume
                    self.auto_paused = true;
                } else if !self.is_playing() {
                    self.start_play();
                }
            } else {
                self.auto_paused = false;
                if self.is_playing() {
                    self.stop();
                }
            }
        }
    }

    /// Wait for the pending play request (if any) to settle, for at most
    /// [`SETTLE_TIMEOUT`]
    pub async fn settle(&mut self) {
        self.settle_within(SETTLE_TIMEOUT).await;
    }

    /// Wait up to `limit` for the pending play request to settle
    ///
    /// Returns false if it is still pending. A late outcome is applied by a
    /// later `sync`.
    pub async fn settle_within(&mut self, limit: Duration) -> bool {
        let wait = async {
            while self.mounted && self.visual == VisualState::Starting {
                match self.outcome_rx.recv().await {
                    Some(outcome) => self.apply_outcome(outcome),
                    None => break,
                }
            }
        };
        if tokio::time::timeout(limit, wait).await.is_err() {
            warn!("Play request for {} still pending after {:?}", self.id, limit);
            return false;
        }
        true
    }

    /// Explicit user click on the player
    pub fn toggle(&mut self) -> Result<()> {
        if !self.mounted {
            return Err(Error::StaleRegistration(self.id.clone()));
        }
        if self.is_playing() {
            self.arbiter.manual_pause(&self.id)?;
            self.auto_paused = false;
            self.stop();
        } else {
            self.arbiter.manual_play(&self.id)?;
            self.start_play();
        }
        Ok(())
    }

    /// Flip the shared mute flag for every client of the feed
    pub fn toggle_mute(&self) -> Result<bool> {
        Ok(self.mute.toggle()?)
    }

    /// Host reports the element stalled waiting for data
    pub fn mark_buffering(&mut self) {
        if matches!(self.visual, VisualState::Starting | VisualState::Playing) {
            self.visual = VisualState::Buffering;
        }
    }

    /// Host reports the element is rendering frames again
    pub fn mark_playing(&mut self) {
        if matches!(self.visual, VisualState::Starting | VisualState::Buffering) {
            self.visual = VisualState::Playing;
        }
    }

    /// Unregister from the arbiter. Idempotent; also runs on drop.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        if self.is_playing() {
            self.element.pause();
        }
        // Invalidate any in-flight play request
        self.generation += 1;
        self.visual = VisualState::Paused;
        self.arbiter.unregister(&self.id);
        debug!("Client {} unmounted", self.id);
    }

    fn on_suspended(&mut self) {
        if self.is_playing() {
            debug!("Client {} pausing for background", self.id);
            self.stop();
            self.auto_paused = true;
        }
    }

    fn on_resumed(&mut self) {
        let resume = self.auto_paused && self.arbiter.active_id().as_ref() == Some(&self.id);
        self.auto_paused = false;
        if resume && !self.is_playing() {
            debug!("Client {} resuming after background", self.id);
            self.start_play();
        }
    }

    fn start_play(&mut self) {
        self.generation += 1;
        let generation = self.generation;

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime; play request for {} dropped", self.id);
                self.visual = VisualState::Paused;
                return;
            }
        };

        self.visual = VisualState::Starting;
        let attempt = self.element.play();
        let tx = self.outcome_tx.clone();
        handle.spawn(async move {
            let result = attempt.await;
            // Receiver gone means the client was dropped; nothing to update
            let _ = tx.send(PlayOutcome { generation, result });
        });
    }

    fn stop(&mut self) {
        self.element.pause();
        self.generation += 1;
        self.visual = VisualState::Paused;
    }

    fn apply_outcome(&mut self, outcome: PlayOutcome) {
        if !self.mounted || outcome.generation != self.generation {
            debug!("Discarding superseded play outcome for {}", self.id);
            return;
        }
        match outcome.result {
            Ok(()) => {
                if self.visual == VisualState::Starting {
                    self.visual = VisualState::Playing;
                }
            }
            Err(reason) => {
                let error = Error::PlaybackRejected {
                    id: self.id.clone(),
                    reason: reason.clone(),
                };
                warn!("{}", error);
                self.visual = VisualState::Paused;
                self.arbiter.events().emit_lossy(FeedEvent::PlaybackRejected {
                    id: self.id.clone(),
                    reason,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}

impl Drop for PlaybackClient {
    fn drop(&mut self) {
        self.unmount();
    }
}
