//! Scripted feed scenarios
//!
//! A scenario describes a vertical feed of media elements and a sequence of
//! user/host actions (scrolling, clicks, backgrounding, unmounting). The
//! runner mounts a [`PlaybackClient`] per element over a [`ScriptedElement`]
//! and records which element is active after every step.
//!
//! ```toml
//! viewport_height = 800.0
//!
//! [[elements]]
//! id = "intro"
//! top = 0.0
//! height = 500.0
//!
//! [[steps]]
//! action = "scroll"
//! to = 400.0
//!
//! [[steps]]
//! action = "click"
//! id = "intro"
//! ```

use crate::client::{PlaybackClient, VisualState};
use crate::context::FeedContext;
use crate::error::{Error, Result};
use crate::media::{MediaElement, PlayAttempt};
use feedplay_common::config::ArbiterConfig;
use feedplay_common::events::FeedEvent;
use feedplay_common::mute::MuteStore;
use feedplay_common::{ElementId, Rect};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

/// Host-side media element driven by a script
///
/// Layout bounds can be changed or removed; play requests resolve
/// immediately, or are rejected when autoplay is blocked.
pub struct ScriptedElement {
    bounds: Mutex<Option<Rect>>,
    autoplay_blocked: AtomicBool,
    playing: AtomicBool,
    muted: AtomicBool,
    tag: Mutex<Option<ElementId>>,
    play_requests: AtomicUsize,
}

impl ScriptedElement {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds: Mutex::new(Some(bounds)),
            autoplay_blocked: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            tag: Mutex::new(None),
            play_requests: AtomicUsize::new(0),
        }
    }

    pub fn set_bounds(&self, bounds: Option<Rect>) {
        *self.bounds.lock().unwrap_or_else(|e| e.into_inner()) = bounds;
    }

    pub fn set_autoplay_blocked(&self, blocked: bool) {
        self.autoplay_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn tagged_id(&self) -> Option<ElementId> {
        self.tag.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn play_requests(&self) -> usize {
        self.play_requests.load(Ordering::SeqCst)
    }
}

impl MediaElement for ScriptedElement {
    fn bounds(&self) -> Option<Rect> {
        *self.bounds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn play(&self) -> PlayAttempt {
        self.play_requests.fetch_add(1, Ordering::SeqCst);
        let result = if self.autoplay_blocked.load(Ordering::SeqCst) {
            Err("autoplay blocked by host policy".to_string())
        } else {
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn tag(&self, id: &ElementId) {
        *self.tag.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
    }
}

/// Element placement in the feed column
#[derive(Debug, Clone, Deserialize)]
pub struct ElementSpec {
    pub id: String,
    pub top: f64,
    pub height: f64,
    #[serde(default)]
    pub autoplay_blocked: bool,
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Move the viewport's top edge to `to`
    Scroll { to: f64 },
    /// User clicks the player
    Click { id: String },
    /// Application goes to background
    Suspend,
    /// Application returns to foreground
    Resume,
    /// Player component unmounts
    Unmount { id: String },
    /// Element leaves the render tree without unmounting
    Detach { id: String },
    /// Flip the shared mute flag
    ToggleMute,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Scroll { to } => write!(f, "scroll to {}", to),
            Step::Click { id } => write!(f, "click {}", id),
            Step::Suspend => write!(f, "suspend"),
            Step::Resume => write!(f, "resume"),
            Step::Unmount { id } => write!(f, "unmount {}", id),
            Step::Detach { id } => write!(f, "detach {}", id),
            Step::ToggleMute => write!(f, "toggle mute"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_viewport_width() -> f64 {
    400.0
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.viewport_height <= 0.0 || self.viewport_width <= 0.0 {
            return Err(Error::Scenario("viewport must have positive size".to_string()));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id.as_str()) {
                return Err(Error::Scenario(format!("duplicate element id {}", element.id)));
            }
        }
        for step in &self.steps {
            if let Step::Click { id } | Step::Unmount { id } | Step::Detach { id } = step {
                if !seen.contains(id.as_str()) {
                    return Err(Error::Scenario(format!("step '{}' names unknown element", step)));
                }
            }
        }
        Ok(())
    }
}

/// State of the feed after one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    /// None for the initial layout pass
    pub step: Option<Step>,
    pub active: Option<ElementId>,
    pub players: Vec<PlayerReport>,
    pub events: Vec<FeedEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    pub id: ElementId,
    pub state: VisualState,
    pub mounted: bool,
}

struct Mounted {
    element: Arc<ScriptedElement>,
    client: PlaybackClient,
}

pub struct ScenarioRunner {
    scenario: Scenario,
    context: FeedContext,
    players: Vec<Mounted>,
    scroll_top: f64,
    events: broadcast::Receiver<FeedEvent>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario, config: &ArbiterConfig, mute_store: Arc<dyn MuteStore>) -> Self {
        let context = FeedContext::new(config, mute_store);
        let events = context.events().subscribe();
        Self {
            scenario,
            context,
            players: Vec::new(),
            scroll_top: 0.0,
            events,
        }
    }

    pub fn context(&self) -> &FeedContext {
        &self.context
    }

    /// Mount every element, then apply each step in order
    pub async fn run(&mut self) -> Result<Vec<StepReport>> {
        for spec in &self.scenario.elements {
            let bounds = Rect::new(0.0, spec.top, self.scenario.viewport_width, spec.height);
            let element = Arc::new(ScriptedElement::new(bounds));
            element.set_autoplay_blocked(spec.autoplay_blocked);
            let client = PlaybackClient::mount(
                &self.context,
                Some(ElementId::new(spec.id.as_str())),
                element.clone(),
            )?;
            self.players.push(Mounted { element, client });
        }
        info!("Mounted {} players", self.players.len());

        let mut reports = vec![self.settle(0, None).await];
        let steps = self.scenario.steps.clone();
        for (i, step) in steps.into_iter().enumerate() {
            self.apply(&step)?;
            reports.push(self.settle(i + 1, Some(step)).await);
        }
        Ok(reports)
    }

    fn apply(&mut self, step: &Step) -> Result<()> {
        info!("Step: {}", step);
        match step {
            Step::Scroll { to } => self.scroll_top = *to,
            Step::Click { id } => {
                let player = self.player_mut(id)?;
                if let Err(e) = player.client.toggle() {
                    // Clicking an unmounted player is a no-op
                    tracing::debug!("Click ignored: {}", e);
                }
            }
            Step::Suspend => self.context.foreground.suspend(),
            Step::Resume => self.context.foreground.resume(),
            Step::Unmount { id } => self.player_mut(id)?.client.unmount(),
            Step::Detach { id } => self.player_mut(id)?.element.set_bounds(None),
            Step::ToggleMute => {
                self.context.mute.toggle()?;
            }
        }
        Ok(())
    }

    /// Observe, let every client react, and wait for play requests to settle
    async fn settle(&mut self, index: usize, step: Option<Step>) -> StepReport {
        let viewport = Rect::new(
            0.0,
            self.scroll_top,
            self.scenario.viewport_width,
            self.scenario.viewport_height,
        );
        self.context.arbiter.observe(viewport);

        for player in &mut self.players {
            player.client.sync();
        }
        for player in &mut self.players {
            player.client.settle().await;
        }

        let events = drain_events(&mut self.events);
        StepReport {
            index,
            step,
            active: self.context.arbiter.active_id(),
            players: self
                .players
                .iter()
                .map(|p| PlayerReport {
                    id: p.client.id().clone(),
                    state: p.client.visual_state(),
                    mounted: p.client.is_mounted(),
                })
                .collect(),
            events,
        }
    }

    fn player_mut(&mut self, id: &str) -> Result<&mut Mounted> {
        self.players
            .iter_mut()
            .find(|p| p.client.id().as_str() == id)
            .ok_or_else(|| Error::Scenario(format!("unknown element {}", id)))
    }
}

/// Everything buffered on the bus, skipping past any overflow
fn drain_events(rx: &mut broadcast::Receiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(missed)) => {
                warn!("Event report missed {} events", missed);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    events
}
