//! # FeedPlay Arbiter (feedplay-arbiter)
//!
//! Decides which of many independently mounted media players in a feed is
//! allowed to play.
//!
//! **Architecture:** decisions flow one way and intents flow the other.
//! - [`tracker::VisibilityTracker`] measures viewport intersection ratios
//! - [`engine::ArbitrationEngine`] turns ratios and manual intents into one active id
//! - [`client::PlaybackClient`] drives a single media element from that decision
//!
//! [`arbiter::PlaybackArbiter`] wires tracker and engine together behind a
//! cloneable handle. Each feed constructs its own; nothing here is global.

pub mod arbiter;
pub mod client;
pub mod context;
pub mod engine;
pub mod error;
pub mod foreground;
pub mod media;
pub mod scenario;
pub mod tracker;

pub use arbiter::{ActiveIdReceiver, PlaybackArbiter};
pub use client::{PlaybackClient, VisualState};
pub use context::FeedContext;
pub use error::{Error, Result};
pub use media::{MediaElement, PlayAttempt};
