//! # FeedPlay Common Library
//!
//! Shared code for the FeedPlay playback arbiter and its hosts:
//! - Element identifiers and viewport geometry
//! - Event types (FeedEvent enum) and the EventBus
//! - Configuration loading
//! - Persisted mute preference

pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod id;
pub mod mute;

pub use error::{Error, Result};
pub use geometry::Rect;
pub use id::ElementId;
