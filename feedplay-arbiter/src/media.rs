//! Media element abstraction
//!
//! The host owns the renderable surface and implements [`MediaElement`] for
//! it. The playback client holds the owning `Arc`; the visibility tracker
//! only ever holds a `Weak`.

use feedplay_common::{ElementId, Rect};
use futures::future::BoxFuture;

/// Pending outcome of a play request
///
/// Resolves to `Err(reason)` when the host refuses to start playback,
/// typically because of an autoplay policy.
pub type PlayAttempt = BoxFuture<'static, std::result::Result<(), String>>;

/// A playable, observable surface
///
/// All methods take `&self`; implementations use interior mutability.
pub trait MediaElement: Send + Sync {
    /// Current layout bounds, or None when detached from the render tree
    fn bounds(&self) -> Option<Rect>;

    /// Request playback
    fn play(&self) -> PlayAttempt;

    fn pause(&self);

    fn set_muted(&self, muted: bool);

    /// Called once on registration so hosts can correlate native
    /// observations back to an id
    fn tag(&self, _id: &ElementId) {}
}
