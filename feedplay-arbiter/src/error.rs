//! Error types for feedplay-arbiter
//!
//! Nothing in arbitration is fatal. Callers log these and degrade to
//! "no element is playing".

use feedplay_common::ElementId;
use thiserror::Error;

/// Main error type for feedplay-arbiter
#[derive(Error, Debug)]
pub enum Error {
    /// Operation referenced an element that is not (or no longer) registered
    #[error("Stale registration: {0}")]
    StaleRegistration(ElementId),

    /// Another mounted element already uses this id
    #[error("Duplicate element id: {0}")]
    DuplicateId(ElementId),

    /// The media element refused to start (usually autoplay policy)
    #[error("Playback rejected for {id}: {reason}")]
    PlaybackRejected { id: ElementId, reason: String },

    /// Scenario script is malformed or references unknown elements
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors (scenario files)
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Errors from shared configuration and preference handling
    #[error(transparent)]
    Common(#[from] feedplay_common::Error),
}

/// Convenience Result type using feedplay-arbiter Error
pub type Result<T> = std::result::Result<T, Error>;
