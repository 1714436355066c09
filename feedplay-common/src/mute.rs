//! Persisted mute preference
//!
//! Every playback client reads the same mute flag. The flag is stored
//! through a [`MuteStore`] and broadcast to clients by [`MuteState`].
//! Feeds start muted unless the user has chosen otherwise.

use crate::events::{EventBus, FeedEvent};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Mute value used when nothing has been persisted yet
pub const DEFAULT_MUTED: bool = true;

/// Key-value store for the mute preference
pub trait MuteStore: Send + Sync {
    fn get_muted(&self) -> bool;
    fn set_muted(&self, muted: bool) -> Result<()>;
}

/// In-memory store (tests, ephemeral sessions)
#[derive(Debug)]
pub struct MemoryMuteStore {
    muted: AtomicBool,
}

impl MemoryMuteStore {
    pub fn new(muted: bool) -> Self {
        Self {
            muted: AtomicBool::new(muted),
        }
    }
}

impl Default for MemoryMuteStore {
    fn default() -> Self {
        Self::new(DEFAULT_MUTED)
    }
}

impl MuteStore for MemoryMuteStore {
    fn get_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.muted.store(muted, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Preferences {
    muted: bool,
}

/// TOML-file backed store, persisted across sessions
#[derive(Debug, Clone)]
pub struct FileMuteStore {
    path: PathBuf,
}

impl FileMuteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Preferences> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl MuteStore for FileMuteStore {
    /// Missing or unreadable preference files yield [`DEFAULT_MUTED`]
    fn get_muted(&self) -> bool {
        match self.read() {
            Ok(prefs) => prefs.muted,
            Err(e) => {
                debug!(
                    "No usable mute preference at {} ({}), defaulting to muted",
                    self.path.display(),
                    e
                );
                DEFAULT_MUTED
            }
        }
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(&Preferences { muted })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Shared mute flag broadcast to every playback client
///
/// Cheap to clone; all clones share the same flag and store.
#[derive(Clone)]
pub struct MuteState {
    store: Arc<dyn MuteStore>,
    tx: Arc<watch::Sender<bool>>,
    events: Option<Arc<EventBus>>,
}

impl MuteState {
    /// Create from a store, seeding the flag with the persisted value
    pub fn new(store: Arc<dyn MuteStore>) -> Self {
        let (tx, _) = watch::channel(store.get_muted());
        Self {
            store,
            tx: Arc::new(tx),
            events: None,
        }
    }

    /// Also announce changes on an EventBus
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_muted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that observes every broadcast write
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Broadcast and persist a new value
    ///
    /// Clients see the new value even if persisting it fails.
    pub fn set_muted(&self, muted: bool) -> Result<()> {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != muted;
            *current = muted;
            changed
        });
        if changed {
            if let Some(events) = &self.events {
                events.emit_lossy(FeedEvent::MuteChanged {
                    muted,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        self.store.set_muted(muted).map_err(|e| {
            warn!("Failed to persist mute preference: {}", e);
            e
        })
    }

    /// Flip the flag, returning the new value
    pub fn toggle(&self) -> Result<bool> {
        let muted = !self.is_muted();
        self.set_muted(muted)?;
        Ok(muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_defaults_to_muted() {
        assert!(MemoryMuteStore::default().get_muted());
    }

    #[test]
    fn test_file_store_missing_file_is_muted() {
        let dir = TempDir::new().unwrap();
        let store = FileMuteStore::new(dir.path().join("missing.toml"));
        assert!(store.get_muted());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");

        FileMuteStore::new(&path).set_muted(false).unwrap();

        let reopened = FileMuteStore::new(&path);
        assert!(!reopened.get_muted());
    }

    #[test]
    fn test_file_store_garbage_is_muted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "muted = maybe").unwrap();
        assert!(FileMuteStore::new(&path).get_muted());
    }

    #[test]
    fn test_state_seeds_from_store() {
        let state = MuteState::new(Arc::new(MemoryMuteStore::new(false)));
        assert!(!state.is_muted());
    }

    #[test]
    fn test_toggle_broadcasts_and_persists() {
        let store = Arc::new(MemoryMuteStore::new(true));
        let state = MuteState::new(store.clone());
        let mut rx = state.subscribe();

        assert!(!state.toggle().unwrap());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!store.get_muted());

        // Writing the same value does not wake receivers
        state.set_muted(false).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_change_is_announced_on_event_bus() {
        let bus = Arc::new(EventBus::new(8));
        let mut events = bus.subscribe();
        let state =
            MuteState::new(Arc::new(MemoryMuteStore::default())).with_event_bus(bus.clone());

        state.set_muted(false).unwrap();
        match events.try_recv().unwrap() {
            FeedEvent::MuteChanged { muted, .. } => assert!(!muted),
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
