//! Overlay configuration loading.
//!
//! Read once at process attach from `~/.emblem/overlay.json`. A missing or
//! corrupt file degrades to compiled defaults with a warning; the shell
//! extension must come up regardless of what is on disk.
//!
//! The state-to-icon mapping lives here rather than in code: which sync
//! states map to which overlay resources is deployment policy, not protocol.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::status::SyncState;

pub const CONFIG_FILE: &str = "overlay.json";
pub const CONFIG_DIR: &str = ".emblem";

/// One overlay image resource: the file holding the badge art and the index
/// of this badge within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconMapping {
    pub image: PathBuf,
    pub index: u32,
}

static DEFAULT_ICONS: Lazy<BTreeMap<SyncState, IconMapping>> = Lazy::new(|| {
    let image = PathBuf::from("overlays/emblem-badges.icns");
    BTreeMap::from([
        (
            SyncState::Synced,
            IconMapping {
                image: image.clone(),
                index: 0,
            },
        ),
        (
            SyncState::Syncing,
            IconMapping {
                image: image.clone(),
                index: 1,
            },
        ),
        (
            SyncState::Error,
            IconMapping {
                image: image.clone(),
                index: 2,
            },
        ),
        (
            SyncState::Ignored,
            IconMapping { image, index: 3 },
        ),
    ])
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Validity window for cache entries, in milliseconds.
    pub ttl_ms: u64,
    /// Cache capacity before LRU eviction.
    pub max_entries: usize,
    /// Bounded depth of the refresh queue between shell threads and the
    /// query worker. Overflow drops the request; the next poll re-arms it.
    pub queue_depth: usize,
    /// Outstanding refreshes older than this are abandoned.
    pub request_drop_bound_ms: u64,
    /// First retry delay after the channel degrades.
    pub backoff_floor_ms: u64,
    /// Retry delay ceiling.
    pub backoff_ceiling_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// State-to-badge mapping. States absent here (notably `unknown` and
    /// `queued`) paint no overlay.
    pub icons: BTreeMap<SyncState, IconMapping>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            max_entries: 32_768,
            queue_depth: 512,
            request_drop_bound_ms: 5_000,
            backoff_floor_ms: 250,
            backoff_ceiling_ms: 30_000,
            read_timeout_ms: 600,
            write_timeout_ms: 600,
            icons: DEFAULT_ICONS.clone(),
        }
    }
}

impl OverlayConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn request_drop_bound(&self) -> Duration {
        Duration::from_millis(self.request_drop_bound_ms)
    }

    pub fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Loads from the default location, falling back to defaults.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("Home directory not found; using default overlay config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Failed to read overlay config; using defaults");
                return Self::default();
            }
        };

        match serde_json::from_slice(&data) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Overlay config is malformed; using defaults");
                Self::default()
            }
        }
    }
}

/// The state-to-icon mapping handed to handlers, immutable after attach.
#[derive(Debug, Clone)]
pub struct IconTheme {
    mappings: BTreeMap<SyncState, IconMapping>,
}

impl IconTheme {
    pub fn new(mappings: BTreeMap<SyncState, IconMapping>) -> Self {
        Self { mappings }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.icons.clone())
    }

    pub fn mapping(&self, state: SyncState) -> Option<&IconMapping> {
        self.mappings.get(&state)
    }

    /// Icon index for a state, for entries that cache it inline.
    pub fn icon_index(&self, state: SyncState) -> u32 {
        self.mappings.get(&state).map(|m| m.index).unwrap_or(0)
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}
