//! Per-path synchronization status types.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use emblem_status_protocol::WireState;
use serde::{Deserialize, Serialize};

/// Synchronization knowledge for one filesystem path.
///
/// `Queued` is an internal transient meaning "refresh outstanding"; it is
/// never surfaced to the shell as a final answer and reads externally as
/// `Unknown` (no badge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Unknown,
    Queued,
    Synced,
    Syncing,
    Error,
    Ignored,
}

impl SyncState {
    /// States worth painting a badge for.
    pub fn badge_worthy(self) -> bool {
        matches!(
            self,
            SyncState::Synced | SyncState::Syncing | SyncState::Error | SyncState::Ignored
        )
    }

    /// Rank used when one path is ambiguously described by several states.
    /// Lower wins: a conflict badge must not be hidden behind a synced badge.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            SyncState::Error => 0,
            SyncState::Syncing => 1,
            SyncState::Synced => 2,
            SyncState::Ignored => 3,
            SyncState::Queued => 4,
            SyncState::Unknown => 5,
        }
    }

    pub fn from_wire(state: WireState) -> Self {
        match state {
            WireState::Synced => SyncState::Synced,
            WireState::Syncing => SyncState::Syncing,
            WireState::Error => SyncState::Error,
            WireState::Ignored => SyncState::Ignored,
            WireState::Unknown => SyncState::Unknown,
        }
    }
}

/// Last-known sync state for one path, with its validity window.
///
/// An entry older than `ttl` is stale: still servable as a best-effort
/// answer while a refresh is in flight, but never presented as fresh.
#[derive(Debug, Clone)]
pub struct PathStatus {
    pub path: PathBuf,
    pub state: SyncState,
    pub icon_index: u32,
    pub last_updated: Instant,
    pub ttl: Duration,
}

impl PathStatus {
    pub fn new(path: PathBuf, state: SyncState, icon_index: u32, ttl: Duration) -> Self {
        Self {
            path,
            state,
            icon_index,
            last_updated: Instant::now(),
            ttl,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.last_updated.elapsed() > self.ttl
    }

    pub fn is_fresh(&self) -> bool {
        !self.is_stale()
    }
}

/// Normalizes a path for cache lookup.
///
/// Strips trailing slashes (except for root "/") so that "/project" and
/// "/project/" hit the same entry. Case is preserved; comparison follows the
/// host filesystem's semantics.
pub fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "/" {
        return PathBuf::from("/");
    }
    PathBuf::from(raw.trim_end_matches('/'))
}
