//! The icon-overlay identifier contract.
//!
//! The host shell instantiates one handler per invocation context and calls
//! it synchronously from threads it owns, for every visible icon, on every
//! repaint. Nothing here may perform I/O or wait unboundedly: membership and
//! overlay-info read the cache only, and a miss answers "no" immediately
//! while arming an asynchronous refresh for the next poll.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::arbiter::PriorityArbiter;
use crate::cache::StatusCache;
use crate::client::StatusQueryClient;
use crate::config::IconTheme;
use crate::status::normalize_path;

/// Attribute bits the shell passes alongside a membership query. Carried
/// opaquely; only the directory bit is interpreted today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const DIRECTORY: u32 = 0x10;

    pub fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }
}

/// The per-path yes/no decision of whether this provider wants to badge a
/// given file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Member,
    NotMember,
}

/// Where the shell finds the badge art for a path it agreed to paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayInfo {
    pub image_file: PathBuf,
    pub icon_index: u32,
}

/// The capability set the host shell expects from an icon-overlay
/// identifier. Kept as a trait so the ABI glue and the tests share one
/// seam.
pub trait IconOverlayIdentifier {
    fn is_member_of(&self, path: &Path, attrs: FileAttributes) -> Membership;
    fn overlay_info(&self, path: &Path) -> Option<OverlayInfo>;
    fn priority(&self) -> i32;
}

/// Holds no state of its own: many handler instances share one cache,
/// client, and arbiter within the process.
pub struct OverlayHandler {
    cache: Arc<StatusCache>,
    client: Arc<StatusQueryClient>,
    arbiter: Arc<PriorityArbiter>,
    icons: Arc<IconTheme>,
}

impl OverlayHandler {
    pub fn new(
        cache: Arc<StatusCache>,
        client: Arc<StatusQueryClient>,
        arbiter: Arc<PriorityArbiter>,
        icons: Arc<IconTheme>,
    ) -> Self {
        Self {
            cache,
            client,
            arbiter,
            icons,
        }
    }
}

impl IconOverlayIdentifier for OverlayHandler {
    /// The critical latency path. Answers *Member* only for a non-stale,
    /// badge-worthy entry; anything else is *NotMember* plus a fire-and-forget
    /// refresh so the shell's re-poll has a chance of a hit.
    fn is_member_of(&self, path: &Path, _attrs: FileAttributes) -> Membership {
        if !path.is_absolute() {
            return Membership::NotMember;
        }
        let path = normalize_path(path);

        if let Some(status) = self.cache.get(&path) {
            if status.is_fresh() && status.state.badge_worthy() {
                return Membership::Member;
            }
        }

        self.client.request_refresh(&path);
        Membership::NotMember
    }

    /// Side-effect-free: reads the cached state and maps it through the
    /// configured icon theme. Unknown, transient, stale, and missing entries
    /// paint nothing.
    fn overlay_info(&self, path: &Path) -> Option<OverlayInfo> {
        let status = self.cache.get(&normalize_path(path))?;
        if status.is_stale() {
            return None;
        }
        let mapping = self.icons.mapping(status.state)?;
        Some(OverlayInfo {
            image_file: mapping.image.clone(),
            icon_index: mapping.index,
        })
    }

    fn priority(&self) -> i32 {
        self.arbiter.declared_priority()
    }
}
