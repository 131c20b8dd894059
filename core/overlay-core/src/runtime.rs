//! Process-wide shared services behind every handler instance.
//!
//! The shell may create many handler objects in one process; all of them
//! must observe the same cache, the same query channel, and the same
//! declared priority. That sharing is explicit: the boundary glue holds one
//! `Arc<OverlayRuntime>` and hands clones of its parts to each handler at
//! construction.

use std::path::PathBuf;
use std::sync::Arc;

use crate::arbiter::{PriorityArbiter, ProviderDescriptor, TOP_PRIORITY};
use crate::cache::StatusCache;
use crate::client::StatusQueryClient;
use crate::config::{IconTheme, OverlayConfig};
use crate::handler::OverlayHandler;

pub const PROVIDER_ID: &str = "emblem-sync-status";

pub struct OverlayRuntime {
    config: OverlayConfig,
    cache: Arc<StatusCache>,
    client: Arc<StatusQueryClient>,
    arbiter: Arc<PriorityArbiter>,
    icons: Arc<IconTheme>,
}

impl OverlayRuntime {
    pub fn init(config: OverlayConfig) -> Arc<Self> {
        Self::init_with_endpoint(config, None)
    }

    /// Pins the service endpoint instead of resolving it; for tests and the
    /// diagnostic CLI.
    pub fn init_with_endpoint(config: OverlayConfig, endpoint: Option<PathBuf>) -> Arc<Self> {
        let cache = Arc::new(StatusCache::new(config.max_entries, config.ttl()));
        let icons = Arc::new(IconTheme::from_config(&config));
        let client = StatusQueryClient::spawn_with_endpoint(
            Arc::clone(&cache),
            Arc::clone(&icons),
            &config,
            endpoint,
        );
        let arbiter = Arc::new(PriorityArbiter::new(ProviderDescriptor::new(
            PROVIDER_ID,
            TOP_PRIORITY,
        )));

        Arc::new(Self {
            config,
            cache,
            client,
            arbiter,
            icons,
        })
    }

    /// A fresh handler sharing this runtime's cache, client, and arbiter.
    pub fn new_handler(&self) -> OverlayHandler {
        OverlayHandler::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.client),
            Arc::clone(&self.arbiter),
            Arc::clone(&self.icons),
        )
    }

    pub fn service_reachable(&self) -> bool {
        self.client.service_reachable()
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<StatusQueryClient> {
        &self.client
    }

    pub fn arbiter(&self) -> &Arc<PriorityArbiter> {
        &self.arbiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::IconOverlayIdentifier;

    #[test]
    fn handlers_share_one_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = OverlayRuntime::init_with_endpoint(
            OverlayConfig::default(),
            Some(dir.path().join("status.sock")),
        );
        let a = runtime.new_handler();
        let b = runtime.new_handler();

        // Both handlers read the runtime cache; seed through it directly.
        runtime.cache().put(crate::status::PathStatus::new(
            PathBuf::from("/repo/shared.txt"),
            crate::status::SyncState::Synced,
            0,
            std::time::Duration::from_secs(10),
        ));

        use crate::handler::FileAttributes;
        use std::path::Path;
        assert_eq!(
            a.is_member_of(Path::new("/repo/shared.txt"), FileAttributes::default()),
            crate::handler::Membership::Member
        );
        assert_eq!(
            b.is_member_of(Path::new("/repo/shared.txt"), FileAttributes::default()),
            crate::handler::Membership::Member
        );
    }

    #[test]
    fn priority_constant_across_many_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = OverlayRuntime::init_with_endpoint(
            OverlayConfig::default(),
            Some(dir.path().join("status.sock")),
        );
        let priorities: Vec<i32> = (0..64).map(|_| runtime.new_handler().priority()).collect();
        assert!(priorities.iter().all(|p| *p == TOP_PRIORITY));
    }
}
