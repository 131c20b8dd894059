//! Resolving the synchronization service's IPC endpoint.
//!
//! The application bootstrap owns the service process and publishes where to
//! reach it. We resolve the address independently at first use and again on
//! every reconnect attempt, so a service restart under a new socket path is
//! picked up without reloading the extension.
//!
//! Resolution order: `EMBLEM_STATUS_SOCKET` env var, then the endpoint file
//! the bootstrap writes (`~/.emblem/endpoint`), then the default socket.

use std::env;
use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::config;
use crate::error::{EmblemError, Result};

pub const SOCKET_ENV: &str = "EMBLEM_STATUS_SOCKET";
pub const ENDPOINT_FILE: &str = "endpoint";
pub const SOCKET_NAME: &str = "status.sock";

pub fn resolve() -> Result<PathBuf> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let base = config::config_dir().ok_or(EmblemError::EndpointUnresolved)?;
    Ok(resolve_from(&base))
}

/// Endpoint under a given bootstrap directory; split out so tests do not
/// depend on the real home directory.
pub fn resolve_from(base: &Path) -> PathBuf {
    let endpoint_file = base.join(ENDPOINT_FILE);
    if let Ok(contents) = fs::read_to_string(&endpoint_file) {
        let published = contents.trim();
        if !published.is_empty() {
            return PathBuf::from(published);
        }
    }
    base.join(SOCKET_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_file_wins_over_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(ENDPOINT_FILE), "/run/emblem/alt.sock\n")
            .expect("write endpoint");

        assert_eq!(
            resolve_from(dir.path()),
            PathBuf::from("/run/emblem/alt.sock")
        );
    }

    #[test]
    fn empty_endpoint_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(ENDPOINT_FILE), "  \n").expect("write endpoint");

        assert_eq!(resolve_from(dir.path()), dir.path().join(SOCKET_NAME));
    }

    #[test]
    fn missing_endpoint_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(resolve_from(dir.path()), dir.path().join(SOCKET_NAME));
    }
}
