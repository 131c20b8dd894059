//! # emblem-core
//!
//! Core library for Emblem's file-browser integration: a per-path status
//! cache, an asynchronous query client for the synchronization service, and
//! the icon-overlay handler contract the shell boundary exposes.
//!
//! ## Design principles
//!
//! - **The shell never waits.** Handler operations read the cache and
//!   nothing else; all IPC happens on a dedicated worker thread.
//! - **Graceful degradation.** A missing, hung, or confused service means
//!   badges lag or disappear, never that the file browser stalls.
//! - **Explicit sharing.** Handler instances hold `Arc`s handed out by one
//!   [`runtime::OverlayRuntime`]; there are no implicit globals here.
//! - **ABI-agnostic.** The shell's extension ABI lives in `emblem-shell`;
//!   everything in this crate is plain Rust.

pub mod arbiter;
pub mod cache;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod runtime;
pub mod status;

pub use arbiter::{PriorityArbiter, ProviderDescriptor, LOWEST_PRIORITY, TOP_PRIORITY};
pub use cache::StatusCache;
pub use client::StatusQueryClient;
pub use config::{IconMapping, IconTheme, OverlayConfig};
pub use error::{EmblemError, Result};
pub use handler::{FileAttributes, IconOverlayIdentifier, Membership, OverlayHandler, OverlayInfo};
pub use runtime::{OverlayRuntime, PROVIDER_ID};
pub use status::{normalize_path, PathStatus, SyncState};
