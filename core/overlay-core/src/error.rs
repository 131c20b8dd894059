//! Error types for emblem-core operations.
//!
//! None of these ever cross the shell-facing contract: every failure there
//! degrades to "no overlay". These exist for logging and for the CLI.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EmblemError {
    #[error("Status channel unavailable: {details}")]
    ChannelUnavailable { details: String },

    #[error("Status request timed out for {}", path.display())]
    RequestTimeout { path: PathBuf },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Status endpoint could not be resolved")]
    EndpointUnresolved,
}

pub type Result<T> = std::result::Result<T, EmblemError>;
