//! IPC protocol types and validation for the Emblem status channel.
//!
//! This crate is shared by the shell extension and the synchronization
//! service to prevent schema drift. The service remains the authority on
//! what it reports for a path, but clients reuse the same types to construct
//! valid requests.
//!
//! Framing is one JSON object per line. Newline-delimited messages are
//! self-delimiting, so multiple requests may be pipelined on one connection
//! and responses are correlated by `id` rather than by arrival order.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;
pub const MAX_PATH_BYTES: usize = 4096;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetStatus,
    GetHealth,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Per-path synchronization state as reported on the wire.
///
/// The service never reports a transient "request outstanding" state; that
/// bookkeeping belongs to the querying side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum WireState {
    Synced,
    Syncing,
    Error,
    Ignored,
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusParams {
    pub path: String,
    /// RFC3339 issue timestamp, kept for service-side request logging.
    pub issued_at: String,
}

impl StatusParams {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validate_path(&self.path)?;
        if DateTime::parse_from_rfc3339(&self.issued_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "issued_at must be RFC3339",
            ));
        }
        Ok(())
    }
}

/// The payload of a successful `get_status` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusReport {
    pub path: String,
    pub state: WireState,
}

impl StatusReport {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validate_path(&self.path)
    }
}

pub fn parse_status_params(params: Value) -> Result<StatusParams, ErrorInfo> {
    let params: StatusParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("status params are invalid JSON: {}", err),
        )
    })?;
    params.validate()?;
    Ok(params)
}

pub fn parse_status_report(data: Value) -> Result<StatusReport, ErrorInfo> {
    let report: StatusReport = serde_json::from_value(data).map_err(|err| {
        ErrorInfo::new(
            "invalid_report",
            format!("status report is invalid JSON: {}", err),
        )
    })?;
    report.validate()?;
    Ok(report)
}

fn validate_path(path: &str) -> Result<(), ErrorInfo> {
    if path.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_path", "path is required"));
    }
    if !path.starts_with('/') {
        return Err(ErrorInfo::new("invalid_path", "path must be absolute"));
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(ErrorInfo::new(
            "invalid_path",
            format!("path must be {} bytes or fewer", MAX_PATH_BYTES),
        ));
    }
    if path.contains('\0') {
        return Err(ErrorInfo::new(
            "invalid_path",
            "path must not contain NUL bytes",
        ));
    }
    Ok(())
}
