//! One-shot probes against the synchronization service.
//!
//! Unlike the in-shell query client these connect per request: a diagnostic
//! tool wants the connect error, not a silently degraded channel.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use emblem_core::{endpoint, EmblemError, Result};
use emblem_status_protocol::{
    parse_status_report, Method, Request, Response, StatusParams, WireState, MAX_MESSAGE_BYTES,
    PROTOCOL_VERSION,
};

const PROBE_TIMEOUT_MS: u64 = 1_500;

pub fn query_status(socket: Option<&Path>, path: &Path) -> Result<WireState> {
    let params = StatusParams {
        path: path.to_string_lossy().into_owned(),
        issued_at: Utc::now().to_rfc3339(),
    };
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::GetStatus,
        id: Some("emblemctl-status".to_string()),
        params: Some(serde_json::to_value(params).map_err(|err| EmblemError::Json {
            context: "serialize status params".to_string(),
            source: err,
        })?),
    };

    let response = send_request(socket, request)?;
    let data = expect_ok(response)?;
    let report = parse_status_report(data).map_err(|err| EmblemError::Protocol {
        details: format!("{}: {}", err.code, err.message),
    })?;
    Ok(report.state)
}

pub fn query_health(socket: Option<&Path>) -> Result<Value> {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::GetHealth,
        id: Some("emblemctl-health".to_string()),
        params: None,
    };
    let response = send_request(socket, request)?;
    expect_ok(response)
}

fn expect_ok(response: Response) -> Result<Value> {
    if !response.ok {
        let details = response
            .error
            .map(|err| format!("{}: {}", err.code, err.message))
            .unwrap_or_else(|| "service reported failure".to_string());
        return Err(EmblemError::Protocol { details });
    }
    response.data.ok_or_else(|| EmblemError::Protocol {
        details: "ok response carried no data".to_string(),
    })
}

fn resolve_socket(socket: Option<&Path>) -> Result<PathBuf> {
    match socket {
        Some(path) => Ok(path.to_path_buf()),
        None => endpoint::resolve(),
    }
}

fn send_request(socket: Option<&Path>, request: Request) -> Result<Response> {
    let socket = resolve_socket(socket)?;
    let mut stream =
        UnixStream::connect(&socket).map_err(|err| EmblemError::ChannelUnavailable {
            details: format!("connect to {} failed: {}", socket.display(), err),
        })?;
    let timeout = Some(Duration::from_millis(PROBE_TIMEOUT_MS));
    let _ = stream.set_read_timeout(timeout);
    let _ = stream.set_write_timeout(timeout);

    serde_json::to_writer(&mut stream, &request).map_err(|err| {
        EmblemError::ChannelUnavailable {
            details: format!("write request failed: {}", err),
        }
    })?;
    stream
        .write_all(b"\n")
        .and_then(|_| stream.flush())
        .map_err(|err| EmblemError::Io {
            context: "flush request".to_string(),
            source: err,
        })?;

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_MESSAGE_BYTES {
                    return Err(EmblemError::Protocol {
                        details: "response exceeded maximum size".to_string(),
                    });
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(EmblemError::ChannelUnavailable {
                    details: "timed out waiting for service response".to_string(),
                });
            }
            Err(err) => {
                return Err(EmblemError::Io {
                    context: "read response".to_string(),
                    source: err,
                })
            }
        }
    }

    let end = buffer
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(buffer.len());
    if end == 0 {
        return Err(EmblemError::Protocol {
            details: "service response was empty".to_string(),
        });
    }

    serde_json::from_slice(&buffer[..end]).map_err(|err| EmblemError::Protocol {
        details: format!("response was not valid JSON: {}", err),
    })
}
