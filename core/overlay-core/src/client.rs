//! Asynchronous status refresh client.
//!
//! Shell callback threads call [`StatusQueryClient::request_refresh`], which
//! never blocks beyond a bounded lock and a non-blocking queue push. The IPC
//! round trip to the synchronization service happens on a single dedicated
//! worker thread that backfills the [`StatusCache`]; the next shell poll
//! observes the fresh value.
//!
//! Failure posture: on connect/send/parse trouble the channel enters
//! degraded mode with capped exponential backoff. No request is retried;
//! cached best-effort values (or no overlay) stay authoritative until the
//! channel recovers.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use tracing::{debug, warn};

use emblem_status_protocol::{
    parse_status_report, Method, Request, Response, StatusParams, StatusReport, MAX_MESSAGE_BYTES,
    PROTOCOL_VERSION,
};

use crate::cache::StatusCache;
use crate::config::{IconTheme, OverlayConfig};
use crate::endpoint;
use crate::error::{EmblemError, Result};
use crate::status::{normalize_path, PathStatus, SyncState};

const READ_CHUNK_SIZE: usize = 4096;

/// A pending query: at most one outstanding per path; duplicates coalesce
/// into the existing record.
#[derive(Debug, Clone)]
struct OverlayRequest {
    request_id: String,
    issued_at: Instant,
}

impl OverlayRequest {
    fn new() -> Self {
        Self {
            request_id: make_request_id(),
            issued_at: Instant::now(),
        }
    }
}

/// Degraded-mode bookkeeping for the channel. Reads are cheap enough for the
/// shell callback path; writes only happen on the worker.
#[derive(Debug)]
struct ChannelHealth {
    degraded_until: Mutex<Option<Instant>>,
    backoff: Mutex<Duration>,
    floor: Duration,
    ceiling: Duration,
}

impl ChannelHealth {
    fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            degraded_until: Mutex::new(None),
            backoff: Mutex::new(floor),
            floor,
            ceiling,
        }
    }

    fn is_degraded(&self) -> bool {
        match *self.degraded_until.lock() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Enters (or extends) degraded mode and returns the applied delay.
    fn mark_degraded(&self) -> Duration {
        let mut backoff = self.backoff.lock();
        let applied = *backoff;
        *self.degraded_until.lock() = Some(Instant::now() + applied);
        *backoff = (*backoff * 2).min(self.ceiling);
        applied
    }

    fn mark_healthy(&self) {
        *self.degraded_until.lock() = None;
        *self.backoff.lock() = self.floor;
    }
}

pub struct StatusQueryClient {
    cache: Arc<StatusCache>,
    icons: Arc<IconTheme>,
    pending: Mutex<HashMap<PathBuf, OverlayRequest>>,
    health: ChannelHealth,
    tx: SyncSender<PathBuf>,
    drop_bound: Duration,
    ttl: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    endpoint_override: Option<PathBuf>,
}

impl StatusQueryClient {
    /// Spawns the worker and returns the shared client handle. The worker
    /// lives for the rest of the process, matching the shell's model of a
    /// loaded extension.
    pub fn spawn(cache: Arc<StatusCache>, icons: Arc<IconTheme>, config: &OverlayConfig) -> Arc<Self> {
        Self::spawn_with_endpoint(cache, icons, config, None)
    }

    /// Same as [`spawn`](Self::spawn) but pinned to a fixed socket path,
    /// bypassing endpoint resolution. Used by tests and `emblemctl`.
    pub fn spawn_with_endpoint(
        cache: Arc<StatusCache>,
        icons: Arc<IconTheme>,
        config: &OverlayConfig,
        endpoint_override: Option<PathBuf>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::sync_channel(config.queue_depth);
        let client = Arc::new(Self {
            cache,
            icons,
            pending: Mutex::new(HashMap::new()),
            health: ChannelHealth::new(config.backoff_floor(), config.backoff_ceiling()),
            tx,
            drop_bound: config.request_drop_bound(),
            ttl: config.ttl(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            endpoint_override,
        });

        let worker = Arc::clone(&client);
        if let Err(err) = thread::Builder::new()
            .name("emblem-status-query".to_string())
            .spawn(move || worker.run(rx))
        {
            warn!(error = %err, "Failed to spawn status query worker");
        }

        client
    }

    /// Enqueues an asynchronous refresh for `path` and returns immediately.
    ///
    /// Coalesces with any outstanding request for the same path, skips work
    /// while the channel is degraded, and drops the request (to be re-armed
    /// by the next shell poll) if the bounded queue is full.
    pub fn request_refresh(&self, path: &Path) {
        let path = normalize_path(path);
        if self.health.is_degraded() {
            return;
        }

        {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.get(&path) {
                if existing.issued_at.elapsed() <= self.drop_bound {
                    return;
                }
            }
            pending.insert(path.clone(), OverlayRequest::new());
        }

        self.cache.note_pending(&path);

        if let Err(err) = self.tx.try_send(path.clone()) {
            self.pending.lock().remove(&path);
            match err {
                TrySendError::Full(_) => {
                    debug!(path = %path.display(), "Refresh queue full; dropping request")
                }
                TrySendError::Disconnected(_) => {
                    warn!(path = %path.display(), "Refresh worker gone; dropping request")
                }
            }
        }
    }

    /// The bootstrap-facing "is the service reachable" signal.
    pub fn service_reachable(&self) -> bool {
        !self.health.is_degraded()
    }

    /// Number of refreshes currently in flight (or queued).
    pub fn outstanding_requests(&self) -> usize {
        self.pending.lock().len()
    }

    fn run(self: Arc<Self>, rx: Receiver<PathBuf>) {
        let mut conn: Option<UnixStream> = None;

        while let Ok(path) = rx.recv() {
            self.expire_stale_pending();

            let request_id = match self.pending.lock().get(&path) {
                Some(request) => request.request_id.clone(),
                None => continue, // dropped or resolved while queued
            };

            if self.health.is_degraded() {
                self.pending.lock().remove(&path);
                continue;
            }

            match self.exchange(&mut conn, &path, &request_id) {
                Ok((response_id, report)) => {
                    self.health.mark_healthy();
                    self.apply_report(response_id.as_deref(), report);
                }
                Err(err) => {
                    conn = None;
                    self.pending.lock().remove(&path);
                    let backoff = self.health.mark_degraded();
                    warn!(
                        error = %err,
                        path = %path.display(),
                        backoff_ms = backoff.as_millis() as u64,
                        "Status channel degraded"
                    );
                }
            }
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        let socket = match &self.endpoint_override {
            Some(path) => path.clone(),
            None => endpoint::resolve()?,
        };
        let stream = UnixStream::connect(&socket).map_err(|err| EmblemError::ChannelUnavailable {
            details: format!("connect to {} failed: {}", socket.display(), err),
        })?;
        let _ = stream.set_read_timeout(Some(self.read_timeout));
        let _ = stream.set_write_timeout(Some(self.write_timeout));
        Ok(stream)
    }

    /// One request/response round trip on the persistent connection,
    /// reconnecting first if necessary.
    fn exchange(
        &self,
        conn: &mut Option<UnixStream>,
        path: &Path,
        request_id: &str,
    ) -> Result<(Option<String>, StatusReport)> {
        if conn.is_none() {
            *conn = Some(self.connect()?);
        }
        let Some(stream) = conn.as_mut() else {
            return Err(EmblemError::ChannelUnavailable {
                details: "no connection".to_string(),
            });
        };

        let params = StatusParams {
            path: path.to_string_lossy().into_owned(),
            issued_at: Utc::now().to_rfc3339(),
        };
        let request = Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::GetStatus,
            id: Some(request_id.to_string()),
            params: Some(serde_json::to_value(params).map_err(|err| EmblemError::Json {
                context: "serialize status params".to_string(),
                source: err,
            })?),
        };

        serde_json::to_writer(&mut *stream, &request).map_err(|err| {
            EmblemError::ChannelUnavailable {
                details: format!("write request failed: {}", err),
            }
        })?;
        stream
            .write_all(b"\n")
            .and_then(|_| stream.flush())
            .map_err(|err| EmblemError::ChannelUnavailable {
                details: format!("flush request failed: {}", err),
            })?;

        let line = read_line(stream, path)?;
        let response: Response =
            serde_json::from_slice(&line).map_err(|err| EmblemError::Protocol {
                details: format!("response was not valid JSON: {}", err),
            })?;

        if !response.ok {
            let details = response
                .error
                .map(|err| format!("{}: {}", err.code, err.message))
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(EmblemError::Protocol { details });
        }

        let data = response.data.ok_or_else(|| EmblemError::Protocol {
            details: "ok response carried no data".to_string(),
        })?;
        let report = parse_status_report(data).map_err(|err| EmblemError::Protocol {
            details: format!("{}: {}", err.code, err.message),
        })?;

        Ok((response.id, report))
    }

    /// Writes the report into the cache and resolves the matching pending
    /// request. A report whose id no longer matches (superseded request, or
    /// a path nobody cares about anymore) is still cached: stale interest is
    /// harmless and the entry ages out naturally.
    fn apply_report(&self, response_id: Option<&str>, report: StatusReport) {
        let path = normalize_path(Path::new(&report.path));
        let state = SyncState::from_wire(report.state);
        let icon_index = self.icons.icon_index(state);
        self.cache
            .put(PathStatus::new(path.clone(), state, icon_index, self.ttl));

        let mut pending = self.pending.lock();
        let matches = pending
            .get(&path)
            .map(|request| Some(request.request_id.as_str()) == response_id)
            .unwrap_or(false);
        if matches {
            pending.remove(&path);
        } else {
            debug!(path = %path.display(), "Cached response for a request no longer outstanding");
        }
    }

    fn expire_stale_pending(&self) {
        let drop_bound = self.drop_bound;
        self.pending.lock().retain(|path, request| {
            let keep = request.issued_at.elapsed() <= drop_bound;
            if !keep {
                debug!(path = %path.display(), "Abandoning refresh past the drop bound");
            }
            keep
        });
    }
}

fn read_line(stream: &mut UnixStream, path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(EmblemError::ChannelUnavailable {
                    details: "service closed the connection".to_string(),
                })
            }
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
                return Err(EmblemError::RequestTimeout {
                    path: path.to_path_buf(),
                })
            }
            Err(err) => {
                return Err(EmblemError::Io {
                    context: "read response".to_string(),
                    source: err,
                })
            }
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    if let Some(index) = newline_index {
        if buffer[index + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
            warn!("Extra bytes after response newline; ignoring trailing data");
        }
        buffer.truncate(index);
    }

    if buffer.is_empty() {
        return Err(EmblemError::Protocol {
            details: "response line was empty".to_string(),
        });
    }

    Ok(buffer)
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "req-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}
