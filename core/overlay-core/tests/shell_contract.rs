//! End-to-end checks of the overlay handler contract against a fake
//! synchronization service, including latency injection and channel failure.

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use emblem_core::{
    FileAttributes, IconOverlayIdentifier, Membership, OverlayConfig, OverlayRuntime, SyncState,
    TOP_PRIORITY,
};
use emblem_status_protocol::{Request, Response};

fn test_config(ttl_ms: u64) -> OverlayConfig {
    OverlayConfig {
        ttl_ms,
        backoff_floor_ms: 2_000,
        read_timeout_ms: 300,
        write_timeout_ms: 300,
        ..OverlayConfig::default()
    }
}

/// Fake synchronization service: accepts connections for ten seconds and
/// answers each request line via `reply_for`. Reconnections are served.
fn spawn_fake_service<F>(listener: UnixListener, reply_for: F)
where
    F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
{
    listener.set_nonblocking(true).expect("nonblocking");
    let reply_for = Arc::new(reply_for);
    thread::spawn(move || {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(10) {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false).expect("blocking stream");
                    let reply_for = Arc::clone(&reply_for);
                    thread::spawn(move || serve_connection(stream, reply_for));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });
}

fn serve_connection(
    mut stream: std::os::unix::net::UnixStream,
    reply_for: Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(index) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=index).collect();
                    let Ok(request) = serde_json::from_slice::<Request>(&line[..line.len() - 1])
                    else {
                        continue;
                    };
                    match reply_for(&request) {
                        Some(mut payload) => {
                            payload.push('\n');
                            if stream.write_all(payload.as_bytes()).is_err() {
                                return;
                            }
                        }
                        None => return, // simulate a hung service
                    }
                }
            }
        }
    }
}

fn requested_path(request: &Request) -> String {
    request
        .params
        .as_ref()
        .and_then(|p| p.get("path"))
        .and_then(|p| p.as_str())
        .unwrap_or("/unknown")
        .to_string()
}

fn ok_reply(request: &Request, state: &str) -> String {
    serde_json::to_string(&Response::ok(
        request.id.clone(),
        serde_json::json!({"path": requested_path(request), "state": state}),
    ))
    .expect("encode reply")
}

fn wait_for<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn unqueried_paths_decline_within_bound_despite_slow_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("status.sock");
    let listener = UnixListener::bind(&socket).expect("bind");
    spawn_fake_service(listener, |request| {
        // Arbitrary injected latency: slower than any acceptable shell call.
        thread::sleep(Duration::from_millis(250));
        Some(ok_reply(request, "synced"))
    });

    let runtime = OverlayRuntime::init_with_endpoint(test_config(10_000), Some(socket));
    let handler = runtime.new_handler();

    for i in 0..50 {
        let path = format!("/library/never-seen-{}.txt", i);
        let start = Instant::now();
        let verdict = handler.is_member_of(Path::new(&path), FileAttributes::default());
        let elapsed = start.elapsed();
        assert_eq!(verdict, Membership::NotMember);
        assert!(
            elapsed < Duration::from_millis(50),
            "membership call took {:?}; the shell would stall",
            elapsed
        );
    }
}

#[test]
fn report_docx_scenario_badges_on_second_poll() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("status.sock");
    let listener = UnixListener::bind(&socket).expect("bind");
    spawn_fake_service(listener, |request| {
        thread::sleep(Duration::from_millis(50));
        Some(ok_reply(request, "syncing"))
    });

    let runtime = OverlayRuntime::init_with_endpoint(test_config(10_000), Some(socket));
    let handler = runtime.new_handler();
    let path = Path::new("/docs/report.docx");

    // First poll: no cache entry, decline and arm the refresh.
    assert_eq!(
        handler.is_member_of(path, FileAttributes::default()),
        Membership::NotMember
    );

    // The shell re-polls on repaint; within the TTL the answer flips.
    assert!(wait_for(Duration::from_secs(2), || {
        handler.is_member_of(path, FileAttributes::default()) == Membership::Member
    }));

    let info = handler.overlay_info(path).expect("overlay info");
    let expected = runtime
        .config()
        .icons
        .get(&SyncState::Syncing)
        .expect("syncing mapping");
    assert_eq!(info.icon_index, expected.index);
    assert_eq!(info.image_file, expected.image);
}

#[test]
fn ttl_expiry_without_refresh_yields_no_overlay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("status.sock");
    let listener = UnixListener::bind(&socket).expect("bind");
    let answered = Arc::new(AtomicUsize::new(0));
    let answered_count = Arc::clone(&answered);
    spawn_fake_service(listener, move |request| {
        // Answer the first request, then hang so nothing refreshes.
        if answered_count.fetch_add(1, Ordering::SeqCst) == 0 {
            Some(ok_reply(request, "synced"))
        } else {
            None
        }
    });

    let runtime = OverlayRuntime::init_with_endpoint(test_config(150), Some(socket));
    let handler = runtime.new_handler();
    let path = Path::new("/repo/expiring.txt");

    handler.is_member_of(path, FileAttributes::default());
    assert!(wait_for(Duration::from_secs(2), || {
        handler.is_member_of(path, FileAttributes::default()) == Membership::Member
    }));

    thread::sleep(Duration::from_millis(300));
    assert!(
        handler.overlay_info(path).is_none(),
        "expired entries must not be served as fresh"
    );
    assert_eq!(
        handler.is_member_of(path, FileAttributes::default()),
        Membership::NotMember
    );
}

#[test]
fn disconnected_channel_never_slows_membership_or_priority() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("status.sock"); // nothing ever listens

    let runtime = OverlayRuntime::init_with_endpoint(test_config(10_000), Some(socket));
    let handler = runtime.new_handler();

    handler.is_member_of(Path::new("/repo/first.txt"), FileAttributes::default());
    assert!(wait_for(Duration::from_secs(2), || {
        !runtime.service_reachable()
    }));

    for i in 0..50 {
        let path = format!("/repo/degraded-{}.txt", i);
        let start = Instant::now();
        let verdict = handler.is_member_of(Path::new(&path), FileAttributes::default());
        assert_eq!(verdict, Membership::NotMember);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    // Priority reads no cache or channel state.
    assert_eq!(handler.priority(), TOP_PRIORITY);
}

#[test]
fn concurrent_shell_threads_keep_one_request_outstanding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("status.sock");
    let listener = UnixListener::bind(&socket).expect("bind");
    let served = Arc::new(AtomicUsize::new(0));
    let served_count = Arc::clone(&served);
    spawn_fake_service(listener, move |request| {
        served_count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        Some(ok_reply(request, "synced"))
    });

    let runtime = OverlayRuntime::init_with_endpoint(test_config(10_000), Some(socket));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let handler = runtime.new_handler();
                for _ in 0..20 {
                    handler.is_member_of(Path::new("/repo/hot.txt"), FileAttributes::default());
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("shell thread");
    }

    assert!(runtime.client().outstanding_requests() <= 1);
    assert!(wait_for(Duration::from_secs(2), || {
        runtime.new_handler().is_member_of(
            Path::new("/repo/hot.txt"),
            FileAttributes::default(),
        ) == Membership::Member
    }));
    assert_eq!(
        served.load(Ordering::SeqCst),
        1,
        "duplicate membership tests must coalesce into one wire request"
    );
}

#[test]
fn many_handler_instances_report_identical_priority() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runtime = OverlayRuntime::init_with_endpoint(
        test_config(10_000),
        Some(dir.path().join("status.sock")),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || runtime.new_handler().priority())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("priority thread"), TOP_PRIORITY);
    }
}
