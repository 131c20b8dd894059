//! # emblem-shell
//!
//! Shell-facing boundary for the Emblem icon-overlay handler.
//!
//! The host shell loads this library into its own process and drives it
//! through a C ABI: attach once, construct handler objects per invocation
//! context, then call the three overlay operations synchronously from shell
//! threads. Everything here translates between that ABI and `emblem-core`,
//! contains panics, and maps every failure to the shell's tri-state decline
//! so a misbehaving extension can never take the file browser down.
//!
//! Reference counting and interface dispatch are the host ABI's business;
//! internally there is only an `Arc`-shared runtime and plain Rust objects.

pub mod logging;
pub mod verdict;

use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use emblem_core::{
    FileAttributes, IconOverlayIdentifier, OverlayConfig, OverlayHandler, OverlayRuntime,
    LOWEST_PRIORITY,
};
use tracing::warn;

pub use verdict::ShellVerdict;

static RUNTIME: OnceLock<Arc<OverlayRuntime>> = OnceLock::new();

fn runtime() -> Option<&'static Arc<OverlayRuntime>> {
    RUNTIME.get()
}

/// Installs the process-wide runtime. First caller wins; later calls are
/// no-ops, which is what the shell's repeated-attach behavior needs.
fn install_runtime(runtime: Arc<OverlayRuntime>) -> bool {
    RUNTIME.set(runtime).is_ok()
}

/// Process attach: initialize logging and the shared runtime. Safe to call
/// more than once.
#[no_mangle]
pub extern "C" fn emblem_shell_attach() -> i32 {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        logging::init();
        if runtime().is_none() {
            install_runtime(OverlayRuntime::init(OverlayConfig::load()));
        }
        ShellVerdict::Participate
    }));
    outcome.unwrap_or(ShellVerdict::Indeterminate).code()
}

/// Constructs one handler instance sharing the process-wide cache, client,
/// and arbiter. Returns null before attach. Free with
/// [`emblem_handler_free`].
#[no_mangle]
pub extern "C" fn emblem_handler_new() -> *mut OverlayHandler {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        runtime().map(|rt| Box::into_raw(Box::new(rt.new_handler())))
    }));
    match outcome {
        Ok(Some(handler)) => handler,
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
/// `handler` must be a pointer returned by [`emblem_handler_new`] that has
/// not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn emblem_handler_free(handler: *mut OverlayHandler) {
    if !handler.is_null() {
        drop(Box::from_raw(handler));
    }
}

/// Membership test: 0 = paint the badge, 1 = decline, -1 = indeterminate
/// (treated by the shell as decline).
///
/// # Safety
/// `handler` must be a live pointer from [`emblem_handler_new`]; `path` must
/// be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn emblem_is_member_of(
    handler: *const OverlayHandler,
    path: *const c_char,
    attrs: u32,
) -> i32 {
    let Some((handler, path)) = handler_and_path(handler, path) else {
        return ShellVerdict::Indeterminate.code();
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        ShellVerdict::from(handler.is_member_of(path, FileAttributes(attrs)))
    }));
    outcome.unwrap_or(ShellVerdict::Indeterminate).code()
}

/// Overlay info: on a participate verdict, writes the NUL-terminated image
/// path into `image_buf` and the badge index into `icon_index`.
///
/// # Safety
/// `handler` must be a live pointer from [`emblem_handler_new`]; `path` must
/// be NUL-terminated; `image_buf` must point to `image_buf_len` writable
/// bytes; `icon_index` must be writable.
#[no_mangle]
pub unsafe extern "C" fn emblem_overlay_info(
    handler: *const OverlayHandler,
    path: *const c_char,
    image_buf: *mut c_char,
    image_buf_len: usize,
    icon_index: *mut u32,
) -> i32 {
    if image_buf.is_null() || icon_index.is_null() || image_buf_len == 0 {
        return ShellVerdict::Indeterminate.code();
    }
    let Some((handler, path)) = handler_and_path(handler, path) else {
        return ShellVerdict::Indeterminate.code();
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| match handler.overlay_info(path) {
        Some(info) => {
            let image = info.image_file.to_string_lossy();
            let bytes = image.as_bytes();
            if bytes.len() + 1 > image_buf_len {
                warn!(needed = bytes.len() + 1, have = image_buf_len, "Overlay image path truncated");
                return ShellVerdict::Indeterminate;
            }
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), image_buf as *mut u8, bytes.len());
            *image_buf.add(bytes.len()) = 0;
            *icon_index = info.icon_index;
            ShellVerdict::Participate
        }
        None => ShellVerdict::Decline,
    }));
    outcome.unwrap_or(ShellVerdict::Indeterminate).code()
}

/// Reported priority in the shell's 0..=100 scheme; constant for the life of
/// the process. Bad arguments get the floor value so a broken caller can
/// never win an overlay slot with it.
///
/// # Safety
/// `handler` must be a live pointer from [`emblem_handler_new`] or null.
#[no_mangle]
pub unsafe extern "C" fn emblem_priority(handler: *const OverlayHandler) -> i32 {
    if handler.is_null() {
        return LOWEST_PRIORITY;
    }
    let handler = &*handler;
    catch_unwind(AssertUnwindSafe(|| handler.priority())).unwrap_or(LOWEST_PRIORITY)
}

unsafe fn handler_and_path<'a>(
    handler: *const OverlayHandler,
    path: *const c_char,
) -> Option<(&'a OverlayHandler, &'a Path)> {
    if handler.is_null() || path.is_null() {
        return None;
    }
    let path = CStr::from_ptr(path).to_str().ok()?;
    Some((&*handler, Path::new(path)))
}
