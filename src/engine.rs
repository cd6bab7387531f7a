//! The external rasterization engine and its lifecycle operations.
//!
//! [`RasterEngine`] is the seam between this crate and the native library:
//! four calls mirroring the Ghostscript interpreter API. The production
//! implementation is [`GhostscriptEngine`]; tests substitute a recording
//! fake.
//!
//! Implementations are not expected to serialise anything themselves.
//! Exclusive access is the job of [`crate::invoker::SerializedInvoker`].

use crate::error::RasterError;
use gsapi_loader::{bind_gsapi, GsApi, Revision};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// Program name passed as `argv[0]`; Ghostscript skips it.
const ARGV0: &CStr = c"pdfraster";

/// A native engine with a create → init → exit → delete lifecycle.
pub trait RasterEngine: Send + Sync {
    /// Handle to one live engine instance.
    type Instance;

    /// Create an instance, or return the engine's negative status code.
    fn create_instance(&self) -> Result<Self::Instance, i32>;

    /// Initialise the instance with `args`; runs the job to completion.
    fn init_with_args(&self, instance: &mut Self::Instance, args: &[CString]) -> i32;

    /// Shut the interpreter down. Must be called once per created instance.
    fn exit(&self, instance: &mut Self::Instance) -> i32;

    /// Release the instance.
    fn delete_instance(&self, instance: Self::Instance);

    /// Status codes from `init_with_args` that mean "finished normally"
    /// despite being negative.
    fn is_normal_exit(&self, code: i32) -> bool {
        let _ = code;
        false
    }
}

/// [`RasterEngine`] backed by the dynamically loaded Ghostscript library.
#[derive(Debug, Clone, Copy)]
pub struct GhostscriptEngine {
    api: &'static GsApi,
}

/// A live `gsapi` instance. Raw pointer inside, so neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct GsInstance(NonNull<c_void>);

impl GhostscriptEngine {
    /// Bind the process-wide Ghostscript library (loaded on first use).
    pub fn new() -> Result<Self, RasterError> {
        let api = bind_gsapi()?;
        debug!("Bound Ghostscript from {}", api.path().display());
        Ok(Self { api })
    }

    /// Use an already bound library.
    pub fn from_api(api: &'static GsApi) -> Self {
        Self { api }
    }

    /// Product, copyright and version of the bound library.
    pub fn revision(&self) -> Result<Revision, RasterError> {
        Ok(self.api.revision()?)
    }
}

impl RasterEngine for GhostscriptEngine {
    type Instance = GsInstance;

    fn create_instance(&self) -> Result<GsInstance, i32> {
        let mut raw: *mut c_void = ptr::null_mut();
        let code = unsafe { self.api.new_instance(&mut raw, ptr::null_mut()) };
        if code < 0 {
            return Err(code);
        }
        let instance = NonNull::new(raw).ok_or(gsapi_loader::GS_ERROR_FATAL)?;

        // Route interpreter chatter into tracing instead of the process stdio.
        let routed = unsafe {
            self.api.set_stdio(
                instance.as_ptr(),
                Some(stdin_closed),
                Some(stdout_to_trace),
                Some(stderr_to_trace),
            )
        };
        if let Some(c) = routed.filter(|c| *c < 0) {
            warn!("gsapi_set_stdio failed with code {}", c);
        }

        Ok(GsInstance(instance))
    }

    fn init_with_args(&self, instance: &mut GsInstance, args: &[CString]) -> i32 {
        let mut argv: Vec<*mut c_char> = std::iter::once(ARGV0)
            .chain(args.iter().map(CString::as_c_str))
            .map(|a| a.as_ptr() as *mut c_char)
            .collect();
        let argc = argv.len() as c_int;

        unsafe { self.api.init_with_args(instance.0.as_ptr(), argc, argv.as_mut_ptr()) }
    }

    fn exit(&self, instance: &mut GsInstance) -> i32 {
        unsafe { self.api.exit(instance.0.as_ptr()) }
    }

    fn delete_instance(&self, instance: GsInstance) {
        unsafe { self.api.delete_instance(instance.0.as_ptr()) }
    }

    fn is_normal_exit(&self, code: i32) -> bool {
        code == gsapi_loader::GS_ERROR_QUIT
    }
}

// ── stdio callbacks ──────────────────────────────────────────────────────

unsafe extern "system" fn stdin_closed(_handle: *mut c_void, _buf: *mut c_char, _len: c_int) -> c_int {
    0
}

unsafe extern "system" fn stdout_to_trace(_handle: *mut c_void, buf: *const c_char, len: c_int) -> c_int {
    if let Some(text) = lossy(buf, len) {
        debug!(target: "pdfraster::gs", "{}", text.trim_end());
    }
    len
}

unsafe extern "system" fn stderr_to_trace(_handle: *mut c_void, buf: *const c_char, len: c_int) -> c_int {
    if let Some(text) = lossy(buf, len) {
        warn!(target: "pdfraster::gs", "{}", text.trim_end());
    }
    len
}

unsafe fn lossy(buf: *const c_char, len: c_int) -> Option<String> {
    if buf.is_null() || len <= 0 {
        return None;
    }
    let bytes = std::slice::from_raw_parts(buf as *const u8, len as usize);
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossy_skips_blank_chunks() {
        let blank = b"  \n";
        let text = b"GPL Ghostscript\n";
        unsafe {
            assert_eq!(lossy(blank.as_ptr() as *const c_char, blank.len() as c_int), None);
            assert_eq!(
                lossy(text.as_ptr() as *const c_char, text.len() as c_int).as_deref(),
                Some("GPL Ghostscript\n")
            );
            assert_eq!(lossy(ptr::null(), 4), None);
        }
    }

    #[test]
    fn stdout_callback_reports_full_length() {
        let text = b"Page 1\n";
        let n = unsafe {
            stdout_to_trace(ptr::null_mut(), text.as_ptr() as *const c_char, text.len() as c_int)
        };
        assert_eq!(n, text.len() as c_int);
    }
}
