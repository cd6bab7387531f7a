//! # gsapi-loader
//!
//! Locate the [Ghostscript](https://www.ghostscript.com/) shared library at
//! runtime and bind its interpreter API (`gsapi_*`), so that callers do not
//! need a compile-time link against `libgs` or any `-sys` build script.
//!
//! ## How it works
//!
//! On first call to [`bind_gsapi`]:
//!
//! 1. If `GSAPI_LIB_PATH` points to an existing file, that library is bound.
//! 2. Otherwise each platform default name (e.g. `libgs.so.10`) is handed to
//!    the OS loader in turn; the first one that loads wins.
//! 3. The required entry points are resolved and the binding is cached for
//!    the lifetime of the process.
//!
//! Subsequent calls return the cached binding without touching the loader.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gsapi_loader::bind_gsapi;
//!
//! let api = bind_gsapi().expect("Ghostscript unavailable");
//! let rev = api.revision().expect("revision query failed");
//! println!("{} {}", rev.product, rev.version_string());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Library candidates                                   |
//! |---------|------------------------------------------------------|
//! | Linux   | `libgs.so.10`, `libgs.so.9`, `libgs.so`              |
//! | macOS   | `libgs.dylib`, `libgs.10.dylib`, Homebrew, `/usr/local` |
//! | Windows | `gsdll64.dll`, `gsdll32.dll`                         |
//!
//! ## Environment variable overrides
//!
//! - `GSAPI_LIB_PATH`: path to an existing libgs; skips the default search.

use std::ffi::{c_char, c_int, c_long, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit libgs path.
pub const ENV_LIB_PATH: &str = "GSAPI_LIB_PATH";

/// Return code Ghostscript uses for a normal `quit` (e.g. after `-dBATCH`).
pub const GS_ERROR_QUIT: c_int = -101;

/// Return code for unrecoverable interpreter errors.
pub const GS_ERROR_FATAL: c_int = -100;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by gsapi-loader operations.
#[derive(Error, Debug)]
pub enum GsapiLoadError {
    /// The current OS has no known libgs naming convention.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// No candidate library could be loaded.
    #[error("Ghostscript library not found (tried: {})", tried.join(", "))]
    NotFound { tried: Vec<String> },

    /// The library loaded but a required symbol was missing, or it failed to load.
    #[error("Failed to bind Ghostscript from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// `gsapi_revision` rejected the query.
    #[error("gsapi_revision failed with code {code}")]
    Revision { code: i32 },
}

// ── Raw entry point signatures ───────────────────────────────────────────────

/// `int gsapi_new_instance(void **pinstance, void *caller_handle)`
pub type NewInstanceFn = unsafe extern "system" fn(*mut *mut c_void, *mut c_void) -> c_int;
/// `int gsapi_init_with_args(void *instance, int argc, char **argv)`
pub type InitWithArgsFn = unsafe extern "system" fn(*mut c_void, c_int, *mut *mut c_char) -> c_int;
/// `int gsapi_exit(void *instance)`
pub type ExitFn = unsafe extern "system" fn(*mut c_void) -> c_int;
/// `void gsapi_delete_instance(void *instance)`
pub type DeleteInstanceFn = unsafe extern "system" fn(*mut c_void);
/// `int gsapi_revision(gsapi_revision_t *pr, int len)`
pub type RevisionFn = unsafe extern "system" fn(*mut RawRevision, c_int) -> c_int;
/// stdin callback: `int (*)(void *caller_handle, char *buf, int len)`
pub type StdinFn = unsafe extern "system" fn(*mut c_void, *mut c_char, c_int) -> c_int;
/// stdout / stderr callback: `int (*)(void *caller_handle, const char *str, int len)`
pub type StdoutFn = unsafe extern "system" fn(*mut c_void, *const c_char, c_int) -> c_int;
/// `int gsapi_set_stdio(void *instance, stdin_fn, stdout_fn, stderr_fn)`
pub type SetStdioFn = unsafe extern "system" fn(
    *mut c_void,
    Option<StdinFn>,
    Option<StdoutFn>,
    Option<StdoutFn>,
) -> c_int;

/// Mirror of `gsapi_revision_t`.
#[repr(C)]
pub struct RawRevision {
    product: *const c_char,
    copyright: *const c_char,
    revision: c_long,
    revision_date: c_long,
}

/// Owned copy of the library's revision information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub product: String,
    pub copyright: String,
    /// Encoded as `major * 1000 + minor * 10 + patch`, e.g. `10020` for 10.02.0.
    pub revision: i64,
    /// `YYYYMMDD`.
    pub revision_date: i64,
}

impl Revision {
    /// Human-readable version, e.g. `"10.02.0"`.
    pub fn version_string(&self) -> String {
        let major = self.revision / 1000;
        let minor = (self.revision % 1000) / 10;
        let patch = self.revision % 10;
        format!("{major}.{minor:02}.{patch}")
    }
}

// ── Bound library ────────────────────────────────────────────────────────────

/// A loaded libgs with its entry points resolved.
///
/// The function pointers stay valid for as long as this value (and so the
/// underlying [`Library`]) is alive.
pub struct GsApi {
    path: PathBuf,
    new_instance: NewInstanceFn,
    init_with_args: InitWithArgsFn,
    exit: ExitFn,
    delete_instance: DeleteInstanceFn,
    revision: RevisionFn,
    set_stdio: Option<SetStdioFn>,
    _library: Library,
}

impl std::fmt::Debug for GsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GsApi")
            .field("path", &self.path)
            .field("set_stdio", &self.set_stdio.is_some())
            .finish()
    }
}

impl GsApi {
    /// The path or library name this binding was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Safety
    /// `pinstance` must be valid for a pointer write.
    pub unsafe fn new_instance(&self, pinstance: *mut *mut c_void, caller_handle: *mut c_void) -> c_int {
        (self.new_instance)(pinstance, caller_handle)
    }

    /// # Safety
    /// `instance` must come from [`GsApi::new_instance`] and not yet be deleted;
    /// `argv` must hold `argc` valid NUL-terminated strings.
    pub unsafe fn init_with_args(&self, instance: *mut c_void, argc: c_int, argv: *mut *mut c_char) -> c_int {
        (self.init_with_args)(instance, argc, argv)
    }

    /// # Safety
    /// `instance` must be a live instance.
    pub unsafe fn exit(&self, instance: *mut c_void) -> c_int {
        (self.exit)(instance)
    }

    /// # Safety
    /// `instance` must be a live instance; it is invalid afterwards.
    pub unsafe fn delete_instance(&self, instance: *mut c_void) {
        (self.delete_instance)(instance)
    }

    /// Install stdio callbacks. Returns `None` if the library predates
    /// `gsapi_set_stdio`.
    ///
    /// # Safety
    /// `instance` must be a live instance; the callbacks must stay valid
    /// until it is deleted.
    pub unsafe fn set_stdio(
        &self,
        instance: *mut c_void,
        stdin_fn: Option<StdinFn>,
        stdout_fn: Option<StdoutFn>,
        stderr_fn: Option<StdoutFn>,
    ) -> Option<c_int> {
        self.set_stdio
            .map(|f| f(instance, stdin_fn, stdout_fn, stderr_fn))
    }

    /// Query product name, copyright and version. Needs no instance.
    pub fn revision(&self) -> Result<Revision, GsapiLoadError> {
        let mut raw = RawRevision {
            product: std::ptr::null(),
            copyright: std::ptr::null(),
            revision: 0,
            revision_date: 0,
        };
        let len = std::mem::size_of::<RawRevision>() as c_int;
        let code = unsafe { (self.revision)(&mut raw, len) };
        if code != 0 {
            return Err(GsapiLoadError::Revision { code });
        }

        Ok(Revision {
            product: unsafe { owned_c_str(raw.product) },
            copyright: unsafe { owned_c_str(raw.copyright) },
            revision: raw.revision as i64,
            revision_date: raw.revision_date as i64,
        })
    }
}

unsafe fn owned_c_str(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        CStr::from_ptr(p).to_string_lossy().into_owned()
    }
}

// ── Platform metadata ────────────────────────────────────────────────────────

fn platform_candidates() -> Result<&'static [&'static str], GsapiLoadError> {
    let os = std::env::consts::OS;

    match os {
        "linux" | "freebsd" | "openbsd" | "netbsd" => {
            Ok(&["libgs.so.10", "libgs.so.9", "libgs.so"])
        }
        "macos" => Ok(&[
            "libgs.dylib",
            "libgs.10.dylib",
            "/opt/homebrew/lib/libgs.dylib",
            "/usr/local/lib/libgs.dylib",
        ]),
        "windows" => Ok(&["gsdll64.dll", "gsdll32.dll"]),
        os => Err(GsapiLoadError::UnsupportedPlatform {
            os: os.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }),
    }
}

// ── Thread-safe singleton binding ────────────────────────────────────────────

static BOUND: OnceLock<GsApi> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Binds libgs, searching the default locations on first call.
///
/// # Thread safety
///
/// Safe to call from multiple threads; concurrent first calls may each load
/// the library, but only one binding is kept.
pub fn bind_gsapi() -> Result<&'static GsApi, GsapiLoadError> {
    if let Some(api) = BOUND.get() {
        return Ok(api);
    }

    let api = bind_default()?;
    Ok(BOUND.get_or_init(|| api))
}

/// Returns `true` once [`bind_gsapi`] has succeeded in this process.
pub fn is_bound() -> bool {
    BOUND.get().is_some()
}

/// Binds libgs from an explicit `path`, bypassing the search and the cache.
pub fn bind_gsapi_from_path(path: &Path) -> Result<GsApi, GsapiLoadError> {
    let library = unsafe { Library::new(path) }.map_err(|e| GsapiLoadError::Bind {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    resolve_symbols(path, library)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn bind_default() -> Result<GsApi, GsapiLoadError> {
    let mut tried = Vec::new();

    // 1. Environment variable override.
    if let Ok(env_path) = std::env::var(ENV_LIB_PATH) {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            return bind_gsapi_from_path(&p);
        }
        tried.push(format!("{env_path} ({ENV_LIB_PATH}, missing)"));
    }

    // 2. Platform defaults, resolved by the OS loader.
    for name in platform_candidates()? {
        match unsafe { Library::new(name) } {
            Ok(library) => return resolve_symbols(Path::new(name), library),
            Err(_) => tried.push((*name).to_string()),
        }
    }

    Err(GsapiLoadError::NotFound { tried })
}

fn resolve_symbols(path: &Path, library: Library) -> Result<GsApi, GsapiLoadError> {
    fn required<T: Copy>(lib: &Library, path: &Path, name: &[u8]) -> Result<T, GsapiLoadError> {
        unsafe { lib.get::<T>(name) }
            .map(|sym| *sym)
            .map_err(|e| GsapiLoadError::Bind {
                path: path.to_path_buf(),
                reason: format!(
                    "missing symbol {}: {e}",
                    String::from_utf8_lossy(&name[..name.len() - 1])
                ),
            })
    }

    let new_instance = required::<NewInstanceFn>(&library, path, b"gsapi_new_instance\0")?;
    let init_with_args = required::<InitWithArgsFn>(&library, path, b"gsapi_init_with_args\0")?;
    let exit = required::<ExitFn>(&library, path, b"gsapi_exit\0")?;
    let delete_instance = required::<DeleteInstanceFn>(&library, path, b"gsapi_delete_instance\0")?;
    let revision = required::<RevisionFn>(&library, path, b"gsapi_revision\0")?;
    let set_stdio = unsafe { library.get::<SetStdioFn>(b"gsapi_set_stdio\0") }
        .ok()
        .map(|sym| *sym);

    Ok(GsApi {
        path: path.to_path_buf(),
        new_instance,
        init_with_args,
        exit,
        delete_instance,
        revision,
        set_stdio,
        _library: library,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_is_supported() {
        let names = platform_candidates().expect("current platform should be supported");
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.contains("gs")));
    }

    #[test]
    fn bind_from_missing_path_is_bind_error() {
        let err = bind_gsapi_from_path(Path::new("/definitely/not/here/libgs.so")).unwrap_err();
        match err {
            GsapiLoadError::Bind { path, .. } => {
                assert!(path.ends_with("libgs.so"));
            }
            other => panic!("expected Bind, got {other:?}"),
        }
    }

    #[test]
    fn version_string_formats_revision() {
        let rev = Revision {
            product: "GPL Ghostscript".into(),
            copyright: String::new(),
            revision: 10020,
            revision_date: 20230913,
        };
        assert_eq!(rev.version_string(), "10.02.0");

        let old = Revision { revision: 9561, ..rev };
        assert_eq!(old.version_string(), "9.56.1");
    }

    #[test]
    fn not_found_lists_candidates() {
        let err = GsapiLoadError::NotFound {
            tried: vec!["libgs.so.10".into(), "libgs.so".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("libgs.so.10, libgs.so"), "got: {msg}");
    }
}
