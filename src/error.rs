//! Error types for the pdfraster library.
//!
//! Every fallible operation returns [`RasterError`]. The variants fall into
//! two groups that callers usually treat differently:
//!
//! * **Before the engine**: [`RasterError::InvalidConfiguration`] and
//!   [`RasterError::EngineUnavailable`]. Nothing was created inside the
//!   Ghostscript library; fix the input and call again.
//!
//! * **Inside the engine**: [`RasterError::InstanceCreation`] and
//!   [`RasterError::ExternalEngine`]. By the time these surface the instance
//!   has already been exited and deleted, so the engine slot is free.
//!
//! No error is retried automatically; [`RasterError::is_retryable`] is a hint
//! for callers that implement their own policy.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors returned by the pdfraster library.
#[derive(Debug, Error)]
pub enum RasterError {
    // ── Settings errors ───────────────────────────────────────────────────
    /// Settings failed validation; no engine call was made.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Engine errors ─────────────────────────────────────────────────────
    /// `gsapi_new_instance` refused to create an instance.
    #[error("Ghostscript refused to create an instance (code {code})")]
    InstanceCreation { code: i32 },

    /// `gsapi_init_with_args` returned a negative status. Cleanup has run.
    #[error(
        "Ghostscript failed with code {code}\n\
Check that the input is a readable PDF and that the device supports the requested settings."
    )]
    ExternalEngine { code: i32 },

    /// The Ghostscript shared library could not be located or bound.
    #[error(
        "Failed to bind to the Ghostscript library: {0}\n\n\
Ghostscript must be installed as a shared library (libgs).\n\
  • Debian/Ubuntu: apt install libgs10   (or libgs9)\n\
  • macOS:         brew install ghostscript\n\
  • Windows:       install Ghostscript and add its bin/ directory to PATH\n\
Or set GSAPI_LIB_PATH=/path/to/libgs to use a specific copy.\n"
    )]
    EngineUnavailable(String),

    // ── Caller-imposed limits ─────────────────────────────────────────────
    /// The invocation did not finish before the caller's deadline.
    ///
    /// The worker is abandoned, not cancelled: it keeps the engine slot until
    /// Ghostscript returns.
    #[error("Ghostscript invocation timed out after {after:?}")]
    Timeout { after: Duration },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Staging a temporary input file failed.
    #[error("I/O error while {context} '{path}': {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a worker thread panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RasterError {
    /// Whether calling again with the same arguments could plausibly succeed.
    ///
    /// Engine failures are deterministic for a given input and settings, so
    /// only deadline expiry counts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RasterError::Timeout { .. })
    }

    /// The engine status code, for variants that carry one.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            RasterError::InstanceCreation { code } | RasterError::ExternalEngine { code } => {
                Some(*code)
            }
            _ => None,
        }
    }
}

impl From<gsapi_loader::GsapiLoadError> for RasterError {
    fn from(e: gsapi_loader::GsapiLoadError) -> Self {
        RasterError::EngineUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_display() {
        let e = RasterError::InvalidConfiguration("device required".into());
        assert_eq!(e.to_string(), "Invalid configuration: device required");
    }

    #[test]
    fn external_engine_carries_code() {
        let e = RasterError::ExternalEngine { code: -100 };
        assert!(e.to_string().contains("-100"), "got: {e}");
        assert_eq!(e.engine_code(), Some(-100));
        assert!(!e.is_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        let e = RasterError::Timeout {
            after: Duration::from_secs(30),
        };
        assert!(e.is_retryable());
        assert!(e.to_string().contains("30s"));
        assert_eq!(e.engine_code(), None);
    }

    #[test]
    fn sub_second_timeout_keeps_its_precision() {
        let e = RasterError::Timeout {
            after: Duration::from_millis(500),
        };
        assert_eq!(e.to_string(), "Ghostscript invocation timed out after 500ms");
    }

    #[test]
    fn load_error_converts_to_engine_unavailable() {
        let e: RasterError = gsapi_loader::GsapiLoadError::NotFound {
            tried: vec!["libgs.so.10".into()],
        }
        .into();
        let msg = e.to_string();
        assert!(matches!(e, RasterError::EngineUnavailable(_)));
        assert!(msg.contains("libgs.so.10"), "got: {msg}");
        assert!(msg.contains("GSAPI_LIB_PATH"), "got: {msg}");
    }
}
