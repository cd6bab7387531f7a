//! Entry points running against the process-wide Ghostscript engine.
//!
//! Each call validates its settings first, then binds the shared library
//! (once per process) and runs one serialized engine lifecycle. Settings
//! errors therefore surface even on machines without Ghostscript.
//!
//! The synchronous functions block the calling thread, including while
//! waiting for another caller's invocation to finish. From async code use
//! [`generate_output_async`], which moves the work onto Tokio's blocking
//! pool, or [`generate_output_with_timeout`] to stop waiting after a
//! deadline.

use crate::args::build_arguments;
use crate::config::ConversionSettings;
use crate::engine::GhostscriptEngine;
use crate::error::RasterError;
use crate::invoker::SerializedInvoker;
use gsapi_loader::Revision;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// The invoker every entry point in this module shares.
pub fn default_invoker() -> Result<SerializedInvoker<GhostscriptEngine>, RasterError> {
    Ok(SerializedInvoker::with_process_slot(GhostscriptEngine::new()?))
}

/// Rasterise `input_path` into `output_path` with `settings`.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - [`RasterError::InvalidConfiguration`]: settings rejected, engine untouched
/// - [`RasterError::EngineUnavailable`]: libgs could not be loaded
/// - [`RasterError::ExternalEngine`]: Ghostscript reported a failure
pub fn generate_output(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    settings: &ConversionSettings,
) -> Result<(), RasterError> {
    let input_path = input_path.as_ref();
    let args = build_arguments(input_path, output_path.as_ref(), settings)?;
    info!("Rasterising {}", input_path.display());
    default_invoker()?.invoke(&args)
}

/// Render JPEG thumbnails of pages `first_page..=last_page`.
///
/// `width` and `height` are the horizontal and vertical resolution in DPI;
/// the page size is fixed to a7. Use `%d` in `output_path` to keep one file
/// per page.
pub fn generate_page_thumbs(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    first_page: u32,
    last_page: u32,
    width: u32,
    height: u32,
) -> Result<(), RasterError> {
    let settings = ConversionSettings::thumbnails(first_page, last_page, width, height);
    generate_output(input_path, output_path, &settings)
}

/// Async wrapper around [`generate_output`].
///
/// Runs on `tokio::task::spawn_blocking`: the engine call and the wait for
/// the engine slot both block.
pub async fn generate_output_async(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    settings: &ConversionSettings,
) -> Result<(), RasterError> {
    let input: PathBuf = input_path.as_ref().to_path_buf();
    let output: PathBuf = output_path.as_ref().to_path_buf();
    let settings = settings.clone();

    tokio::task::spawn_blocking(move || generate_output(&input, &output, &settings))
        .await
        .map_err(|e| RasterError::Internal(format!("Engine task panicked: {}", e)))?
}

/// [`generate_output_async`] with a deadline.
///
/// On expiry the caller gets [`RasterError::Timeout`] immediately, but the
/// worker is abandoned rather than cancelled. It keeps the engine slot until
/// Ghostscript returns, so later calls still wait for it.
pub async fn generate_output_with_timeout(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    settings: &ConversionSettings,
    timeout: Duration,
) -> Result<(), RasterError> {
    match tokio::time::timeout(
        timeout,
        generate_output_async(input_path, output_path, settings),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Engine invocation exceeded {:?}; abandoning worker",
                timeout
            );
            Err(RasterError::Timeout { after: timeout })
        }
    }
}

/// Rasterise PDF bytes held in memory.
///
/// Ghostscript reads its input from a path, so the bytes are written to a
/// managed [`tempfile`] that is removed on return or panic.
pub fn generate_output_from_bytes(
    bytes: &[u8],
    output_path: impl AsRef<Path>,
    settings: &ConversionSettings,
) -> Result<(), RasterError> {
    // Fail on bad settings before touching the filesystem.
    settings.validate()?;

    let mut tmp = tempfile::Builder::new()
        .prefix("pdfraster-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| RasterError::Io {
            context: "creating temp file in",
            path: std::env::temp_dir(),
            source: e,
        })?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| RasterError::Io {
            context: "writing",
            path: tmp_path,
            source: e,
        })?;

    // `tmp` is dropped (and the file deleted) when this returns
    generate_output(tmp.path(), output_path, settings)
}

/// Product and version of the Ghostscript library this process binds to.
///
/// Does not take the engine slot; the revision query needs no instance.
pub fn engine_revision() -> Result<Revision, RasterError> {
    GhostscriptEngine::new()?.revision()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_device() -> ConversionSettings {
        ConversionSettings {
            device: None,
            ..ConversionSettings::thumbnails(1, 1, 72, 72)
        }
    }

    // Validation runs before the library is bound, so these hold whether or
    // not Ghostscript is installed.

    #[test]
    fn invalid_settings_surface_before_binding() {
        let err = generate_output("in.pdf", "out.png", &no_device()).unwrap_err();
        assert!(matches!(err, RasterError::InvalidConfiguration(_)));
    }

    #[test]
    fn thumbs_with_zero_first_page_are_invalid() {
        let err = generate_page_thumbs("in.pdf", "t.jpg", 0, 3, 40, 40).unwrap_err();
        assert!(err.to_string().contains("page range required"));
    }

    #[test]
    fn bytes_variant_validates_first() {
        let err = generate_output_from_bytes(b"%PDF-1.4", "out.png", &no_device()).unwrap_err();
        assert!(matches!(err, RasterError::InvalidConfiguration(_)));
    }

    #[test]
    fn async_variant_propagates_validation_errors() {
        let settings = no_device();
        let result = tokio_test::block_on(generate_output_async("in.pdf", "out.png", &settings));
        assert!(matches!(result, Err(RasterError::InvalidConfiguration(_))));
    }
}
