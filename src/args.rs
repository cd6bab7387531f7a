//! Translate [`ConversionSettings`] into the engine's argument vector.
//!
//! Ghostscript is driven through `gsapi_init_with_args`, which takes a
//! command-line style `argv`. Token order is fixed:
//!
//! ```text
//! preamble │ -sDEVICE │ -dFirstPage [-dLastPage] │ size │ resolution │ -sOutputFile │ input
//! ```
//!
//! Some engine versions are order-sensitive (page tokens must precede size
//! and resolution), so [`build_arguments`] always emits this exact layout
//! and the input path always comes last.

use crate::config::{ConversionSettings, PageSelection, PageSize};
use crate::error::RasterError;
use serde::Serialize;
use std::ffi::CString;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Flags emitted before every device-specific token.
pub const PREAMBLE: &[&str] = &[
    // Silence startup banner and page messages
    "-q",
    "-dQUIET",
    // File access restricted to the named input/output
    "-dSAFER",
    // Exit after the last file, never wait for input
    "-dBATCH",
    "-dNOPAUSE",
    "-dNOPROMPT",
    "-dMaxBitmap=500000000",
    "-dNumRenderingThreads=4",
    // Anti-aliasing
    "-dAlignToPixels=0",
    "-dGridFitTT=0",
    "-dTextAlphaBits=4",
    "-dGraphicsAlphaBits=4",
];

/// Ordered argument tokens for one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArgumentSequence(Vec<String>);

impl ArgumentSequence {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Convert every token into a NUL-terminated C string.
    ///
    /// Fails with [`RasterError::InvalidConfiguration`] on an interior NUL
    /// byte, before any engine call is made.
    pub fn to_c_args(&self) -> Result<Vec<CString>, RasterError> {
        self.0
            .iter()
            .map(|t| {
                CString::new(t.as_str()).map_err(|_| {
                    RasterError::InvalidConfiguration(format!(
                        "argument contains a NUL byte: {t:?}"
                    ))
                })
            })
            .collect()
    }
}

impl From<Vec<String>> for ArgumentSequence {
    fn from(tokens: Vec<String>) -> Self {
        ArgumentSequence(tokens)
    }
}

impl<'a> IntoIterator for &'a ArgumentSequence {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ArgumentSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Validate `settings` and emit the argument tokens for converting
/// `input_path` into `output_path`.
///
/// # Errors
/// [`RasterError::InvalidConfiguration`] when validation fails; see
/// [`ConversionSettings::validate`] for the order of checks.
pub fn build_arguments(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    settings: &ConversionSettings,
) -> Result<ArgumentSequence, RasterError> {
    settings.validate()?;

    // validate() guarantees both are set.
    let (Some(device), Some(page_size)) = (settings.device, settings.page_size) else {
        return Err(RasterError::Internal(
            "validated settings lost device or page size".into(),
        ));
    };

    let input = utf8_path(input_path.as_ref())?;
    let output = utf8_path(output_path.as_ref())?;

    let mut args: Vec<String> = PREAMBLE.iter().map(|s| s.to_string()).collect();

    args.push(format!("-sDEVICE={}", device.token()));

    match settings.pages {
        PageSelection::AllPages => args.push("-dFirstPage=1".to_string()),
        PageSelection::Range { start, end } => {
            args.push(format!("-dFirstPage={start}"));
            if end >= start {
                args.push(format!("-dLastPage={end}"));
            }
        }
    }

    match page_size {
        PageSize::Explicit { width, height } => {
            args.push(format!("-dDEVICEWIDTHPOINTS={width}"));
            args.push(format!("-dDEVICEHEIGHTPOINTS={height}"));
        }
        PageSize::Named(paper) => args.push(format!("-sPAPERSIZE={}", paper.token())),
    }

    args.push(format!("-dDEVICEXRESOLUTION={}", settings.resolution.x));
    args.push(format!("-dDEVICEYRESOLUTION={}", settings.resolution.y));

    args.push(format!("-sOutputFile={output}"));
    args.push(input.to_string());

    debug!("Built {} engine arguments", args.len());
    Ok(ArgumentSequence(args))
}

/// Paths reach the engine byte for byte, so anything not UTF-8 is refused
/// rather than lossily converted.
fn utf8_path(path: &Path) -> Result<&str, RasterError> {
    path.to_str()
        .ok_or_else(|| RasterError::InvalidConfiguration("path is not valid UTF-8".into()))
}
