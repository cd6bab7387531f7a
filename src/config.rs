//! Conversion settings: output device, pages, resolution and page size.
//!
//! All knobs for a single engine invocation live in [`ConversionSettings`],
//! built via [`ConversionSettingsBuilder`]. Settings are plain values: build
//! one per call, hand it to [`crate::args::build_arguments`] (or any of the
//! `generate_*` entry points) and drop it.
//!
//! Device and paper size are closed enums. Their protocol tokens come from an
//! exhaustive `match`, so adding a variant without a token does not compile.

use crate::error::RasterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings for one Ghostscript invocation.
///
/// `device` and `page_size` are optional so that a partially filled value
/// (e.g. deserialised from a config file) can exist; validation rejects
/// `None` for both.
///
/// # Example
/// ```rust
/// use pdfraster::{ConversionSettings, Device, PageSelection, PaperSize};
///
/// let settings = ConversionSettings::builder()
///     .device(Device::Png16m)
///     .pages(PageSelection::range(1, 3))
///     .dpi(150)
///     .paper(PaperSize::A4)
///     .build()
///     .unwrap();
/// assert_eq!(settings.resolution.x, 150);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Output device. Required.
    #[serde(default)]
    pub device: Option<Device>,

    /// Which pages to rasterise. Default: all pages.
    #[serde(default)]
    pub pages: PageSelection,

    /// Device resolution in DPI. Both axes must be non-zero.
    #[serde(default)]
    pub resolution: Resolution,

    /// Output page size, named or explicit. Required.
    #[serde(default)]
    pub page_size: Option<PageSize>,
}

impl ConversionSettings {
    /// Create a new builder for `ConversionSettings`.
    pub fn builder() -> ConversionSettingsBuilder {
        ConversionSettingsBuilder {
            settings: Self::default(),
        }
    }

    /// Thumbnail preset: JPEG, a7 paper, pages `first_page..=last_page`,
    /// `width`×`height` DPI. Not validated until used.
    pub fn thumbnails(first_page: u32, last_page: u32, width: u32, height: u32) -> Self {
        Self {
            device: Some(Device::Jpeg),
            pages: PageSelection::range(first_page, last_page),
            resolution: Resolution::new(width, height),
            page_size: Some(PageSize::Named(PaperSize::A7)),
        }
    }

    /// Check the settings, first failure wins.
    ///
    /// Order: device, page range, resolution, page size.
    pub fn validate(&self) -> Result<(), RasterError> {
        if self.device.is_none() {
            return Err(RasterError::InvalidConfiguration("device required".into()));
        }
        if let PageSelection::Range { start, .. } = self.pages {
            // end < start is accepted; only -dLastPage is dropped.
            if start == 0 {
                return Err(RasterError::InvalidConfiguration(
                    "page range required".into(),
                ));
            }
        }
        if self.resolution.x == 0 || self.resolution.y == 0 {
            return Err(RasterError::InvalidConfiguration(
                "resolution required".into(),
            ));
        }
        match self.page_size {
            None
            | Some(PageSize::Explicit { width: 0, .. })
            | Some(PageSize::Explicit { height: 0, .. }) => Err(
                RasterError::InvalidConfiguration("page size required".into()),
            ),
            Some(_) => Ok(()),
        }
    }
}

/// Builder for [`ConversionSettings`].
#[derive(Debug)]
pub struct ConversionSettingsBuilder {
    settings: ConversionSettings,
}

impl ConversionSettingsBuilder {
    pub fn device(mut self, device: Device) -> Self {
        self.settings.device = Some(device);
        self
    }

    pub fn pages(mut self, pages: PageSelection) -> Self {
        self.settings.pages = pages;
        self
    }

    /// Set horizontal and vertical resolution independently.
    pub fn resolution(mut self, x: u32, y: u32) -> Self {
        self.settings.resolution = Resolution { x, y };
        self
    }

    /// Set the same resolution on both axes.
    pub fn dpi(self, dpi: u32) -> Self {
        self.resolution(dpi, dpi)
    }

    pub fn paper(mut self, paper: PaperSize) -> Self {
        self.settings.page_size = Some(PageSize::Named(paper));
        self
    }

    /// Explicit page size in PostScript points (1/72 inch).
    pub fn size_points(mut self, width: u32, height: u32) -> Self {
        self.settings.page_size = Some(PageSize::Explicit { width, height });
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.settings.page_size = Some(size);
        self
    }

    /// Build the settings, validating constraints.
    pub fn build(self) -> Result<ConversionSettings, RasterError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Specifies which pages of the input to rasterise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    AllPages,
    /// Pages `start..=end`, 1-indexed. When `end < start` only the first page
    /// bound is passed and the engine renders through the last page.
    Range { start: u32, end: u32 },
}

impl PageSelection {
    pub fn range(start: u32, end: u32) -> Self {
        PageSelection::Range { start, end }
    }

    /// A single 1-indexed page.
    pub fn single(page: u32) -> Self {
        PageSelection::Range {
            start: page,
            end: page,
        }
    }
}

/// Device resolution in dots per inch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

impl Resolution {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl FromStr for Resolution {
    type Err = RasterError;

    /// Accepts `"150"` or `"150x300"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = parse_pair(s).ok_or_else(|| {
            RasterError::InvalidConfiguration(format!("invalid resolution '{s}'"))
        })?;
        Ok(Resolution { x, y })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

/// Output page size: a Ghostscript paper name or explicit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    Named(PaperSize),
    /// Width and height in PostScript points.
    Explicit { width: u32, height: u32 },
}

impl FromStr for PageSize {
    type Err = RasterError;

    /// Accepts a paper name (`"a4"`) or explicit points (`"595x842"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(paper) = s.parse::<PaperSize>() {
            return Ok(PageSize::Named(paper));
        }
        match s.split_once(['x', 'X']) {
            Some(_) => {
                let (width, height) = parse_pair(s).ok_or_else(|| {
                    RasterError::InvalidConfiguration(format!("invalid page size '{s}'"))
                })?;
                Ok(PageSize::Explicit { width, height })
            }
            None => Err(RasterError::InvalidConfiguration(format!(
                "unknown paper size '{s}'"
            ))),
        }
    }
}

/// Parse `"N"` as `(N, N)` or `"WxH"` as `(W, H)`.
fn parse_pair(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    match s.split_once(['x', 'X']) {
        Some((w, h)) => Some((w.trim().parse().ok()?, h.trim().parse().ok()?)),
        None => {
            let n = s.parse().ok()?;
            Some((n, n))
        }
    }
}

// ── Closed token tables ──────────────────────────────────────────────────

/// Declares a closed enum whose variants map one-to-one onto protocol tokens.
macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// The token Ghostscript expects for this value.
            pub fn token(self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.token())
            }
        }

        impl FromStr for $name {
            type Err = RasterError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.token().eq_ignore_ascii_case(s))
                    .ok_or_else(|| RasterError::InvalidConfiguration(format!(
                        concat!("unknown ", stringify!($name), " '{}'"), s
                    )))
            }
        }

        impl TryFrom<String> for $name {
            type Error = RasterError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.token().to_string()
            }
        }
    };
}

token_enum! {
    /// Ghostscript output devices.
    pub enum Device {
        Png16m => "png16m",
        PngGray => "pnggray",
        Png256 => "png256",
        Png16 => "png16",
        PngMono => "pngmono",
        PngAlpha => "pngalpha",
        Jpeg => "jpeg",
        JpegGray => "jpeggray",
        TiffGray => "tiffgray",
        Tiff12nc => "tiff12nc",
        Tiff24nc => "tiff24nc",
        Tiff32nc => "tiff32nc",
        TiffSep => "tiffsep",
        TiffCrle => "tiffcrle",
        TiffG3 => "tiffg3",
        TiffG32d => "tiffg32d",
        TiffG4 => "tiffg4",
        TiffLzw => "tifflzw",
        TiffPack => "tiffpack",
        FaxG3 => "faxg3",
        FaxG32d => "faxg32d",
        FaxG4 => "faxg4",
        BmpMono => "bmpmono",
        BmpGray => "bmpgray",
        BmpSep1 => "bmpsep1",
        BmpSep8 => "bmpsep8",
        Bmp16 => "bmp16",
        Bmp256 => "bmp256",
        Bmp16m => "bmp16m",
        Bmp32b => "bmp32b",
        PcxMono => "pcxmono",
        PcxGray => "pcxgray",
        Pcx16 => "pcx16",
        Pcx256 => "pcx256",
        Pcx24b => "pcx24b",
        PcxCmyk => "pcxcmyk",
        PsdCmyk => "psdcmyk",
        PsdRgb => "psdrgb",
        PdfWrite => "pdfwrite",
        Ps2Write => "ps2write",
        Eps2Write => "eps2write",
        PxlMono => "pxlmono",
        PxlColor => "pxlcolor",
    }
}

impl Device {
    /// Conventional file extension for this device's output.
    pub fn extension(self) -> &'static str {
        use Device::*;
        match self {
            Png16m | PngGray | Png256 | Png16 | PngMono | PngAlpha => "png",
            Jpeg | JpegGray => "jpg",
            TiffGray | Tiff12nc | Tiff24nc | Tiff32nc | TiffSep | TiffCrle | TiffG3
            | TiffG32d | TiffG4 | TiffLzw | TiffPack => "tif",
            FaxG3 | FaxG32d | FaxG4 => "fax",
            BmpMono | BmpGray | BmpSep1 | BmpSep8 | Bmp16 | Bmp256 | Bmp16m | Bmp32b => "bmp",
            PcxMono | PcxGray | Pcx16 | Pcx256 | Pcx24b | PcxCmyk => "pcx",
            PsdCmyk | PsdRgb => "psd",
            PdfWrite => "pdf",
            Ps2Write => "ps",
            Eps2Write => "eps",
            PxlMono | PxlColor => "pxl",
        }
    }

    /// Whether the device writes one file per page (needs `%d` in the
    /// output name to keep every page).
    pub fn is_raster(self) -> bool {
        !matches!(self, Device::PdfWrite | Device::Ps2Write | Device::PxlMono | Device::PxlColor)
    }
}

token_enum! {
    /// Ghostscript named paper sizes (`-sPAPERSIZE=`).
    pub enum PaperSize {
        Size11x17 => "11x17",
        Ledger => "ledger",
        Legal => "legal",
        Letter => "letter",
        LetterSmall => "lettersmall",
        Tabloid => "tabloid",
        HalfLetter => "halfletter",
        ArchE => "archE",
        ArchD => "archD",
        ArchC => "archC",
        ArchB => "archB",
        ArchA => "archA",
        A0 => "a0",
        A1 => "a1",
        A2 => "a2",
        A3 => "a3",
        A4 => "a4",
        A4Small => "a4small",
        A5 => "a5",
        A6 => "a6",
        A7 => "a7",
        A8 => "a8",
        A9 => "a9",
        A10 => "a10",
        B0 => "b0",
        B1 => "b1",
        B2 => "b2",
        B3 => "b3",
        B4 => "b4",
        B5 => "b5",
        B6 => "b6",
        C0 => "c0",
        C1 => "c1",
        C2 => "c2",
        C3 => "c3",
        C4 => "c4",
        C5 => "c5",
        C6 => "c6",
        Flsa => "flsa",
        Flse => "flse",
    }
}
