//! # pdfraster
//!
//! Rasterise PDF documents through the Ghostscript interpreter library
//! (`libgs`), one serialized invocation at a time.
//!
//! ## What this crate does
//!
//! Ghostscript does the real work: parsing, fonts, rendering, encoding. This
//! crate:
//!
//! 1. validates a small [`ConversionSettings`] value (device, pages,
//!    resolution, page size),
//! 2. turns it into the ordered argument vector Ghostscript expects
//!    ([`build_arguments`]),
//! 3. runs the interpreter lifecycle under a process-wide lock, because
//!    Ghostscript supports only one live instance per process
//!    ([`SerializedInvoker`]).
//!
//! ```text
//! settings ──▶ validate ──▶ ArgumentSequence ──▶ [slot] create ▶ init ▶ exit ▶ delete [/slot]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfraster::{generate_output, ConversionSettings, Device, PageSelection, PaperSize};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConversionSettings::builder()
//!         .device(Device::Png16m)
//!         .pages(PageSelection::range(1, 3))
//!         .dpi(150)
//!         .paper(PaperSize::A4)
//!         .build()?;
//!     generate_output("document.pdf", "page-%d.png", &settings)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfraster` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfraster = { version = "0.1", default-features = false }
//! ```
//!
//! ## Finding Ghostscript
//!
//! The shared library is located at runtime by [`gsapi_loader`]; set
//! `GSAPI_LIB_PATH` to override the platform search.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod args;
pub mod batch;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use args::{build_arguments, ArgumentSequence, PREAMBLE};
pub use batch::{convert_batch, convert_batch_with, BatchJob, BatchOutcome, BatchReport, BatchStats};
pub use config::{
    ConversionSettings, ConversionSettingsBuilder, Device, PageSelection, PageSize, PaperSize,
    Resolution,
};
pub use convert::{
    default_invoker, engine_revision, generate_output, generate_output_async,
    generate_output_from_bytes, generate_output_with_timeout, generate_page_thumbs,
};
pub use engine::{GhostscriptEngine, RasterEngine};
pub use error::RasterError;
pub use gsapi_loader::Revision;
pub use invoker::{EngineSlot, SerializedInvoker};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
