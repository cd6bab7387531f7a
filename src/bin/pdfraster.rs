//! CLI binary for pdfraster.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionSettings`, derives output paths and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfraster::{
    build_arguments, convert_batch, engine_revision, generate_output_with_timeout, BatchJob,
    BatchProgressCallback, ConversionSettings, Device, PageSelection, PageSize, PaperSize,
    ProgressCallback, Resolution,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per finished job.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-job wall-clock start times, including time spent queued for the
    /// engine slot.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Rasterising");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn take_elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
    }

    fn on_job_start(&self, index: usize, _total: usize, input: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(input.display().to_string());
    }

    fn on_job_complete(&self, index: usize, total: usize, input: &Path, elapsed_ms: u64) {
        let queued_ms = self.take_elapsed_ms(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            input.display(),
            dim(&format!(
                "{:.1}s engine, {:.1}s total",
                elapsed_ms as f64 / 1000.0,
                queued_ms as f64 / 1000.0
            )),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, index: usize, total: usize, input: &Path, error: &str) {
        self.take_elapsed_ms(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // First line only; engine hints follow on later lines.
        let msg = error.lines().next().unwrap_or(error);

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            input.display(),
            red(msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_jobs: usize, success_count: usize) {
        let failed = total_jobs.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files rasterised successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files rasterised  ({} failed)",
                if failed == total_jobs {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_jobs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every page of a PDF as 150 DPI PNGs (document-1.png, document-2.png, …)
  pdfraster document.pdf

  # Pages 3 to 5 as JPEG at 300 DPI on A4
  pdfraster --device jpeg --pages 3-5 --resolution 300 --paper a4 document.pdf

  # Explicit output pattern
  pdfraster document.pdf -o out/page-%03d.png

  # Thumbnails of the first four pages
  pdfraster --thumbs 40x40 --pages 1-4 document.pdf

  # Several files into one directory
  pdfraster --out-dir renders/ a.pdf b.pdf c.pdf

  # Show the Ghostscript arguments without running anything
  pdfraster --print-args --device tiffg4 scan.pdf

  # Load settings from JSON
  pdfraster --settings settings.json document.pdf

ENVIRONMENT VARIABLES:
  GSAPI_LIB_PATH          Path to an existing libgs: skips the platform search
  RUST_LOG                Override the log filter (e.g. pdfraster=debug)

SETUP:
  Ghostscript must be installed as a shared library:
    Debian/Ubuntu:  apt install libgs10
    macOS:          brew install ghostscript
"#;

/// Rasterise PDF files through Ghostscript.
#[derive(Parser, Debug)]
#[command(
    name = "pdfraster",
    version,
    about = "Rasterise PDF files through the Ghostscript library",
    long_about = "Rasterise PDF documents to PNG, JPEG, TIFF and other formats using the \
Ghostscript interpreter library. Invocations are serialized: Ghostscript supports only one \
live instance per process.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to rasterise.
    #[arg(required_unless_present = "engine_info")]
    inputs: Vec<PathBuf>,

    /// Output file (single input only). Use %d for one file per page.
    #[arg(short, long, env = "PDFRASTER_OUTPUT", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory for derived output names. Default: next to each input.
    #[arg(long, env = "PDFRASTER_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Ghostscript output device (png16m, jpeg, tiffg4, pdfwrite, …).
    #[arg(short, long, env = "PDFRASTER_DEVICE", default_value = "png16m")]
    device: Device,

    /// Page selection: all, 5, or 3-9.
    #[arg(long, env = "PDFRASTER_PAGES", default_value = "all")]
    pages: String,

    /// Resolution in DPI: 150 or 150x300.
    #[arg(short, long, env = "PDFRASTER_RESOLUTION", default_value = "150")]
    resolution: Resolution,

    /// Named paper size (letter, a4, legal, …).
    #[arg(long, env = "PDFRASTER_PAPER", default_value = "letter")]
    paper: PaperSize,

    /// Explicit page size in points, e.g. 595x842. Overrides --paper.
    #[arg(long, env = "PDFRASTER_SIZE")]
    size: Option<String>,

    /// Thumbnail preset at the given resolution (JPEG, a7). Honours
    /// --pages; the default renders every page.
    #[arg(long, value_name = "WxH", conflicts_with_all = ["settings", "device", "size"])]
    thumbs: Option<Resolution>,

    /// JSON file with ConversionSettings; replaces the settings flags.
    #[arg(long, env = "PDFRASTER_SETTINGS")]
    settings: Option<PathBuf>,

    /// Print the Ghostscript argument list as JSON and exit.
    #[arg(long)]
    print_args: bool,

    /// Print the bound Ghostscript library version and exit.
    #[arg(long)]
    engine_info: bool,

    /// Give up waiting for each file after this many seconds.
    #[arg(long, env = "PDFRASTER_TIMEOUT")]
    timeout: Option<u64>,

    /// Number of files queued for the engine at once.
    #[arg(short, long, env = "PDFRASTER_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Disable progress bar.
    #[arg(long, env = "PDFRASTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFRASTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFRASTER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.print_args && cli.timeout.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Engine info ──────────────────────────────────────────────────────
    if cli.engine_info {
        let rev = engine_revision().context("Failed to query Ghostscript")?;
        println!("Product:    {}", rev.product);
        println!("Version:    {}", rev.version_string());
        println!("Released:   {}", rev.revision_date);
        println!("Copyright:  {}", rev.copyright);
        return Ok(());
    }

    // ── Build settings and jobs ──────────────────────────────────────────
    let settings = build_settings(&cli).await?;
    let jobs = build_jobs(&cli, &settings)?;

    if cli.print_args {
        for job in &jobs {
            let args = build_arguments(&job.input, &job.output, &settings)
                .with_context(|| format!("Invalid settings for {}", job.input.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&args).context("Failed to serialise arguments")?
            );
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    if let Some(secs) = cli.timeout {
        let timeout = Duration::from_secs(secs);
        let mut failed = 0usize;
        for job in &jobs {
            match generate_output_with_timeout(&job.input, &job.output, &settings, timeout).await {
                Ok(()) => {
                    if !cli.quiet {
                        eprintln!("{} {}", green("✓"), job.output.display());
                    }
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}: {}", red("✗"), job.input.display(), e);
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} of {} files failed", jobs.len());
        }
        return Ok(());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let total = jobs.len();
    let report = convert_batch(jobs, &settings, cli.concurrency, progress)
        .await
        .context("Rasterisation failed")?;

    if !cli.quiet && !show_progress {
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(()) => eprintln!(
                    "{} {}  {}",
                    green("✓"),
                    outcome.job.output.display(),
                    dim(&format!("{}ms", outcome.elapsed_ms))
                ),
                Err(e) => eprintln!("{} {}: {}", red("✗"), outcome.job.input.display(), e),
            }
        }
    }

    if report.stats.failed > 0 {
        if let Some(first) = report.failures().next() {
            if let Err(ref e) = first.result {
                eprintln!("\n{}", e);
            }
        }
        anyhow::bail!("{} of {} files failed", report.stats.failed, total);
    }

    Ok(())
}

/// Map CLI args (or a settings file) to `ConversionSettings`.
async fn build_settings(cli: &Cli) -> Result<ConversionSettings> {
    let pages = parse_pages(&cli.pages)?;

    if let Some(ref path) = cli.settings {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let settings: ConversionSettings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings file {:?}", path))?;
        settings.validate().context("Invalid configuration")?;
        return Ok(settings);
    }

    if let Some(res) = cli.thumbs {
        let settings = thumb_settings(pages, res);
        settings.validate().context("Invalid configuration")?;
        return Ok(settings);
    }

    let mut builder = ConversionSettings::builder()
        .device(cli.device)
        .pages(pages)
        .resolution(cli.resolution.x, cli.resolution.y)
        .paper(cli.paper);

    if let Some(ref size) = cli.size {
        let size: PageSize = size.parse().context("Invalid --size")?;
        builder = builder.page_size(size);
    }

    builder.build().context("Invalid configuration")
}

/// The thumbnail preset over `pages`.
fn thumb_settings(pages: PageSelection, res: Resolution) -> ConversionSettings {
    ConversionSettings {
        pages,
        ..ConversionSettings::thumbnails(1, 1, res.x, res.y)
    }
}

/// Pair every input with its output path.
fn build_jobs(cli: &Cli, settings: &ConversionSettings) -> Result<Vec<BatchJob>> {
    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --out-dir for several");
    }

    let mut jobs = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        if !cli.print_args && !input.exists() {
            anyhow::bail!("Input not found: '{}'", input.display());
        }
        let output = match cli.output {
            Some(ref o) => o.clone(),
            None => derive_output_path(input, cli.out_dir.as_deref(), settings),
        };
        jobs.push(BatchJob::new(input.clone(), output));
    }
    Ok(jobs)
}

/// `dir/stem[-%d].ext`, with `-%d` when a raster device may write several pages.
fn derive_output_path(input: &Path, out_dir: Option<&Path>, settings: &ConversionSettings) -> PathBuf {
    let device = settings.device.unwrap_or(Device::Png16m);
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let single_page = matches!(settings.pages, PageSelection::Range { start, end } if start == end);
    let pattern = if device.is_raster() && !single_page {
        "-%d"
    } else {
        ""
    };

    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let mut out = dir.join(format!("{stem}{pattern}.{}", device.extension()));
    if out == input {
        out = dir.join(format!("{stem}-out.{}", device.extension()));
    }
    out
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::AllPages);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: u32 = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: u32 = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }

        return Ok(PageSelection::range(start, end));
    }

    // Single page: "5"
    let page: u32 = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_selections() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::AllPages);
        assert_eq!(parse_pages(" ALL ").unwrap(), PageSelection::AllPages);
        assert_eq!(parse_pages("4").unwrap(), PageSelection::range(4, 4));
        assert_eq!(parse_pages("3-9").unwrap(), PageSelection::range(3, 9));
        // end < start passes through; the engine renders from 5 onward
        assert_eq!(parse_pages("5-2").unwrap(), PageSelection::range(5, 2));
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("0-3").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn derived_paths_follow_device_and_pages() {
        let all = ConversionSettings::builder()
            .device(Device::Png16m)
            .dpi(72)
            .paper(PaperSize::Letter)
            .build()
            .unwrap();
        assert_eq!(
            derive_output_path(Path::new("docs/report.pdf"), None, &all),
            PathBuf::from("docs/report-%d.png")
        );

        let one = ConversionSettings {
            pages: PageSelection::single(2),
            device: Some(Device::Jpeg),
            ..all.clone()
        };
        assert_eq!(
            derive_output_path(Path::new("docs/report.pdf"), Some(Path::new("out")), &one),
            PathBuf::from("out/report.jpg")
        );

        let pdf = ConversionSettings {
            device: Some(Device::PdfWrite),
            ..all
        };
        assert_eq!(
            derive_output_path(Path::new("docs/report.pdf"), None, &pdf),
            PathBuf::from("docs/report-out.pdf")
        );
    }

    #[test]
    fn thumbs_cover_every_page_by_default() {
        let all = thumb_settings(PageSelection::AllPages, Resolution::new(40, 40));
        let args = build_arguments("in.pdf", "t-%d.jpg", &all).unwrap();
        assert!(args.iter().any(|a| a == "-dFirstPage=1"));
        assert!(!args.iter().any(|a| a.starts_with("-dLastPage")));
        assert!(args.iter().any(|a| a == "-sPAPERSIZE=a7"));

        let some = thumb_settings(PageSelection::range(2, 5), Resolution::new(40, 40));
        let args = build_arguments("in.pdf", "t-%d.jpg", &some).unwrap();
        assert!(args.iter().any(|a| a == "-dFirstPage=2"));
        assert!(args.iter().any(|a| a == "-dLastPage=5"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
