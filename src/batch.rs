//! Convert several inputs with one set of settings.
//!
//! Jobs are dispatched onto Tokio's blocking pool, `concurrency` at a time.
//! They still pass through the engine one by one (the engine slot sees to
//! that); concurrency only decides how many workers queue for it, so a
//! value above 1 overlaps argument building and bookkeeping with the
//! running job. One failing job does not stop the others.

use crate::args::build_arguments;
use crate::config::ConversionSettings;
use crate::convert::default_invoker;
use crate::engine::RasterEngine;
use crate::error::RasterError;
use crate::invoker::SerializedInvoker;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One input/output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl BatchJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Result of a single job.
#[derive(Debug)]
pub struct BatchOutcome {
    /// 0-based position in the submitted job list.
    pub index: usize,
    pub job: BatchJob,
    pub result: Result<(), RasterError>,
    pub elapsed_ms: u64,
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Everything [`convert_batch`] produces, outcomes in submission order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Run `jobs` through the process-wide Ghostscript engine.
///
/// # Errors
/// Returns `Err` only when nothing can run at all: invalid `settings` or an
/// unavailable engine. Per-job failures are reported in [`BatchReport`].
pub async fn convert_batch(
    jobs: Vec<BatchJob>,
    settings: &ConversionSettings,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, RasterError> {
    settings.validate()?;
    let invoker = Arc::new(default_invoker()?);
    Ok(convert_batch_with(invoker, jobs, settings, concurrency, progress).await)
}

/// [`convert_batch`] against a caller-supplied invoker.
pub async fn convert_batch_with<E>(
    invoker: Arc<SerializedInvoker<E>>,
    jobs: Vec<BatchJob>,
    settings: &ConversionSettings,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> BatchReport
where
    E: RasterEngine + 'static,
{
    let started = Instant::now();
    let total = jobs.len();
    info!("Starting batch of {} jobs", total);

    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    let mut outcomes: Vec<BatchOutcome> = stream::iter(jobs.into_iter().enumerate().map(
        |(index, job)| {
            let invoker = Arc::clone(&invoker);
            let progress = progress.clone();
            let settings = settings.clone();
            async move { run_job(invoker, index, total, job, settings, progress).await }
        },
    ))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    outcomes.sort_by_key(|o| o.index);

    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    let stats = BatchStats {
        total_jobs: total,
        succeeded,
        failed: total - succeeded,
        total_duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} jobs, {}ms total",
        succeeded, total, stats.total_duration_ms
    );

    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }

    BatchReport { outcomes, stats }
}

async fn run_job<E>(
    invoker: Arc<SerializedInvoker<E>>,
    index: usize,
    total: usize,
    job: BatchJob,
    settings: ConversionSettings,
    progress: Option<ProgressCallback>,
) -> BatchOutcome
where
    E: RasterEngine + 'static,
{
    if let Some(ref cb) = progress {
        cb.on_job_start(index, total, &job.input);
    }

    let input = job.input.clone();
    let output = job.output.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let t = Instant::now();
        let result = build_arguments(&input, &output, &settings).and_then(|args| invoker.invoke(&args));
        (result, t.elapsed().as_millis() as u64)
    })
    .await;

    let (result, elapsed_ms) = match joined {
        Ok(pair) => pair,
        Err(e) => (
            Err(RasterError::Internal(format!("Batch worker panicked: {}", e))),
            0,
        ),
    };

    match &result {
        Ok(()) => {
            if let Some(ref cb) = progress {
                cb.on_job_complete(index, total, &job.input, elapsed_ms);
            }
        }
        Err(e) => {
            warn!("Job {} ({}) failed: {}", index + 1, job.input.display(), e);
            if let Some(ref cb) = progress {
                cb.on_job_error(index, total, &job.input, &e.to_string());
            }
        }
    }

    BatchOutcome {
        index,
        job,
        result,
        elapsed_ms,
    }
}
