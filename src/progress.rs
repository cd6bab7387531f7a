//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] into
//! [`crate::batch::convert_batch`] to receive events as each job passes
//! through the engine.
//!
//! Jobs are serialized on the engine slot, but several workers may be
//! started and waiting for it at once. Callbacks arrive on different
//! blocking-pool threads, so implementations must be `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use pdfraster::BatchProgressCallback;
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_job_complete(&self, index: usize, total: usize, input: &Path, _elapsed_ms: u64) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total}: {} (job {index})", input.display());
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::batch::convert_batch`] as jobs are processed.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is the 0-based position in the job list.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any job runs.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a job's worker starts, before it waits for the engine slot.
    fn on_job_start(&self, index: usize, total_jobs: usize, input: &Path) {
        let _ = (index, total_jobs, input);
    }

    /// Called when the engine finished a job successfully.
    fn on_job_complete(&self, index: usize, total_jobs: usize, input: &Path, elapsed_ms: u64) {
        let _ = (index, total_jobs, input, elapsed_ms);
    }

    /// Called when a job failed validation or the engine reported an error.
    fn on_job_error(&self, index: usize, total_jobs: usize, input: &Path, error: &str) {
        let _ = (index, total_jobs, input, error);
    }

    /// Called once after every job has been attempted.
    fn on_batch_complete(&self, total_jobs: usize, success_count: usize) {
        let _ = (total_jobs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared callback handle as accepted by [`crate::batch::convert_batch`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
