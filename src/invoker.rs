//! Serialized access to the single engine instance.
//!
//! Ghostscript allows one live interpreter instance per process. Every
//! invocation therefore runs the whole lifecycle
//!
//! ```text
//! Idle ─▶ InstanceCreated ─▶ Initialized | InitFailed ─▶ CleanedUp ─▶ Idle
//! ```
//!
//! while holding an [`EngineSlot`], a mutex shared by all invokers. The lock
//! is held from instance creation until after `delete_instance`, so no
//! intermediate state is visible to another caller.
//!
//! Cleanup runs from a drop guard: `exit` and `delete_instance` happen
//! exactly once per created instance on every path out of the critical
//! section, including a panic inside the engine call.
//!
//! There is no timeout here. A hung engine call blocks every other caller;
//! see [`crate::convert::generate_output_with_timeout`] for abandoning a
//! stuck worker.

use crate::args::{build_arguments, ArgumentSequence};
use crate::config::ConversionSettings;
use crate::engine::RasterEngine;
use crate::error::RasterError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The exclusive right to drive the engine.
///
/// Clones share the same lock. Use [`EngineSlot::process_wide`] for the real
/// Ghostscript library; a fresh [`EngineSlot::new`] is only appropriate for
/// engines that really do allow independent instances (e.g. test fakes).
#[derive(Debug, Clone, Default)]
pub struct EngineSlot(Arc<Mutex<()>>);

static PROCESS_SLOT: OnceLock<EngineSlot> = OnceLock::new();

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot shared by every invocation in this process.
    pub fn process_wide() -> Self {
        PROCESS_SLOT.get_or_init(EngineSlot::new).clone()
    }

    /// Whether another invocation currently holds the slot.
    pub fn is_busy(&self) -> bool {
        matches!(self.0.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Whether `self` and `other` guard the same engine.
    pub fn shares_lock_with(&self, other: &EngineSlot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        // A panic inside a previous lifecycle poisons the mutex, but its drop
        // guard already cleaned the instance up.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives one engine lifecycle per call, serialized through an [`EngineSlot`].
#[derive(Debug, Clone)]
pub struct SerializedInvoker<E: RasterEngine> {
    engine: E,
    slot: EngineSlot,
}

impl<E: RasterEngine> SerializedInvoker<E> {
    pub fn new(engine: E, slot: EngineSlot) -> Self {
        Self { engine, slot }
    }

    /// Invoker bound to the process-wide slot.
    pub fn with_process_slot(engine: E) -> Self {
        Self::new(engine, EngineSlot::process_wide())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn slot(&self) -> &EngineSlot {
        &self.slot
    }

    /// Run one create → init → exit → delete lifecycle with `args`.
    ///
    /// # Errors
    /// - [`RasterError::InvalidConfiguration`] if a token cannot be passed to C
    ///   (checked before the slot is taken)
    /// - [`RasterError::InstanceCreation`] if the engine refused an instance
    /// - [`RasterError::ExternalEngine`] if initialisation returned a negative
    ///   code; cleanup has already run
    pub fn invoke(&self, args: &ArgumentSequence) -> Result<(), RasterError> {
        let c_args = args.to_c_args()?;
        debug!("Engine arguments: {}", args);

        let waited = Instant::now();
        let _slot = self.slot.acquire();
        let started = Instant::now();
        debug!(
            "Acquired engine slot after {}ms",
            started.duration_since(waited).as_millis()
        );

        let instance = self
            .engine
            .create_instance()
            .map_err(|code| RasterError::InstanceCreation { code })?;
        let mut live = LiveInstance {
            engine: &self.engine,
            instance: Some(instance),
        };

        let code = live.init(&c_args);

        // exit + delete before the slot is released.
        drop(live);

        if code < 0 && !self.engine.is_normal_exit(code) {
            warn!("Engine initialisation failed with code {}", code);
            return Err(RasterError::ExternalEngine { code });
        }

        info!(
            "Engine run finished in {}ms",
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Validate `settings`, build the argument sequence and invoke the engine.
    pub fn generate_output(
        &self,
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        settings: &ConversionSettings,
    ) -> Result<(), RasterError> {
        let args = build_arguments(input_path, output_path, settings)?;
        self.invoke(&args)
    }

    /// JPEG thumbnails of pages `first_page..=last_page` at `width`×`height` DPI.
    pub fn generate_page_thumbs(
        &self,
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        first_page: u32,
        last_page: u32,
        width: u32,
        height: u32,
    ) -> Result<(), RasterError> {
        let settings = ConversionSettings::thumbnails(first_page, last_page, width, height);
        self.generate_output(input_path, output_path, &settings)
    }
}

/// An instance that is exited and deleted when dropped.
struct LiveInstance<'e, E: RasterEngine> {
    engine: &'e E,
    instance: Option<E::Instance>,
}

impl<E: RasterEngine> LiveInstance<'_, E> {
    fn init(&mut self, args: &[std::ffi::CString]) -> i32 {
        match self.instance.as_mut() {
            Some(instance) => {
                let code = self.engine.init_with_args(instance, args);
                debug!("Engine initialised with code {}", code);
                code
            }
            None => gsapi_loader::GS_ERROR_FATAL,
        }
    }
}

impl<E: RasterEngine> Drop for LiveInstance<'_, E> {
    fn drop(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            let code = self.engine.exit(&mut instance);
            if code < 0 {
                warn!("Engine exit returned code {}", code);
            }
            self.engine.delete_instance(instance);
            debug!("Engine instance cleaned up");
        }
    }
}
