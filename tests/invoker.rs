//! Lifecycle and serialization tests for `SerializedInvoker`.
//!
//! These use a recording fake engine, so they need neither Ghostscript nor
//! any input files.

use pdfraster::{
    convert_batch_with, BatchJob, BatchProgressCallback, ConversionSettings, Device, EngineSlot,
    PageSelection, PaperSize, ProgressCallback, RasterEngine, RasterError, SerializedInvoker,
};
use std::ffi::CString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Create(usize),
    Init(usize),
    Exit(usize),
    Delete(usize),
}

#[derive(Default)]
struct RecordingEngine {
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    init_code: i32,
    create_code: Option<i32>,
    init_delay: Duration,
    panic_on_init: AtomicBool,
    quit_is_normal: bool,
    last_args: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, e: Event) {
        self.events.lock().unwrap().push(e);
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl RasterEngine for RecordingEngine {
    type Instance = usize;

    fn create_instance(&self) -> Result<usize, i32> {
        if let Some(code) = self.create_code {
            return Err(code);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.record(Event::Create(id));
        Ok(id)
    }

    fn init_with_args(&self, instance: &mut usize, args: &[CString]) -> i32 {
        self.record(Event::Init(*instance));
        *self.last_args.lock().unwrap() = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        if self.panic_on_init.swap(false, Ordering::SeqCst) {
            panic!("engine crashed");
        }
        std::thread::sleep(self.init_delay);
        self.init_code
    }

    fn exit(&self, instance: &mut usize) -> i32 {
        self.record(Event::Exit(*instance));
        0
    }

    fn delete_instance(&self, instance: usize) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.record(Event::Delete(instance));
    }

    fn is_normal_exit(&self, code: i32) -> bool {
        self.quit_is_normal && code == -101
    }
}

fn settings() -> ConversionSettings {
    ConversionSettings::builder()
        .device(Device::Jpeg)
        .pages(PageSelection::AllPages)
        .dpi(150)
        .paper(PaperSize::A4)
        .build()
        .unwrap()
}

/// Every lifecycle must be a contiguous Create → Init → Exit → Delete of one id.
fn assert_non_interleaved(events: &[Event]) {
    assert_eq!(events.len() % 4, 0, "incomplete lifecycle: {events:?}");
    for chunk in events.chunks(4) {
        let Event::Create(id) = chunk[0] else {
            panic!("lifecycle must start with Create: {chunk:?}");
        };
        assert_eq!(
            chunk,
            [Event::Create(id), Event::Init(id), Event::Exit(id), Event::Delete(id)],
            "interleaved lifecycle"
        );
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn successful_call_passes_arguments_and_cleans_up() {
    let invoker = SerializedInvoker::new(RecordingEngine::default(), EngineSlot::new());
    invoker
        .generate_output("in.pdf", "out.jpg", &settings())
        .expect("fake engine succeeds");

    let engine = invoker.engine();
    assert_eq!(
        engine.events(),
        [Event::Create(0), Event::Init(0), Event::Exit(0), Event::Delete(0)]
    );

    let args = engine.last_args.lock().unwrap().clone();
    assert_eq!(
        &args[args.len() - 7..],
        [
            "-sDEVICE=jpeg",
            "-dFirstPage=1",
            "-sPAPERSIZE=a4",
            "-dDEVICEXRESOLUTION=150",
            "-dDEVICEYRESOLUTION=150",
            "-sOutputFile=out.jpg",
            "in.pdf",
        ]
    );
}

#[test]
fn negative_init_code_is_reported_after_single_cleanup() {
    let engine = RecordingEngine {
        init_code: -100,
        ..Default::default()
    };
    let invoker = SerializedInvoker::new(engine, EngineSlot::new());

    let err = invoker
        .generate_output("broken.pdf", "out.jpg", &settings())
        .unwrap_err();

    assert!(matches!(err, RasterError::ExternalEngine { code: -100 }), "got {err:?}");
    let engine = invoker.engine();
    assert_eq!(engine.count(|e| matches!(e, Event::Exit(_))), 1);
    assert_eq!(engine.count(|e| matches!(e, Event::Delete(_))), 1);
    assert!(!invoker.slot().is_busy());
}

#[test]
fn normal_quit_code_counts_as_success() {
    let engine = RecordingEngine {
        init_code: -101,
        quit_is_normal: true,
        ..Default::default()
    };
    let invoker = SerializedInvoker::new(engine, EngineSlot::new());
    assert!(invoker.generate_output("in.pdf", "out.jpg", &settings()).is_ok());
}

#[test]
fn refused_instance_skips_cleanup() {
    let engine = RecordingEngine {
        create_code: Some(-100),
        ..Default::default()
    };
    let invoker = SerializedInvoker::new(engine, EngineSlot::new());

    let err = invoker
        .generate_output("in.pdf", "out.jpg", &settings())
        .unwrap_err();

    assert!(matches!(err, RasterError::InstanceCreation { code: -100 }));
    assert!(invoker.engine().events().is_empty());
}

#[test]
fn validation_failure_never_reaches_engine() {
    let invoker = SerializedInvoker::new(RecordingEngine::default(), EngineSlot::new());
    let mut bad = settings();
    bad.pages = PageSelection::range(0, 5);

    let err = invoker.generate_output("in.pdf", "out.jpg", &bad).unwrap_err();

    assert!(matches!(err, RasterError::InvalidConfiguration(ref m) if m == "page range required"));
    assert!(invoker.engine().events().is_empty());
}

#[test]
fn panic_inside_engine_still_cleans_up_and_releases_slot() {
    let engine = RecordingEngine {
        panic_on_init: AtomicBool::new(true),
        ..Default::default()
    };
    let invoker = SerializedInvoker::new(engine, EngineSlot::new());

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        invoker.generate_output("in.pdf", "out.jpg", &settings())
    }));
    assert!(caught.is_err());
    assert_eq!(
        invoker.engine().events(),
        [Event::Create(0), Event::Init(0), Event::Exit(0), Event::Delete(0)]
    );

    // The poisoned slot is usable again.
    invoker
        .generate_output("in.pdf", "out.jpg", &settings())
        .expect("second call succeeds");
    assert_non_interleaved(&invoker.engine().events());
}

// ── Serialization ────────────────────────────────────────────────────────────

#[test]
fn concurrent_calls_never_overlap() {
    let engine = RecordingEngine {
        init_delay: Duration::from_millis(5),
        ..Default::default()
    };
    let invoker = SerializedInvoker::new(engine, EngineSlot::new());
    let s = settings();

    std::thread::scope(|scope| {
        for t in 0..8 {
            let invoker = &invoker;
            let s = &s;
            scope.spawn(move || {
                for i in 0..3 {
                    invoker
                        .generate_output(format!("in-{t}-{i}.pdf"), "out.jpg", s)
                        .expect("fake engine succeeds");
                }
            });
        }
    });

    let engine = invoker.engine();
    assert_eq!(engine.max_live.load(Ordering::SeqCst), 1);
    let events = engine.events();
    assert_eq!(events.len(), 8 * 3 * 4);
    assert_non_interleaved(&events);
}

#[test]
fn invokers_sharing_a_slot_are_serialized_together() {
    let slot = EngineSlot::new();
    let engine = Arc::new(RecordingEngine {
        init_delay: Duration::from_millis(3),
        ..Default::default()
    });

    struct Shared(Arc<RecordingEngine>);

    impl RasterEngine for Shared {
        type Instance = usize;
        fn create_instance(&self) -> Result<usize, i32> {
            self.0.create_instance()
        }
        fn init_with_args(&self, i: &mut usize, a: &[CString]) -> i32 {
            self.0.init_with_args(i, a)
        }
        fn exit(&self, i: &mut usize) -> i32 {
            self.0.exit(i)
        }
        fn delete_instance(&self, i: usize) {
            self.0.delete_instance(i)
        }
    }

    let a = SerializedInvoker::new(Shared(Arc::clone(&engine)), slot.clone());
    let b = SerializedInvoker::new(Shared(Arc::clone(&engine)), slot);
    assert!(a.slot().shares_lock_with(b.slot()));

    let s = settings();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| a.generate_output("a.pdf", "a.jpg", &s).unwrap());
            scope.spawn(|| b.generate_output("b.pdf", "b.jpg", &s).unwrap());
        }
    });

    assert_eq!(engine.max_live.load(Ordering::SeqCst), 1);
    assert_non_interleaved(&engine.events());
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    finished_with: Mutex<Option<(usize, usize)>>,
}

impl BatchProgressCallback for CountingProgress {
    fn on_job_start(&self, _index: usize, _total: usize, _input: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_complete(&self, _index: usize, _total: usize, _input: &Path, _elapsed_ms: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_error(&self, _index: usize, _total: usize, _input: &Path, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, total: usize, success: usize) {
        *self.finished_with.lock().unwrap() = Some((total, success));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_reports_each_job_in_submission_order() {
    let invoker = Arc::new(SerializedInvoker::new(
        RecordingEngine {
            init_delay: Duration::from_millis(2),
            ..Default::default()
        },
        EngineSlot::new(),
    ));
    let progress = Arc::new(CountingProgress::default());

    let jobs = vec![
        BatchJob::new("a.pdf", "a-%d.jpg"),
        // Interior NUL: rejected before the engine slot is taken.
        BatchJob::new("b\0.pdf", "b-%d.jpg"),
        BatchJob::new("c.pdf", "c-%d.jpg"),
        BatchJob::new("d.pdf", "d-%d.jpg"),
    ];

    let report = convert_batch_with(
        Arc::clone(&invoker),
        jobs,
        &settings(),
        3,
        Some(progress.clone() as ProgressCallback),
    )
    .await;

    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, [0, 1, 2, 3]);
    assert_eq!(report.stats.total_jobs, 4);
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.failed, 1);
    assert!(matches!(
        report.outcomes[1].result,
        Err(RasterError::InvalidConfiguration(_))
    ));
    assert_eq!(report.failures().count(), 1);

    assert_eq!(progress.started.load(Ordering::SeqCst), 4);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 3);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
    assert_eq!(*progress.finished_with.lock().unwrap(), Some((4, 3)));

    assert_eq!(invoker.engine().max_live.load(Ordering::SeqCst), 1);
    assert_non_interleaved(&invoker.engine().events());
}
