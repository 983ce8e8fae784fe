#![allow(dead_code)]

pub mod demo_registry;

use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

pub use demo_registry::DemoRegistryService;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub fn task(f: impl FnOnce() + Send + 'static) -> Task {
    Box::new(f)
}

/// Install a test subscriber once; `RUST_LOG=metalock=trace` shows lock transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Records actions from many threads in the order they happen.
#[derive(Default)]
pub struct Auditor {
    actions: Mutex<Vec<String>>,
}

impl Auditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, action: impl Into<String>) {
        self.actions.lock().unwrap().push(action.into());
    }

    /// Return everything recorded so far and start over.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.actions.lock().unwrap())
    }
}

/// Start each task on its own thread, waiting `start_gap` after each thread
/// is up before starting the next, then wait for all of them.
///
/// With a gap shorter than the tasks' work time, tasks overlap unless
/// something serializes them:
///
/// ```text
/// task 1: |run|___work___|end|
/// task 2: |_gap_|run|___work___|end|
/// ```
pub fn run_concurrent(start_gap: Duration, tasks: Vec<Task>) {
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let (tx_started, rx_started) = mpsc::channel();
        handles.push(thread::spawn(move || {
            tx_started.send(()).unwrap();
            task();
        }));
        rx_started.recv().unwrap();
        thread::sleep(start_gap);
    }

    for handle in handles {
        if let Err(panic) = handle.join() {
            std::panic::resume_unwind(panic);
        }
    }
}
