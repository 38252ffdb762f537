//! Debounced background persistence.
//!
//! # Responsibility
//! - Coalesce bursts of mutations into one save after a quiet period.
//! - Offer an immediate, synchronous save for explicit save requests.
//!
//! # Invariants
//! - Every `trigger` restarts the quiet period.
//! - At most one save runs at a time; worker flushes and `save_now` are
//!   serialized on the saver lock.
//! - A failed save stays pending and is retried after the next quiet period.
//! - Dropping stops the worker without a final flush; call `save_now` first
//!   when pending changes must be kept.

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::error::Error;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type SaveError = Box<dyn Error + Send + Sync>;
pub type SaveFn = Box<dyn FnMut() -> Result<(), SaveError> + Send>;

#[derive(Debug, Default)]
struct State {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    saver: Mutex<SaveFn>,
    debounce: Duration,
}

impl Shared {
    fn flush(&self) -> Result<(), SaveError> {
        let started_at = Instant::now();
        let mut saver = self.saver.lock();
        let result = (saver)();
        match &result {
            Ok(()) => debug!(
                "event=autosave_flush module=autosave status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=autosave_flush module=autosave status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn rearm(&self, state: &mut State) {
        if state.deadline.is_none() && !state.shutdown {
            state.deadline = Some(Instant::now() + self.debounce);
        }
    }
}

pub struct Autosave {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Autosave {
    /// Starts the worker thread. `saver` persists the current state.
    pub fn new(debounce: Duration, saver: SaveFn) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            saver: Mutex::new(saver),
            debounce,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("oeannotator-autosave".to_string())
            .spawn(move || run_worker(&worker_shared))?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Marks state dirty and restarts the quiet period.
    pub fn trigger(&self) {
        let mut state = self.shared.state.lock();
        state.deadline = Some(Instant::now() + self.shared.debounce);
        self.shared.wake.notify_one();
    }

    /// Saves immediately, dropping any pending debounced save.
    ///
    /// # Errors
    /// Returns the saver's error; the save stays pending and is retried by
    /// the worker after the next quiet period.
    pub fn save_now(&self) -> Result<(), SaveError> {
        self.shared.state.lock().deadline = None;
        let result = self.shared.flush();
        if result.is_err() {
            let mut state = self.shared.state.lock();
            self.shared.rearm(&mut state);
            self.shared.wake.notify_one();
        }
        result
    }

    /// Drops a pending save without running it.
    pub fn cancel(&self) {
        self.shared.state.lock().deadline = None;
        self.shared.wake.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("event=autosave_stop module=autosave status=error error=worker_panicked");
            }
        }
    }
}

fn run_worker(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        match state.deadline {
            None => shared.wake.wait(&mut state),
            Some(deadline) if Instant::now() < deadline => {
                let _ = shared.wake.wait_until(&mut state, deadline);
            }
            Some(_) => {
                state.deadline = None;
                let result = MutexGuard::unlocked(&mut state, || shared.flush());
                if result.is_err() {
                    shared.rearm(&mut state);
                }
            }
        }
    }
}
