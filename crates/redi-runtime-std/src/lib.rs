//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform abstraction
//! traits defined in `redi-core`. A host event loop owns a [`StdRuntime`],
//! polls [`StdRuntime::take_microtask_request`] after every task it runs and
//! [`StdRuntime::take_frame_request`] once per display frame.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use redi_core::{Clock, FrameClock, Runtime, RuntimeError, RuntimeHandle, RuntimeScheduler};
use web_time::Instant;

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records requests in atomic flags and optionally pokes the
/// host's event loop.
pub struct StdScheduler {
    microtask_requested: AtomicBool,
    frame_requested: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            microtask_requested: AtomicBool::new(false),
            frame_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether a microtask turn has been requested since the last call.
    pub fn take_microtask_request(&self) -> bool {
        self.microtask_requested.swap(false, Ordering::SeqCst)
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever a microtask or frame is requested.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        match self.waker.write() {
            Ok(mut slot) => *slot = Some(Arc::new(waker)),
            Err(_) => log::warn!("scheduler waker lock poisoned; waker not installed"),
        }
    }

    pub fn clear_waker(&self) {
        if let Ok(mut slot) = self.waker.write() {
            *slot = None;
        }
    }

    fn wake(&self) {
        let waker = self.waker.read().ok().and_then(|slot| slot.clone());
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "microtask_requested",
                &self.microtask_requested.load(Ordering::SeqCst),
            )
            .field(
                "frame_requested",
                &self.frame_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_microtask(&self) {
        self.microtask_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn schedule_frame(&self) {
        self.frame_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Monotonic clock measuring milliseconds since its creation.
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_millis(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Convenience container bundling the standard scheduler and clock.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    clock: Arc<StdClock>,
    runtime: Runtime,
}

impl StdRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let clock = Arc::new(StdClock::new());
        let runtime = Runtime::with_clock(scheduler.clone(), clock.clone());
        Self {
            scheduler,
            clock,
            runtime,
        }
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn frame_clock(&self) -> FrameClock {
        self.runtime.frame_clock()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> Arc<StdClock> {
        Arc::clone(&self.clock)
    }

    pub fn take_microtask_request(&self) -> bool {
        self.scheduler.take_microtask_request()
    }

    pub fn take_frame_request(&self) -> bool {
        self.scheduler.take_frame_request()
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// Runs the microtask queue if a turn was requested. Returns whether it ran.
    pub fn pump_microtasks(&self) -> Result<bool, RuntimeError> {
        if !self.take_microtask_request() {
            return Ok(false);
        }
        self.runtime.run_microtasks()?;
        Ok(true)
    }

    /// Runs pending frame callbacks if a frame was requested, then any
    /// microtasks they queued. Returns whether a frame ran.
    pub fn pump_frame(&self) -> Result<bool, RuntimeError> {
        if !self.take_frame_request() {
            return Ok(false);
        }
        self.runtime.run_frame();
        self.pump_microtasks()?;
        Ok(true)
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
