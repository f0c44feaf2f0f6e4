use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use redi_core::{
    Clock, Dom, FrameClock, MemoryDom, NodeId, Runtime, RuntimeError, RuntimeHandle,
    RuntimeScheduler, SharedDom,
};

const MAX_PUMP_ITERATIONS: usize = 1_000;

/// Scheduler that only records requests. Tests decide when the host "turns"
/// the microtask queue or renders a frame.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    microtask_requests: AtomicUsize,
    frame_requests: AtomicUsize,
    microtask_pending: AtomicBool,
    frame_pending: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total microtask turns requested since creation.
    pub fn microtask_requests(&self) -> usize {
        self.microtask_requests.load(Ordering::SeqCst)
    }

    /// Total frames requested since creation.
    pub fn frame_requests(&self) -> usize {
        self.frame_requests.load(Ordering::SeqCst)
    }

    pub fn take_microtask_request(&self) -> bool {
        self.microtask_pending.swap(false, Ordering::SeqCst)
    }

    pub fn take_frame_request(&self) -> bool {
        self.frame_pending.swap(false, Ordering::SeqCst)
    }
}

impl RuntimeScheduler for ManualScheduler {
    fn schedule_microtask(&self) {
        self.microtask_requests.fetch_add(1, Ordering::SeqCst);
        self.microtask_pending.store(true, Ordering::SeqCst);
    }

    fn schedule_frame(&self) {
        self.frame_requests.fetch_add(1, Ordering::SeqCst);
        self.frame_pending.store(true, Ordering::SeqCst);
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: f64) -> Self {
        Self {
            bits: AtomicU64::new(start_millis.to_bits()),
        }
    }

    pub fn set(&self, millis: f64) {
        self.bits.store(millis.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, millis: f64) -> f64 {
        let now = self.now_millis() + millis;
        self.set(now);
        now
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Headless harness for exercising components in tests.
///
/// `Harness` owns a runtime driven by a [`ManualScheduler`] and a
/// [`ManualClock`], an in-memory DOM and a root element to mount into.
/// Nothing runs until the test pumps microtasks or advances frames, so every
/// intermediate state is observable.
pub struct Harness {
    scheduler: Arc<ManualScheduler>,
    clock: Arc<ManualClock>,
    runtime: Runtime,
    dom: Rc<RefCell<MemoryDom>>,
    root: NodeId,
}

impl Harness {
    /// Create a harness whose clock starts at zero.
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(start_millis: f64) -> Self {
        let scheduler = Arc::new(ManualScheduler::new());
        let clock = Arc::new(ManualClock::new(start_millis));
        let runtime = Runtime::with_clock(scheduler.clone(), clock.clone());
        let dom = MemoryDom::shared();
        let root = dom.borrow_mut().create_element("body");
        Self {
            scheduler,
            clock,
            runtime,
            dom,
            root,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn frame_clock(&self) -> FrameClock {
        self.runtime.frame_clock()
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn now(&self) -> f64 {
        self.clock.now_millis()
    }

    /// The in-memory DOM, for inspection.
    pub fn dom(&self) -> Rc<RefCell<MemoryDom>> {
        self.dom.clone()
    }

    /// The same DOM behind the trait object fragments render into.
    pub fn shared_dom(&self) -> SharedDom {
        self.dom.clone()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Run one host microtask turn if one was requested.
    pub fn run_microtasks(&self) -> Result<bool, RuntimeError> {
        if !self.scheduler.take_microtask_request() {
            return Ok(false);
        }
        self.runtime.run_microtasks()?;
        Ok(true)
    }

    /// Drive microtask turns until no more are requested.
    pub fn pump_until_idle(&self) -> Result<(), RuntimeError> {
        for _ in 0..MAX_PUMP_ITERATIONS {
            let requested = self.scheduler.take_microtask_request();
            if !requested && !self.runtime.has_pending_microtasks() {
                return Ok(());
            }
            self.runtime.run_microtasks()?;
        }
        log::warn!("microtask queue still busy after {MAX_PUMP_ITERATIONS} turns");
        Ok(())
    }

    /// Drain pending microtasks, move the clock forward by `millis`, render
    /// one frame at the new time and process any resulting work until idle.
    pub fn advance_frame(&self, millis: f64) -> Result<(), RuntimeError> {
        self.pump_until_idle()?;
        self.clock.advance(millis);
        self.scheduler.take_frame_request();
        self.runtime.run_frame();
        self.pump_until_idle()
    }

    /// Render frames every `step` milliseconds until `total` has elapsed.
    pub fn advance_by(&self, total: f64, step: f64) -> Result<(), RuntimeError> {
        let step = if step > 0.0 { step } else { total.max(1.0) };
        let mut elapsed = 0.0;
        while elapsed < total {
            let delta = step.min(total - elapsed);
            self.advance_frame(delta)?;
            elapsed += delta;
        }
        Ok(())
    }

    /// Render frames until nothing asks for another one.
    pub fn run_frames_until_idle(&self, step: f64) -> Result<usize, RuntimeError> {
        let mut frames = 0;
        while self.runtime.needs_frame() && frames < MAX_PUMP_ITERATIONS {
            self.advance_frame(step)?;
            frames += 1;
        }
        Ok(frames)
    }

    /// Poll `future` to completion, pumping microtasks between polls. Returns
    /// `None` if it is still pending once the runtime is idle.
    pub fn block_on<F: Future>(&self, future: F) -> Result<Option<F::Output>, RuntimeError> {
        let waker = futures_task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future);
        for _ in 0..MAX_PUMP_ITERATIONS {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(Some(output));
            }
            let requested = self.scheduler.take_microtask_request();
            if !requested && !self.runtime.has_pending_microtasks() {
                return Ok(None);
            }
            self.runtime.run_microtasks()?;
        }
        Ok(None)
    }

    /// Concatenated text under the root element.
    pub fn text(&self) -> String {
        self.dom.borrow().text_content(self.root)
    }

    pub fn dump_tree(&self) -> String {
        self.dom.borrow().dump_tree(self.root)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
