use crate::collections::map::HashMap;
use crate::collections::map::HashSet;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread_local;

use crate::component::Component;
use crate::frame_clock::FrameClock;
use crate::outro::OutroGroup;
use crate::platform::{Clock, FrozenClock, RuntimeScheduler};
use crate::{FrameCallbackId, RuntimeError};

/// Where the update scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing pending.
    Idle,
    /// A flush microtask has been requested but has not run yet.
    Batched,
    /// A drain is in progress. Invalidations extend the current drain.
    Draining,
}

/// A shared zero-argument callback. Two callbacks are the same callback when
/// they share an allocation.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn()>);

impl Callback {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Callback(Rc::new(f))
    }

    /// Wraps a closure that can only run once. Later calls do nothing.
    pub fn once(f: impl FnOnce() + 'static) -> Self {
        let slot = RefCell::new(Some(f));
        Callback::new(move || {
            let f = slot.borrow_mut().take();
            if let Some(f) = f {
                f();
            }
        })
    }

    pub fn call(&self) {
        (self.0)()
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:#x})", self.id())
    }
}

enum Microtask {
    Flush,
    Task(Box<dyn FnOnce() + 'static>),
}

struct TaskEntry {
    id: u64,
    future: Pin<Box<dyn Future<Output = ()> + 'static>>,
}

pub(crate) struct FrameCallbackEntry {
    id: FrameCallbackId,
    callback: Option<Box<dyn FnOnce(f64) + 'static>>,
}

pub(crate) struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    clock: Arc<dyn Clock>,
    state: Cell<SchedulerState>,
    update_scheduled: Cell<bool>,
    dirty_components: RefCell<Vec<Component>>,
    flush_index: Cell<usize>,
    binding_callbacks: RefCell<Vec<Callback>>,
    render_callbacks: RefCell<Vec<Callback>>,
    flush_callbacks: RefCell<Vec<Callback>>,
    // Seen callbacks are kept alive until the drain ends so their addresses
    // cannot be reused by a callback created mid-drain.
    seen_callbacks: RefCell<HashMap<usize, Callback>>,
    seen_bindings: RefCell<HashMap<usize, Callback>>,
    flush_generation: Cell<u64>,
    flush_waiters: RefCell<Vec<Waker>>,
    microtasks: RefCell<VecDeque<Microtask>>,
    microtask_requested: Cell<bool>,
    tasks: RefCell<Vec<TaskEntry>>,
    next_task_id: Cell<u64>,
    task_waker: RefCell<Option<Waker>>,
    poll_requested: Arc<AtomicBool>,
    needs_frame: Cell<bool>,
    frame_callbacks: RefCell<VecDeque<FrameCallbackEntry>>,
    next_frame_callback_id: Cell<u64>,
    component_stack: RefCell<Vec<Component>>,
    pub(crate) outros: RefCell<Option<OutroGroup>>,
    pub(crate) outroing: RefCell<HashSet<usize>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            scheduler,
            clock,
            state: Cell::new(SchedulerState::Idle),
            update_scheduled: Cell::new(false),
            dirty_components: RefCell::new(Vec::new()),
            flush_index: Cell::new(0),
            binding_callbacks: RefCell::new(Vec::new()),
            render_callbacks: RefCell::new(Vec::new()),
            flush_callbacks: RefCell::new(Vec::new()),
            seen_callbacks: RefCell::new(HashMap::default()),
            seen_bindings: RefCell::new(HashMap::default()),
            flush_generation: Cell::new(0),
            flush_waiters: RefCell::new(Vec::new()),
            microtasks: RefCell::new(VecDeque::new()),
            microtask_requested: Cell::new(false),
            tasks: RefCell::new(Vec::new()),
            next_task_id: Cell::new(1),
            task_waker: RefCell::new(None),
            poll_requested: Arc::new(AtomicBool::new(false)),
            needs_frame: Cell::new(false),
            frame_callbacks: RefCell::new(VecDeque::new()),
            next_frame_callback_id: Cell::new(1),
            component_stack: RefCell::new(Vec::new()),
            outros: RefCell::new(None),
            outroing: RefCell::new(HashSet::default()),
        }
    }

    fn init_task_waker(&self) {
        let waker = RuntimeTaskWaker {
            scheduler: self.scheduler.clone(),
            poll_requested: self.poll_requested.clone(),
        }
        .into_waker();
        *self.task_waker.borrow_mut() = Some(waker);
    }

    fn request_microtask(&self) {
        if !self.microtask_requested.replace(true) {
            self.scheduler.schedule_microtask();
        }
    }

    fn queue_microtask(&self, task: Box<dyn FnOnce() + 'static>) {
        self.microtasks.borrow_mut().push_back(Microtask::Task(task));
        self.request_microtask();
    }

    fn schedule_update(&self) {
        if self.update_scheduled.replace(true) {
            return;
        }
        if self.state.get() == SchedulerState::Idle {
            self.state.set(SchedulerState::Batched);
        }
        self.microtasks.borrow_mut().push_back(Microtask::Flush);
        self.request_microtask();
    }

    fn enqueue_dirty(&self, component: Component) {
        self.dirty_components.borrow_mut().push(component);
        self.schedule_update();
    }

    fn add_render_callback(&self, callback: Callback) {
        self.render_callbacks.borrow_mut().push(callback);
        self.schedule_update();
    }

    fn add_binding_callback(&self, callback: Callback) {
        self.binding_callbacks.borrow_mut().push(callback);
        self.schedule_update();
    }

    fn add_flush_callback(&self, callback: Callback) {
        self.flush_callbacks.borrow_mut().push(callback);
    }

    fn next_dirty_component(&self) -> Option<Component> {
        let index = self.flush_index.get();
        let next = self.dirty_components.borrow().get(index).cloned();
        if next.is_some() {
            self.flush_index.set(index + 1);
        }
        next
    }

    fn flush(&self) -> Result<(), RuntimeError> {
        if self.state.get() == SchedulerState::Draining {
            return Ok(());
        }
        self.state.set(SchedulerState::Draining);
        let mut rounds = 0usize;
        let mut patched = 0usize;
        loop {
            rounds += 1;
            while let Some(component) = self.next_dirty_component() {
                self.component_stack.borrow_mut().push(component.clone());
                let result = component.update();
                self.component_stack.borrow_mut().pop();
                if let Err(err) = result {
                    log::error!("component {} failed to patch: {err}", component.id());
                    self.abort_drain();
                    return Err(err);
                }
                patched += 1;
            }
            self.dirty_components.borrow_mut().clear();
            self.flush_index.set(0);

            loop {
                let next = self.binding_callbacks.borrow_mut().pop();
                let Some(callback) = next else {
                    break;
                };
                let first_time = self
                    .seen_bindings
                    .borrow_mut()
                    .insert(callback.id(), callback.clone())
                    .is_none();
                if first_time {
                    callback.call();
                }
            }

            let mut index = 0;
            loop {
                let next = self.render_callbacks.borrow().get(index).cloned();
                let Some(callback) = next else {
                    break;
                };
                index += 1;
                let first_time = self
                    .seen_callbacks
                    .borrow_mut()
                    .insert(callback.id(), callback.clone())
                    .is_none();
                if first_time {
                    callback.call();
                }
            }
            self.render_callbacks.borrow_mut().clear();

            if self.dirty_components.borrow().is_empty() {
                break;
            }
        }

        loop {
            let next = self.flush_callbacks.borrow_mut().pop();
            match next {
                Some(callback) => callback.call(),
                None => break,
            }
        }

        self.finish_drain();
        log::debug!("drain finished after {rounds} round(s), {patched} patch(es)");
        Ok(())
    }

    fn finish_drain(&self) {
        self.seen_callbacks.borrow_mut().clear();
        self.seen_bindings.borrow_mut().clear();
        self.update_scheduled.set(false);
        self.microtasks
            .borrow_mut()
            .retain(|task| !matches!(task, Microtask::Flush));
        self.state.set(SchedulerState::Idle);
        self.wake_flush_waiters();
        let pending_work =
            !self.dirty_components.borrow().is_empty() || !self.binding_callbacks.borrow().is_empty();
        if pending_work {
            self.schedule_update();
        }
    }

    fn abort_drain(&self) {
        let pending = std::mem::take(&mut *self.dirty_components.borrow_mut());
        for component in &pending {
            component.clear_pending();
        }
        self.flush_index.set(0);
        self.seen_callbacks.borrow_mut().clear();
        self.seen_bindings.borrow_mut().clear();
        self.update_scheduled.set(false);
        self.microtasks
            .borrow_mut()
            .retain(|task| !matches!(task, Microtask::Flush));
        self.state.set(SchedulerState::Idle);
        self.wake_flush_waiters();
    }

    /// Resolves every `FlushFuture` waiting on the drain that just ended,
    /// whether it completed or was aborted.
    fn wake_flush_waiters(&self) {
        self.flush_generation.set(self.flush_generation.get() + 1);
        let waiters = std::mem::take(&mut *self.flush_waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }

    fn run_microtasks(&self) -> Result<(), RuntimeError> {
        self.microtask_requested.set(false);
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(Microtask::Flush) => {
                    if let Err(err) = self.flush() {
                        if !self.microtasks.borrow().is_empty() {
                            self.request_microtask();
                        }
                        return Err(err);
                    }
                }
                Some(Microtask::Task(task)) => task(),
                None => {
                    if !self.poll_async_tasks() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn has_pending_microtasks(&self) -> bool {
        !self.microtasks.borrow().is_empty() || self.poll_requested.load(Ordering::SeqCst)
    }

    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()> + 'static>>) -> u64 {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        self.tasks.borrow_mut().push(TaskEntry { id, future });
        self.poll_requested.store(true, Ordering::SeqCst);
        self.request_microtask();
        id
    }

    fn cancel_task(&self, id: u64) {
        self.tasks.borrow_mut().retain(|entry| entry.id != id);
    }

    /// Polls every local task once if any of them was woken. Returns whether
    /// anything was polled.
    fn poll_async_tasks(&self) -> bool {
        if !self.poll_requested.swap(false, Ordering::SeqCst) {
            return false;
        }
        let waker = match self.task_waker.borrow().as_ref() {
            Some(waker) => waker.clone(),
            None => return false,
        };
        let mut cx = Context::from_waker(&waker);
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let mut pending = Vec::with_capacity(tasks.len());
        for mut entry in tasks.into_iter() {
            if entry.future.as_mut().poll(&mut cx).is_pending() {
                pending.push(entry);
            }
        }
        if !pending.is_empty() {
            // Tasks spawned while polling were pushed into the emptied list.
            let mut tasks = self.tasks.borrow_mut();
            pending.append(&mut tasks);
            *tasks = pending;
        }
        true
    }

    fn register_frame_callback(&self, callback: Box<dyn FnOnce(f64) + 'static>) -> FrameCallbackId {
        let id = self.next_frame_callback_id.get();
        self.next_frame_callback_id.set(id + 1);
        self.frame_callbacks
            .borrow_mut()
            .push_back(FrameCallbackEntry {
                id,
                callback: Some(callback),
            });
        if !self.needs_frame.replace(true) {
            self.scheduler.schedule_frame();
        }
        id
    }

    fn cancel_frame_callback(&self, id: FrameCallbackId) {
        let mut callbacks = self.frame_callbacks.borrow_mut();
        if let Some(index) = callbacks.iter().position(|entry| entry.id == id) {
            callbacks.remove(index);
        }
        if callbacks.is_empty() {
            self.needs_frame.set(false);
        }
    }

    fn drain_frame_callbacks(&self, frame_time_millis: f64) {
        self.needs_frame.set(false);
        let mut callbacks = self.frame_callbacks.borrow_mut();
        let mut pending: Vec<Box<dyn FnOnce(f64) + 'static>> = Vec::with_capacity(callbacks.len());
        while let Some(mut entry) = callbacks.pop_front() {
            if let Some(callback) = entry.callback.take() {
                pending.push(callback);
            }
        }
        drop(callbacks);
        log::trace!("frame at {frame_time_millis:.3}ms: {} callback(s)", pending.len());
        for callback in pending {
            callback(frame_time_millis);
        }
    }
}

#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Creates a runtime whose clock never advances.
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self::with_clock(scheduler, Arc::new(FrozenClock))
    }

    pub fn with_clock(scheduler: Arc<dyn RuntimeScheduler>, clock: Arc<dyn Clock>) -> Self {
        let inner = Rc::new(RuntimeInner::new(scheduler, clock));
        inner.init_task_waker();
        let runtime = Self { inner };

        // Free lifecycle functions fall back to the most recently created runtime.
        let handle = runtime.handle();
        LAST_RUNTIME.with(|slot| {
            *slot.borrow_mut() = Some(handle);
        });

        runtime
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Runs queued microtasks, including a pending flush, until the queue is
    /// empty. Hosts call this once per [`RuntimeScheduler::schedule_microtask`].
    pub fn run_microtasks(&self) -> Result<(), RuntimeError> {
        let handle = self.handle();
        push_active_runtime(&handle);
        let result = self.inner.run_microtasks();
        pop_active_runtime();
        result
    }

    /// Runs the frame callbacks registered so far, stamped with the clock's
    /// current time.
    pub fn run_frame(&self) {
        let now = self.inner.clock.now_millis();
        self.inner.drain_frame_callbacks(now);
    }

    /// Drains the update queue synchronously.
    pub fn flush(&self) -> Result<(), RuntimeError> {
        self.handle().flush()
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.get()
    }

    pub fn has_pending_microtasks(&self) -> bool {
        self.inner.has_pending_microtasks()
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    pub fn frame_clock(&self) -> FrameClock {
        FrameClock::new(self.handle())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    pub microtasks: std::sync::atomic::AtomicUsize,
    pub frames: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_microtask(&self) {
        self.microtasks.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule_frame(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub struct TestRuntime {
    pub scheduler: Arc<TestScheduler>,
    pub runtime: Runtime,
}

#[cfg(test)]
impl TestRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(TestScheduler::default());
        Self {
            runtime: Runtime::new(scheduler.clone()),
            scheduler,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn microtask_requests(&self) -> usize {
        self.scheduler.microtasks.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

pub struct TaskHandle {
    id: u64,
    runtime: RuntimeHandle,
}

impl RuntimeHandle {
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&RuntimeInner) -> R) -> Option<R> {
        self.inner.upgrade().map(|inner| f(&inner))
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn ptr_eq(&self, other: &RuntimeHandle) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> SchedulerState {
        self.with_inner(|inner| inner.state.get())
            .unwrap_or(SchedulerState::Idle)
    }

    pub fn now_millis(&self) -> f64 {
        self.with_inner(|inner| inner.clock.now_millis())
            .unwrap_or(0.0)
    }

    /// Requests a flush on the next microtask unless one is already pending.
    pub fn schedule_update(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.schedule_update();
        }
    }

    pub fn flush(&self) -> Result<(), RuntimeError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        push_active_runtime(self);
        let result = inner.flush();
        pop_active_runtime();
        result
    }

    pub(crate) fn enqueue_dirty(&self, component: Component) {
        if let Some(inner) = self.inner.upgrade() {
            inner.enqueue_dirty(component);
        }
    }

    /// Queues a callback that runs once per drain, after every dirty component
    /// has been patched.
    pub fn add_render_callback(&self, callback: Callback) {
        if let Some(inner) = self.inner.upgrade() {
            inner.add_render_callback(callback);
        }
    }

    /// Queues a binding callback. Binding callbacks run newest first, before
    /// render callbacks, once per drain.
    pub fn add_binding_callback(&self, callback: Callback) {
        if let Some(inner) = self.inner.upgrade() {
            inner.add_binding_callback(callback);
        }
    }

    /// Queues a callback that runs newest first after the final drain round.
    pub fn add_flush_callback(&self, callback: Callback) {
        if let Some(inner) = self.inner.upgrade() {
            inner.add_flush_callback(callback);
        }
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        if let Some(inner) = self.inner.upgrade() {
            inner.queue_microtask(Box::new(task));
        }
    }

    /// Resolves once the next complete drain has finished. Requests a flush so
    /// that such a drain is guaranteed to happen.
    pub fn await_flush(&self) -> FlushFuture {
        let target = self
            .with_inner(|inner| {
                inner.schedule_update();
                inner.flush_generation.get() + 1
            })
            .unwrap_or(0);
        FlushFuture {
            inner: self.inner.clone(),
            target,
        }
    }

    pub fn spawn_local<F>(&self, fut: F) -> Option<TaskHandle>
    where
        F: Future<Output = ()> + 'static,
    {
        self.inner.upgrade().map(|inner| {
            let id = inner.spawn_local(Box::pin(fut));
            TaskHandle {
                id,
                runtime: self.clone(),
            }
        })
    }

    pub fn cancel_task(&self, id: u64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_task(id);
        }
    }

    pub fn register_frame_callback(
        &self,
        callback: impl FnOnce(f64) + 'static,
    ) -> Option<FrameCallbackId> {
        self.inner
            .upgrade()
            .map(|inner| inner.register_frame_callback(Box::new(callback)))
    }

    pub fn cancel_frame_callback(&self, id: FrameCallbackId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_frame_callback(id);
        }
    }

    pub fn drain_frame_callbacks(&self, frame_time_millis: f64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.drain_frame_callbacks(frame_time_millis);
        }
    }

    pub fn has_frame_callbacks(&self) -> bool {
        self.with_inner(|inner| !inner.frame_callbacks.borrow().is_empty())
            .unwrap_or(false)
    }

    pub fn frame_clock(&self) -> FrameClock {
        FrameClock::new(self.clone())
    }

    pub(crate) fn push_component(&self, component: Component) {
        if let Some(inner) = self.inner.upgrade() {
            inner.component_stack.borrow_mut().push(component);
        }
    }

    pub(crate) fn pop_component(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.component_stack.borrow_mut().pop();
        }
    }

    /// The component being constructed or patched, if any.
    pub fn current_component(&self) -> Option<Component> {
        self.with_inner(|inner| inner.component_stack.borrow().last().cloned())
            .flatten()
    }

    pub fn pending_components(&self) -> usize {
        self.with_inner(|inner| inner.dirty_components.borrow().len() - inner.flush_index.get())
            .unwrap_or(0)
    }
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {
        self.runtime.cancel_task(self.id);
    }
}

/// Future returned by [`RuntimeHandle::await_flush`] and [`tick`].
pub struct FlushFuture {
    inner: Weak<RuntimeInner>,
    target: u64,
}

impl Future for FlushFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(inner) = self.inner.upgrade() else {
            return Poll::Ready(());
        };
        if inner.flush_generation.get() >= self.target {
            return Poll::Ready(());
        }
        inner.flush_waiters.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}

struct RuntimeTaskWaker {
    scheduler: Arc<dyn RuntimeScheduler>,
    poll_requested: Arc<AtomicBool>,
}

impl RuntimeTaskWaker {
    fn into_waker(self) -> Waker {
        futures_task::waker(Arc::new(self))
    }
}

impl futures_task::ArcWake for RuntimeTaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.poll_requested.store(true, Ordering::SeqCst);
        arc_self.scheduler.schedule_microtask();
    }
}

thread_local! {
    static ACTIVE_RUNTIMES: RefCell<Vec<RuntimeHandle>> = const { RefCell::new(Vec::new()) };
    static LAST_RUNTIME: RefCell<Option<RuntimeHandle>> = const { RefCell::new(None) };
}

pub(crate) fn current_runtime_handle() -> Option<RuntimeHandle> {
    if let Some(handle) = ACTIVE_RUNTIMES.with(|stack| stack.borrow().last().cloned()) {
        return Some(handle);
    }
    LAST_RUNTIME.with(|slot| slot.borrow().clone())
}

pub(crate) fn push_active_runtime(handle: &RuntimeHandle) {
    ACTIVE_RUNTIMES.with(|stack| stack.borrow_mut().push(handle.clone()));
    LAST_RUNTIME.with(|slot| *slot.borrow_mut() = Some(handle.clone()));
}

pub(crate) fn pop_active_runtime() {
    ACTIVE_RUNTIMES.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Marks `component` pending so its fragment is patched on the next drain.
/// Calling it again before that drain has no further effect.
pub fn request_update(component: &Component) {
    component.request_update();
}

/// Resolves after the next drain of the current runtime.
pub fn tick() -> FlushFuture {
    match current_runtime_handle() {
        Some(handle) => handle.await_flush(),
        None => FlushFuture {
            inner: Weak::new(),
            target: 0,
        },
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
