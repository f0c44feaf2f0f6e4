use crate::runtime::RuntimeHandle;
use crate::FrameCallbackId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone)]
pub struct FrameClock {
    runtime: RuntimeHandle,
}

impl FrameClock {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self { runtime }
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.clone()
    }

    pub fn now_millis(&self) -> f64 {
        self.runtime.now_millis()
    }

    /// Runs `callback` on the next frame with the frame time in milliseconds.
    pub fn with_frame_millis(
        &self,
        callback: impl FnOnce(f64) + 'static,
    ) -> FrameCallbackRegistration {
        let mut callback_opt = Some(callback);
        let runtime = self.runtime.clone();
        match runtime.register_frame_callback(move |time| {
            if let Some(callback) = callback_opt.take() {
                callback(time);
            }
        }) {
            Some(id) => FrameCallbackRegistration::new(runtime, id),
            None => FrameCallbackRegistration::inactive(runtime),
        }
    }

    /// Calls `callback` once per frame until it returns `false` or the task is
    /// aborted. Dropping the returned task does not stop the loop.
    pub fn run_loop(&self, callback: impl FnMut(f64) -> bool + 'static) -> LoopTask {
        let state = Rc::new(LoopState {
            active: Cell::new(true),
            callback: RefCell::new(Box::new(callback)),
            registration: RefCell::new(None),
        });
        LoopState::arm(&state, self);
        LoopTask { state }
    }
}

struct LoopState {
    active: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(f64) -> bool>>,
    registration: RefCell<Option<FrameCallbackRegistration>>,
}

impl LoopState {
    fn arm(state: &Rc<LoopState>, clock: &FrameClock) {
        let looped = state.clone();
        let next_clock = clock.clone();
        let registration = clock.with_frame_millis(move |now| {
            if let Some(previous) = looped.registration.borrow_mut().take() {
                previous.forget();
            }
            if !looped.active.get() {
                return;
            }
            let keep_going = (looped.callback.borrow_mut())(now);
            if keep_going && looped.active.get() {
                LoopState::arm(&looped, &next_clock);
            } else {
                looped.active.set(false);
            }
        });
        *state.registration.borrow_mut() = Some(registration);
    }
}

/// Handle to a loop started with [`FrameClock::run_loop`].
pub struct LoopTask {
    state: Rc<LoopState>,
}

impl LoopTask {
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    pub fn abort(&self) {
        self.state.active.set(false);
        if let Some(registration) = self.state.registration.borrow_mut().take() {
            registration.cancel();
        }
    }
}

pub struct FrameCallbackRegistration {
    runtime: RuntimeHandle,
    id: Option<FrameCallbackId>,
}

impl FrameCallbackRegistration {
    fn new(runtime: RuntimeHandle, id: FrameCallbackId) -> Self {
        Self {
            runtime,
            id: Some(id),
        }
    }

    fn inactive(runtime: RuntimeHandle) -> Self {
        Self { runtime, id: None }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn cancel(mut self) {
        if let Some(id) = self.id.take() {
            self.runtime.cancel_frame_callback(id);
        }
    }

    /// Drops the registration without cancelling. Used once the callback has
    /// already fired.
    fn forget(mut self) {
        self.id = None;
    }
}

impl Drop for FrameCallbackRegistration {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.runtime.cancel_frame_callback(id);
        }
    }
}

#[cfg(test)]
#[path = "tests/frame_clock_tests.rs"]
mod tests;
