//! Platform abstraction traits for redi runtime services.
//!
//! The runtime never spins its own event loop. It asks the host for a
//! microtask turn whenever a flush (or another queued task) is pending, and for
//! an animation frame whenever a frame callback is registered. The host answers
//! by calling [`Runtime::run_microtasks`](crate::Runtime::run_microtasks) and
//! [`Runtime::run_frame`](crate::Runtime::run_frame).

/// Schedules work for the redi runtime.
///
/// Implementations must be safe to call from any thread; wakers created for
/// local async tasks hold on to the scheduler.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host run the runtime's microtask queue soon, after the
    /// currently executing task has finished.
    fn schedule_microtask(&self);

    /// Request that the host schedule a new animation frame.
    fn schedule_frame(&self);
}

/// Provides monotonic timing information for the runtime.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_millis(&self) -> f64;
}

/// Clock that never advances. Used when a runtime is built without a host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrozenClock;

impl Clock for FrozenClock {
    fn now_millis(&self) -> f64 {
        0.0
    }
}
