use super::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::platform::Clock;
use crate::runtime::{Runtime, TestScheduler};

#[derive(Default)]
struct StepClock(AtomicU64);

impl StepClock {
    fn set(&self, millis: f64) {
        self.0.store(millis.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for StepClock {
    fn now_millis(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }
}

fn runtime_with_clock() -> (Runtime, Arc<StepClock>) {
    let clock = Arc::new(StepClock::default());
    let runtime = Runtime::with_clock(Arc::new(TestScheduler::default()), clock.clone());
    (runtime, clock)
}

#[test]
fn with_frame_millis_receives_frame_time() {
    let (runtime, clock) = runtime_with_clock();
    let frame_clock = runtime.frame_clock();
    let seen = Rc::new(Cell::new(None));

    let sink = seen.clone();
    let registration = frame_clock.with_frame_millis(move |time| sink.set(Some(time)));
    assert!(registration.is_active());
    clock.set(16.0);
    assert_eq!(frame_clock.now_millis(), 16.0);
    runtime.run_frame();
    assert_eq!(seen.get(), Some(16.0));
}

#[test]
fn dropping_a_registration_cancels_it() {
    let (runtime, _clock) = runtime_with_clock();
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    drop(runtime.frame_clock().with_frame_millis(move |_| flag.set(true)));
    assert!(!runtime.needs_frame());
    runtime.run_frame();
    assert!(!fired.get());
}

#[test]
fn run_loop_ticks_until_the_callback_stops() {
    let (runtime, clock) = runtime_with_clock();
    let times = Rc::new(RefCell::new(Vec::new()));

    let sink = times.clone();
    let task = runtime.frame_clock().run_loop(move |now| {
        sink.borrow_mut().push(now);
        now < 32.0
    });
    for frame in 1..=4 {
        clock.set(frame as f64 * 16.0);
        runtime.run_frame();
    }
    assert_eq!(*times.borrow(), vec![16.0, 32.0]);
    assert!(!task.is_active());
    assert!(!runtime.needs_frame());
}

#[test]
fn aborted_loop_never_runs_again() {
    let (runtime, _clock) = runtime_with_clock();
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    let task = runtime.frame_clock().run_loop(move |_| {
        counter.set(counter.get() + 1);
        true
    });
    runtime.run_frame();
    runtime.run_frame();
    task.abort();
    runtime.run_frame();
    assert_eq!(count.get(), 2);
    assert!(!task.is_active());
    assert!(!runtime.needs_frame());
}
