//! Enter and exit transition state machines.
//!
//! A transition resolves its config once, optionally installs a generated
//! style rule, then samples the runtime clock once per frame until its
//! duration has elapsed. Exit transitions hold the outro group that was
//! current when they were created and release it exactly once: on natural
//! completion, on [`OutroTransition::end`], or when dropped.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use redi_core::{Callback, Dom, LoopTask, NodeId, OutroGroup, RuntimeHandle, SharedDom};

use crate::config::{
    Direction, TickFn, TransitionConfig, TransitionFn, TransitionOptions, TransitionParams,
    TransitionSource,
};
use crate::style::StyleManager;

/// Services a transition needs: the runtime for scheduling and time, the DOM
/// for events and styles, and the shared keyframe registry.
#[derive(Clone)]
pub struct TransitionHost {
    runtime: RuntimeHandle,
    dom: SharedDom,
    styles: StyleManager,
}

impl TransitionHost {
    pub fn new(runtime: RuntimeHandle, dom: SharedDom) -> Self {
        let styles = StyleManager::new(dom.clone());
        Self {
            runtime,
            dom,
            styles,
        }
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn dom(&self) -> &SharedDom {
        &self.dom
    }

    pub fn styles(&self) -> &StyleManager {
        &self.styles
    }

    fn resolve(
        &self,
        f: &TransitionFn,
        node: NodeId,
        params: &TransitionParams,
        direction: Direction,
    ) -> TransitionSource {
        let dom = self.dom.borrow();
        f(&*dom, node, params, &TransitionOptions { direction })
    }

    fn dispatch(&self, node: NodeId, event: &str) {
        if let Err(err) = self.dom.borrow_mut().dispatch_event(node, event) {
            log::warn!("could not dispatch {event} to node {node}: {err}");
        }
    }

    fn remove_animation(&self, node: NodeId, name: Option<&str>) {
        if let Err(err) = self.styles.delete_rule(node, name) {
            log::warn!("could not remove animation from node {node}: {err}");
        }
    }

    fn install_animation(
        &self,
        node: NodeId,
        from: f64,
        to: f64,
        config: &TransitionConfig,
    ) -> Option<String> {
        let css = config.css.as_ref()?;
        match self.styles.create_rule(
            node,
            from,
            to,
            config.duration,
            config.delay,
            &config.easing,
            css,
        ) {
            Ok(name) => Some(name),
            Err(err) => {
                log::warn!("could not animate node {node}: {err}");
                None
            }
        }
    }
}

struct IntroState {
    host: TransitionHost,
    node: NodeId,
    f: TransitionFn,
    params: TransitionParams,
    started: Cell<bool>,
    running: Cell<bool>,
    generation: Cell<u64>,
    animation: RefCell<Option<String>>,
    task: RefCell<Option<LoopTask>>,
}

impl IntroState {
    fn go(state: &Rc<IntroState>, config: TransitionConfig) {
        let node = state.node;
        let host = &state.host;
        match host.install_animation(node, 0.0, 1.0, &config) {
            Some(name) => *state.animation.borrow_mut() = Some(name),
            None => {
                if let Some(tick) = &config.tick {
                    tick(0.0, 1.0);
                }
            }
        }

        let start_time = host.runtime.now_millis() + config.delay;
        let end_time = start_time + config.duration;
        if let Some(task) = state.task.borrow_mut().take() {
            task.abort();
        }
        state.running.set(true);

        let dispatcher = host.clone();
        host.runtime.add_render_callback(Callback::once(move || {
            dispatcher.dispatch(node, "introstart");
        }));

        let weak = Rc::downgrade(state);
        let TransitionConfig {
            duration,
            easing,
            tick,
            ..
        } = config;
        let task = host.runtime.frame_clock().run_loop(move |now| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            if !state.running.get() {
                return false;
            }
            if now >= end_time {
                if let Some(tick) = &tick {
                    tick(1.0, 0.0);
                }
                state.host.dispatch(state.node, "introend");
                state.cleanup();
                state.running.set(false);
                return false;
            }
            if now >= start_time {
                let t = easing.apply((now - start_time) / duration);
                log::trace!("intro on node {} at {t:.3}", state.node);
                if let Some(tick) = &tick {
                    tick(t, 1.0 - t);
                }
            }
            true
        });
        *state.task.borrow_mut() = Some(task);
    }

    fn cleanup(&self) {
        let animation = self.animation.borrow_mut().take();
        if let Some(name) = animation {
            self.host.remove_animation(self.node, Some(&name));
        }
    }
}

/// Enter transition for one node. Cloning shares the same state machine.
#[derive(Clone)]
pub struct IntroTransition {
    state: Rc<IntroState>,
}

impl IntroTransition {
    pub fn new(
        host: &TransitionHost,
        node: NodeId,
        f: TransitionFn,
        params: TransitionParams,
    ) -> Self {
        Self {
            state: Rc::new(IntroState {
                host: host.clone(),
                node,
                f,
                params,
                started: Cell::new(false),
                running: Cell::new(false),
                generation: Cell::new(0),
                animation: RefCell::new(None),
                task: RefCell::new(None),
            }),
        }
    }

    /// Starts the transition. Does nothing if it was already started and not
    /// invalidated since. Generated animations left on the node by earlier
    /// transitions are removed first.
    pub fn start(&self) {
        let state = &self.state;
        if state.started.replace(true) {
            return;
        }
        state.host.remove_animation(state.node, None);
        match state
            .host
            .resolve(&state.f, state.node, &state.params, Direction::In)
        {
            TransitionSource::Config(config) => IntroState::go(state, config),
            TransitionSource::Deferred(factory) => {
                let generation = state.generation.get();
                let weak: Weak<IntroState> = Rc::downgrade(state);
                state.host.runtime.queue_microtask(move || {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    if !state.started.get() || state.generation.get() != generation {
                        log::debug!("deferred intro on node {} was invalidated", state.node);
                        return;
                    }
                    let config = factory(&TransitionOptions {
                        direction: Direction::In,
                    });
                    IntroState::go(&state, config);
                });
            }
        }
    }

    /// Allows the next [`start`](Self::start) to run again and drops a
    /// deferred start that has not resolved yet.
    pub fn invalidate(&self) {
        self.state.started.set(false);
        self.state.generation.set(self.state.generation.get() + 1);
    }

    /// Stops a running transition and removes its generated animation.
    pub fn end(&self) {
        let state = &self.state;
        if !state.running.replace(false) {
            return;
        }
        state.cleanup();
        if let Some(task) = state.task.borrow_mut().take() {
            task.abort();
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.started.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    pub fn animation_name(&self) -> Option<String> {
        self.state.animation.borrow().clone()
    }
}

/// Creates an enter transition for `node`. Nothing happens until
/// [`IntroTransition::start`].
pub fn create_in_transition(
    host: &TransitionHost,
    node: NodeId,
    f: impl Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource
        + 'static,
    params: TransitionParams,
) -> IntroTransition {
    IntroTransition::new(host, node, Rc::new(f), params)
}

struct OutroState {
    host: TransitionHost,
    node: NodeId,
    running: Cell<bool>,
    group: RefCell<Option<OutroGroup>>,
    tick: RefCell<Option<TickFn>>,
    animation: RefCell<Option<String>>,
    task: RefCell<Option<LoopTask>>,
}

impl OutroState {
    fn go(state: &Rc<OutroState>, config: TransitionConfig) {
        let node = state.node;
        let host = &state.host;
        *state.tick.borrow_mut() = config.tick.clone();
        if let Some(name) = host.install_animation(node, 1.0, 0.0, &config) {
            *state.animation.borrow_mut() = Some(name);
        }

        let start_time = host.runtime.now_millis() + config.delay;
        let end_time = start_time + config.duration;
        if let Some(task) = state.task.borrow_mut().take() {
            task.abort();
        }

        let dispatcher = host.clone();
        host.runtime.add_render_callback(Callback::once(move || {
            dispatcher.dispatch(node, "outrostart");
        }));

        let weak = Rc::downgrade(state);
        let TransitionConfig {
            duration,
            easing,
            tick,
            ..
        } = config;
        let task = host.runtime.frame_clock().run_loop(move |now| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            if !state.running.get() {
                return false;
            }
            if now >= end_time {
                if let Some(tick) = &tick {
                    tick(0.0, 1.0);
                }
                state.host.dispatch(state.node, "outroend");
                state.cleanup();
                state.running.set(false);
                state.release_group();
                return false;
            }
            if now >= start_time {
                let t = easing.apply((now - start_time) / duration);
                log::trace!("outro on node {} at {t:.3}", state.node);
                if let Some(tick) = &tick {
                    tick(1.0 - t, t);
                }
            }
            true
        });
        *state.task.borrow_mut() = Some(task);
    }

    fn cleanup(&self) {
        let animation = self.animation.borrow_mut().take();
        if let Some(name) = animation {
            self.host.remove_animation(self.node, Some(&name));
        }
    }

    fn release_group(&self) {
        let group = self.group.borrow_mut().take();
        if let Some(group) = group {
            group.release();
        }
    }
}

impl Drop for OutroState {
    fn drop(&mut self) {
        if self.group.borrow().is_some() {
            log::debug!("outro on node {} dropped before it ended", self.node);
        }
        self.release_group();
    }
}

/// Exit transition for one node. Starts as soon as it is created.
pub struct OutroTransition {
    state: Rc<OutroState>,
}

impl OutroTransition {
    pub fn new(
        host: &TransitionHost,
        node: NodeId,
        f: TransitionFn,
        params: TransitionParams,
    ) -> Self {
        let group = host.runtime.current_outro_group();
        match &group {
            Some(group) => group.acquire(),
            None => log::warn!("exit transition on node {node} created outside an outro group"),
        }
        let state = Rc::new(OutroState {
            host: host.clone(),
            node,
            running: Cell::new(true),
            group: RefCell::new(group),
            tick: RefCell::new(None),
            animation: RefCell::new(None),
            task: RefCell::new(None),
        });

        match host.resolve(&f, node, &params, Direction::Out) {
            TransitionSource::Config(config) => OutroState::go(&state, config),
            TransitionSource::Deferred(factory) => {
                let weak = Rc::downgrade(&state);
                host.runtime.queue_microtask(move || {
                    let Some(state) = weak.upgrade() else {
                        return;
                    };
                    if !state.running.get() {
                        log::debug!("deferred outro on node {} ended before it began", state.node);
                        return;
                    }
                    let config = factory(&TransitionOptions {
                        direction: Direction::Out,
                    });
                    OutroState::go(&state, config);
                });
            }
        }
        Self { state }
    }

    /// Stops the transition. With `reset` the node is ticked back to its
    /// fully visible state. The outro group is released if it was still held.
    pub fn end(&self, reset: bool) {
        let state = &self.state;
        if reset {
            let tick = state.tick.borrow().clone();
            if let Some(tick) = tick {
                tick(1.0, 0.0);
            }
        }
        if state.running.replace(false) {
            state.cleanup();
            if let Some(task) = state.task.borrow_mut().take() {
                task.abort();
            }
        }
        state.release_group();
    }

    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    /// Whether this transition still counts towards its outro group.
    pub fn holds_group(&self) -> bool {
        self.state.group.borrow().is_some()
    }

    pub fn animation_name(&self) -> Option<String> {
        self.state.animation.borrow().clone()
    }
}

/// Creates and starts an exit transition for `node` inside the current outro
/// group.
pub fn create_out_transition(
    host: &TransitionHost,
    node: NodeId,
    f: impl Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource
        + 'static,
    params: TransitionParams,
) -> OutroTransition {
    OutroTransition::new(host, node, Rc::new(f), params)
}

#[cfg(test)]
#[path = "tests/transition_tests.rs"]
mod tests;
