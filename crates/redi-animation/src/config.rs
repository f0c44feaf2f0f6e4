use std::fmt;
use std::rc::Rc;

use redi_core::{Dom, NodeId};

use crate::easing::Easing;

pub const DEFAULT_DURATION_MILLIS: f64 = 300.0;

/// Called with `(t, 1 - t)` on every frame of a running transition.
pub type TickFn = Rc<dyn Fn(f64, f64)>;

/// Produces the declarations for one keyframe from `(t, 1 - t)`.
pub type CssFn = Rc<dyn Fn(f64, f64) -> String>;

/// Timing and effect of a single transition run.
#[derive(Clone)]
pub struct TransitionConfig {
    pub delay: f64,
    pub duration: f64,
    pub easing: Easing,
    pub tick: Option<TickFn>,
    pub css: Option<CssFn>,
}

impl TransitionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, millis: f64) -> Self {
        self.delay = millis;
        self
    }

    pub fn duration(mut self, millis: f64) -> Self {
        self.duration = millis;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn tick(mut self, tick: impl Fn(f64, f64) + 'static) -> Self {
        self.tick = Some(Rc::new(tick));
        self
    }

    pub fn css(mut self, css: impl Fn(f64, f64) -> String + 'static) -> Self {
        self.css = Some(Rc::new(css));
        self
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: DEFAULT_DURATION_MILLIS,
            easing: Easing::Linear,
            tick: None,
            css: None,
        }
    }
}

impl fmt::Debug for TransitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionConfig")
            .field("delay", &self.delay)
            .field("duration", &self.duration)
            .field("easing", &self.easing)
            .field("tick", &self.tick.is_some())
            .field("css", &self.css.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOptions {
    pub direction: Direction,
}

/// What a transition function returns: a ready config, or one to be resolved
/// on the microtask after the transition starts.
#[derive(Clone)]
pub enum TransitionSource {
    Config(TransitionConfig),
    Deferred(Rc<dyn Fn(&TransitionOptions) -> TransitionConfig>),
}

impl TransitionSource {
    pub fn deferred(f: impl Fn(&TransitionOptions) -> TransitionConfig + 'static) -> Self {
        TransitionSource::Deferred(Rc::new(f))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, TransitionSource::Deferred(_))
    }
}

impl From<TransitionConfig> for TransitionSource {
    fn from(config: TransitionConfig) -> Self {
        TransitionSource::Config(config)
    }
}

/// Parameters passed to a transition function. Unset fields fall back to the
/// function's own defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransitionParams {
    pub delay: Option<f64>,
    pub duration: Option<f64>,
    pub easing: Option<Easing>,
    pub start: Option<f64>,
    pub opacity: Option<f64>,
}

impl TransitionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, millis: f64) -> Self {
        self.delay = Some(millis);
        self
    }

    pub fn duration(mut self, millis: f64) -> Self {
        self.duration = Some(millis);
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    pub fn start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }
}

/// A transition function: inspects the node and produces its config.
pub type TransitionFn =
    Rc<dyn Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource>;
