//! Enter and exit transitions for redi nodes: easing curves, transition
//! configs, frame-driven state machines and generated keyframe rules.

mod config;
mod easing;
mod element;
mod presets;
mod style;
mod transition;

pub use config::{
    CssFn, Direction, TickFn, TransitionConfig, TransitionFn, TransitionOptions, TransitionParams,
    TransitionSource, DEFAULT_DURATION_MILLIS,
};
pub use easing::Easing;
pub use element::ElementTransitions;
pub use presets::{fade, scale};
pub use style::{StyleManager, RULE_PREFIX};
pub use transition::{
    create_in_transition, create_out_transition, IntroTransition, OutroTransition, TransitionHost,
};
