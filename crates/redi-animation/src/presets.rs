//! Ready-made transition functions.

use redi_core::{Dom, NodeId};

use crate::config::{TransitionConfig, TransitionOptions, TransitionParams, TransitionSource};
use crate::easing::Easing;

const PRESET_DURATION_MILLIS: f64 = 400.0;

/// Fades the node's opacity between zero and its own opacity.
pub fn fade(
    dom: &dyn Dom,
    node: NodeId,
    params: &TransitionParams,
    _options: &TransitionOptions,
) -> TransitionSource {
    let target = opacity_of(dom, node);
    timing(params, Easing::Linear)
        .css(move |t, _| format!("opacity: {}", t * target))
        .into()
}

/// Scales the node up from `start` while fading it in from `opacity`.
pub fn scale(
    dom: &dyn Dom,
    node: NodeId,
    params: &TransitionParams,
    _options: &TransitionOptions,
) -> TransitionSource {
    let target_opacity = opacity_of(dom, node);
    let transform = dom
        .style(node, "transform")
        .filter(|transform| !transform.is_empty() && transform != "none")
        .unwrap_or_default();
    let scale_delta = 1.0 - params.start.unwrap_or(0.0);
    let opacity_delta = target_opacity * (1.0 - params.opacity.unwrap_or(0.0));
    timing(params, Easing::CubicOut)
        .css(move |_, u| {
            format!(
                "transform: {transform} scale({}); opacity: {}",
                1.0 - scale_delta * u,
                target_opacity - opacity_delta * u
            )
        })
        .into()
}

fn timing(params: &TransitionParams, easing: Easing) -> TransitionConfig {
    TransitionConfig::new()
        .delay(params.delay.unwrap_or(0.0))
        .duration(params.duration.unwrap_or(PRESET_DURATION_MILLIS))
        .easing(params.easing.unwrap_or(easing))
}

fn opacity_of(dom: &dyn Dom, node: NodeId) -> f64 {
    dom.style(node, "opacity")
        .and_then(|opacity| opacity.trim().parse().ok())
        .unwrap_or(1.0)
}

#[cfg(test)]
#[path = "tests/presets_tests.rs"]
mod tests;
