//! Generated keyframe rules for style-driven transitions.
//!
//! Every rule is sampled from the transition's style generator at roughly one
//! keyframe per 60Hz frame, registered with the DOM under a unique name and
//! appended to the node's `animation` property. Once no generated animation
//! remains anywhere, all registered keyframes are dropped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use redi_core::collections::map::HashSet;
use redi_core::hash::short_digest;
use redi_core::{NodeId, RuntimeError, SharedDom};

use crate::config::CssFn;
use crate::easing::Easing;

pub const RULE_PREFIX: &str = "__redi";

const FRAME_MILLIS: f64 = 16.666;

struct StyleState {
    active: Cell<usize>,
    next_uid: Cell<u64>,
    rules: RefCell<HashSet<String>>,
}

#[derive(Clone)]
pub struct StyleManager {
    dom: SharedDom,
    state: Rc<StyleState>,
}

impl StyleManager {
    pub fn new(dom: SharedDom) -> Self {
        Self {
            dom,
            state: Rc::new(StyleState {
                active: Cell::new(0),
                next_uid: Cell::new(0),
                rules: RefCell::new(HashSet::default()),
            }),
        }
    }

    /// Number of generated animations currently attached to nodes.
    pub fn active(&self) -> usize {
        self.state.active.get()
    }

    pub fn rule_count(&self) -> usize {
        self.state.rules.borrow().len()
    }

    /// Installs a rule animating from `a` to `b` and attaches it to `node`.
    /// Returns the animation name.
    #[allow(clippy::too_many_arguments)]
    pub fn create_rule(
        &self,
        node: NodeId,
        a: f64,
        b: f64,
        duration: f64,
        delay: f64,
        easing: &Easing,
        css: &CssFn,
    ) -> Result<String, RuntimeError> {
        let rule = keyframes(a, b, duration, easing, css);
        let uid = self.state.next_uid.get();
        self.state.next_uid.set(uid + 1);
        let name = format!("{RULE_PREFIX}_{}_{uid}", short_digest(&rule));

        let mut dom = self.dom.borrow_mut();
        if self.state.rules.borrow_mut().insert(name.clone()) {
            dom.insert_keyframes(&name, &rule);
        }
        let entry = format!("{name} {duration}ms linear {delay}ms 1 both");
        let animation = match dom.style(node, "animation") {
            Some(existing) if !existing.is_empty() => format!("{existing}, {entry}"),
            _ => entry,
        };
        dom.set_style(node, "animation", Some(&animation))?;
        self.state.active.set(self.state.active.get() + 1);
        log::trace!("style rule {name} attached to node {node}");
        Ok(name)
    }

    /// Detaches the named animation from `node`, or every generated one when
    /// `name` is `None`.
    pub fn delete_rule(&self, node: NodeId, name: Option<&str>) -> Result<(), RuntimeError> {
        let previous = self.dom.borrow().style(node, "animation").unwrap_or_default();
        if previous.is_empty() {
            return Ok(());
        }
        let entries: Vec<&str> = previous.split(", ").collect();
        let kept: Vec<&str> = entries
            .iter()
            .copied()
            .filter(|entry| {
                let rule = entry.split_whitespace().next().unwrap_or_default();
                match name {
                    Some(name) => rule != name,
                    None => !rule.starts_with(RULE_PREFIX),
                }
            })
            .collect();
        let deleted = entries.len() - kept.len();
        if deleted == 0 {
            return Ok(());
        }
        self.dom
            .borrow_mut()
            .set_style(node, "animation", Some(&kept.join(", ")))?;
        let active = self.state.active.get().saturating_sub(deleted);
        self.state.active.set(active);
        if active == 0 {
            self.clear_rules();
        }
        Ok(())
    }

    /// Drops every registered keyframe rule unless an animation still uses one.
    pub fn clear_rules(&self) {
        if self.state.active.get() > 0 {
            return;
        }
        let rules = std::mem::take(&mut *self.state.rules.borrow_mut());
        let mut dom = self.dom.borrow_mut();
        for name in &rules {
            dom.delete_keyframes(name);
        }
        if !rules.is_empty() {
            log::debug!("cleared {} style rule(s)", rules.len());
        }
    }
}

fn keyframes(a: f64, b: f64, duration: f64, easing: &Easing, css: &CssFn) -> String {
    let step = if duration > 0.0 && duration.is_finite() {
        FRAME_MILLIS / duration
    } else {
        1.0
    };
    let mut rule = String::from("{\n");
    let mut p = 0.0;
    while p < 1.0 {
        let t = a + (b - a) * easing.apply(p);
        rule.push_str(&format!("{}%{{{}}}\n", p * 100.0, css(t, 1.0 - t)));
        p += step;
    }
    rule.push_str(&format!("100% {{{}}}\n}}", css(b, 1.0 - b)));
    rule
}

#[cfg(test)]
#[path = "tests/style_tests.rs"]
mod tests;
