use std::cell::{Cell, RefCell};
use std::rc::Rc;

use redi_core::{Callback, Dom, NodeId};

use crate::config::{TransitionFn, TransitionOptions, TransitionParams, TransitionSource};
use crate::transition::{IntroTransition, OutroTransition, TransitionHost};

struct ElementInner {
    host: TransitionHost,
    node: NodeId,
    global: Cell<bool>,
    intro_fn: RefCell<Option<(TransitionFn, TransitionParams)>>,
    outro_fn: RefCell<Option<(TransitionFn, TransitionParams)>>,
    intro: RefCell<Option<IntroTransition>>,
    outro: RefCell<Option<OutroTransition>>,
}

/// The enter and exit transitions of one element, driven from a fragment's
/// `intro`, `outro` and `destroy`.
///
/// Transitions only play for local intros and outros (the element's own block
/// entering or leaving) unless [`global`](Self::global) is set.
#[derive(Clone)]
pub struct ElementTransitions {
    inner: Rc<ElementInner>,
}

impl ElementTransitions {
    pub fn new(host: &TransitionHost, node: NodeId) -> Self {
        Self {
            inner: Rc::new(ElementInner {
                host: host.clone(),
                node,
                global: Cell::new(false),
                intro_fn: RefCell::new(None),
                outro_fn: RefCell::new(None),
                intro: RefCell::new(None),
                outro: RefCell::new(None),
            }),
        }
    }

    pub fn with_intro(
        self,
        f: impl Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource
            + 'static,
        params: TransitionParams,
    ) -> Self {
        *self.inner.intro_fn.borrow_mut() = Some((Rc::new(f), params));
        self
    }

    pub fn with_outro(
        self,
        f: impl Fn(&dyn Dom, NodeId, &TransitionParams, &TransitionOptions) -> TransitionSource
            + 'static,
        params: TransitionParams,
    ) -> Self {
        *self.inner.outro_fn.borrow_mut() = Some((Rc::new(f), params));
        self
    }

    /// Also play when an ancestor block enters or leaves.
    pub fn global(self) -> Self {
        self.inner.global.set(true);
        self
    }

    pub fn node(&self) -> NodeId {
        self.inner.node
    }

    pub fn has_outro(&self) -> bool {
        self.inner.outro_fn.borrow().is_some()
    }

    pub fn intro_transition(&self) -> Option<IntroTransition> {
        self.inner.intro.borrow().clone()
    }

    pub fn is_outroing(&self) -> bool {
        self.inner
            .outro
            .borrow()
            .as_ref()
            .map(OutroTransition::is_running)
            .unwrap_or(false)
    }

    /// Cancels a pending exit and starts the enter transition after the
    /// current drain has patched the element.
    pub fn intro(&self, local: bool) {
        let outro = self.inner.outro.borrow_mut().take();
        if let Some(outro) = outro {
            outro.end(true);
        }
        if !local && !self.inner.global.get() {
            return;
        }
        if self.inner.intro_fn.borrow().is_none() {
            return;
        }
        let inner = self.inner.clone();
        self.inner
            .host
            .runtime()
            .add_render_callback(Callback::once(move || {
                let existing = inner.intro.borrow().clone();
                let intro = match existing {
                    Some(intro) => intro,
                    None => {
                        let Some((f, params)) = inner.intro_fn.borrow().clone() else {
                            return;
                        };
                        let intro = IntroTransition::new(&inner.host, inner.node, f, params);
                        *inner.intro.borrow_mut() = Some(intro.clone());
                        intro
                    }
                };
                intro.start();
            }));
    }

    /// Starts the exit transition inside the current outro group.
    pub fn outro(&self, local: bool) {
        let intro = self.inner.intro.borrow().clone();
        if let Some(intro) = intro {
            intro.invalidate();
        }
        if !local && !self.inner.global.get() {
            return;
        }
        let Some((f, params)) = self.inner.outro_fn.borrow().clone() else {
            return;
        };
        let outro = OutroTransition::new(&self.inner.host, self.inner.node, f, params);
        let previous = self.inner.outro.borrow_mut().replace(outro);
        if let Some(previous) = previous {
            previous.end(false);
        }
    }

    pub fn destroy(&self, detaching: bool) {
        let intro = self.inner.intro.borrow_mut().take();
        if let Some(intro) = intro {
            intro.end();
        }
        if detaching {
            let outro = self.inner.outro.borrow_mut().take();
            if let Some(outro) = outro {
                outro.end(false);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/element_tests.rs"]
mod tests;
