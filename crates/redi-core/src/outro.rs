//! Outro groups: counted barriers that let a removal wait for every exit
//! transition started beneath it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::component::{destroy_component, Component};
use crate::runtime::RuntimeHandle;

struct OutroGroupInner {
    id: usize,
    remaining: Cell<usize>,
    closed: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce() + 'static>>>,
    parent: Option<OutroGroup>,
}

/// Counts the exit transitions in flight for one structural change.
///
/// Exits [`acquire`](Self::acquire) the group when they start and
/// [`release`](Self::release) it exactly once when they end or are cancelled.
/// Completion callbacks run once the group has been closed by
/// [`RuntimeHandle::check_outros`] and nothing remains in flight.
#[derive(Clone)]
pub struct OutroGroup {
    inner: Rc<OutroGroupInner>,
}

impl OutroGroup {
    fn new(parent: Option<OutroGroup>) -> Self {
        Self {
            inner: Rc::new(OutroGroupInner {
                id: crate::next_instance_id(),
                remaining: Cell::new(0),
                closed: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
                parent,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.get()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.closed.get() && self.inner.remaining.get() == 0
    }

    pub fn parent(&self) -> Option<OutroGroup> {
        self.inner.parent.clone()
    }

    pub fn ptr_eq(&self, other: &OutroGroup) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn acquire(&self) {
        self.inner.remaining.set(self.inner.remaining.get() + 1);
    }

    pub fn release(&self) {
        let remaining = self.inner.remaining.get();
        if remaining == 0 {
            log::warn!("outro group {} released more often than acquired", self.inner.id);
            return;
        }
        self.inner.remaining.set(remaining - 1);
        if remaining == 1 && self.inner.closed.get() {
            self.run_callbacks();
        }
    }

    pub fn on_all_complete(&self, callback: impl FnOnce() + 'static) {
        if self.is_complete() {
            callback();
            return;
        }
        self.inner.callbacks.borrow_mut().push(Box::new(callback));
    }

    fn close(&self) {
        self.inner.closed.set(true);
        if self.inner.remaining.get() == 0 {
            self.run_callbacks();
        }
    }

    fn run_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        log::debug!(
            "outro group {} complete, {} callback(s)",
            self.inner.id,
            callbacks.len()
        );
        for callback in callbacks {
            callback();
        }
    }
}

/// Something that can be transitioned in and out and destroyed afterwards.
pub trait OutroTarget: Clone + 'static {
    fn target_id(&self) -> usize;
    fn has_outro(&self) -> bool;
    fn intro(&self, local: bool);
    fn outro(&self, local: bool);
    fn destroy(&self, detaching: bool);
}

impl OutroTarget for Component {
    fn target_id(&self) -> usize {
        self.id()
    }

    fn has_outro(&self) -> bool {
        Component::has_outro(self)
    }

    fn intro(&self, local: bool) {
        self.with_fragment_mut(|fragment| fragment.intro(local));
    }

    fn outro(&self, local: bool) {
        self.with_fragment_mut(|fragment| fragment.outro(local));
    }

    fn destroy(&self, detaching: bool) {
        destroy_component(self, detaching);
    }
}

impl RuntimeHandle {
    /// Opens a new outro group nested inside the current one.
    pub fn group_outros(&self) {
        self.with_inner(|inner| {
            let mut outros = inner.outros.borrow_mut();
            let group = OutroGroup::new(outros.take());
            log::debug!("outro group {} opened", group.id());
            *outros = Some(group);
        });
    }

    /// Closes the current group and makes its parent current again. The
    /// group's callbacks run now if no exit is in flight, otherwise when the
    /// last one finishes.
    pub fn check_outros(&self) {
        let group = self
            .with_inner(|inner| {
                let mut outros = inner.outros.borrow_mut();
                let group = outros.take();
                *outros = group.as_ref().and_then(OutroGroup::parent);
                group
            })
            .flatten();
        match group {
            Some(group) => group.close(),
            None => log::warn!("check_outros called with no open outro group"),
        }
    }

    pub fn current_outro_group(&self) -> Option<OutroGroup> {
        self.with_inner(|inner| inner.outros.borrow().clone())
            .flatten()
    }

    pub fn is_outroing(&self, id: usize) -> bool {
        self.with_inner(|inner| inner.outroing.borrow().contains(&id))
            .unwrap_or(false)
    }

    pub(crate) fn forget_outro(&self, id: usize) {
        self.with_inner(|inner| inner.outroing.borrow_mut().remove(&id));
    }

    /// Runs the target's intro. A target that was outroing stops being one, so
    /// the pending outro completion leaves it alone.
    pub fn transition_in<T: OutroTarget>(&self, target: &T, local: bool) {
        self.forget_outro(target.target_id());
        target.intro(local);
    }

    /// Runs the target's outro inside the current group.
    ///
    /// When the group completes and the target is still outroing, the target
    /// is destroyed (if `detach`) and `callback` runs. A target without an
    /// outro is handled immediately. Outroing the same target twice is a
    /// no-op. With no open group, one is opened and closed around the call.
    pub fn transition_out<T: OutroTarget>(
        &self,
        target: &T,
        local: bool,
        detach: bool,
        callback: Option<Box<dyn FnOnce() + 'static>>,
    ) {
        if !target.has_outro() {
            if let Some(callback) = callback {
                if detach {
                    target.destroy(true);
                }
                callback();
            }
            return;
        }
        let id = target.target_id();
        let newly_outroing = self
            .with_inner(|inner| inner.outroing.borrow_mut().insert(id))
            .unwrap_or(false);
        if !newly_outroing {
            return;
        }
        let implicit = self.current_outro_group().is_none();
        if implicit {
            self.group_outros();
        }
        if let Some(group) = self.current_outro_group() {
            let runtime = self.clone();
            let completed = target.clone();
            group.on_all_complete(move || {
                let still_outroing = runtime
                    .with_inner(|inner| inner.outroing.borrow_mut().remove(&id))
                    .unwrap_or(false);
                if !still_outroing {
                    return;
                }
                if let Some(callback) = callback {
                    if detach {
                        completed.destroy(true);
                    }
                    callback();
                }
            });
        }
        target.outro(local);
        if implicit {
            self.check_outros();
        }
    }
}

#[cfg(test)]
#[path = "tests/outro_tests.rs"]
mod tests;
