//! Fragments and components that render a single text node and record every
//! lifecycle call.

use std::cell::RefCell;
use std::rc::Rc;

use redi_core::{
    Component, ComponentDefinition, DirtyBits, Fragment, NodeId, Props, RuntimeError, SharedDom,
    Value,
};

/// Shared, append-only log of lifecycle events.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// Returns the entries recorded so far and clears the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

type TransitionHook = Box<dyn FnMut(NodeId, bool)>;
type FailurePredicate = Rc<dyn Fn(&[Value]) -> bool>;

/// Renders `ctx[slot]` as a text node.
///
/// Entries are `create {name}`, `mount {name}`, `patch {name} [slots]`,
/// `destroy {name} {detaching}`, `intro {name} {local}` and
/// `outro {name} {local}`.
pub struct RecordingFragment {
    name: String,
    dom: SharedDom,
    recorder: Recorder,
    slot: usize,
    text: String,
    node: Option<NodeId>,
    fail_when: Option<FailurePredicate>,
    intro: Option<TransitionHook>,
    outro: Option<TransitionHook>,
}

impl RecordingFragment {
    pub fn new(name: impl Into<String>, dom: &SharedDom, recorder: &Recorder) -> Self {
        Self {
            name: name.into(),
            dom: dom.clone(),
            recorder: recorder.clone(),
            slot: 0,
            text: String::new(),
            node: None,
            fail_when: None,
            intro: None,
            outro: None,
        }
    }

    /// Renders slot `slot` of `ctx`, starting from its current value.
    pub fn showing(mut self, slot: usize, ctx: &[Value]) -> Self {
        self.slot = slot;
        self.text = ctx.get(slot).map(Value::display_text).unwrap_or_default();
        self
    }

    /// Fails any patch whose context satisfies `predicate`.
    pub fn failing_when(mut self, predicate: impl Fn(&[Value]) -> bool + 'static) -> Self {
        self.fail_when = Some(Rc::new(predicate));
        self
    }

    fn failing_with(mut self, predicate: Option<FailurePredicate>) -> Self {
        self.fail_when = predicate;
        self
    }

    pub fn on_intro(mut self, hook: impl FnMut(NodeId, bool) + 'static) -> Self {
        self.intro = Some(Box::new(hook));
        self
    }

    /// Gives the fragment an outro that calls `hook`.
    pub fn on_outro(mut self, hook: impl FnMut(NodeId, bool) + 'static) -> Self {
        self.outro = Some(Box::new(hook));
        self
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

impl Fragment for RecordingFragment {
    fn create(&mut self) -> Result<(), RuntimeError> {
        self.node = Some(self.dom.borrow_mut().create_text(&self.text));
        self.recorder.record(format!("create {}", self.name));
        Ok(())
    }

    fn mount(&mut self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        if let Some(node) = self.node {
            self.dom.borrow_mut().insert(target, node, anchor)?;
        }
        self.recorder.record(format!("mount {}", self.name));
        Ok(())
    }

    fn patch(&mut self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError> {
        if let Some(fail_when) = &self.fail_when {
            if fail_when(ctx) {
                return Err(RuntimeError::Patch {
                    component: 0,
                    reason: format!("{} rejected its context", self.name),
                });
            }
        }
        if dirty.contains(self.slot) {
            self.text = ctx.get(self.slot).map(Value::display_text).unwrap_or_default();
            if let Some(node) = self.node {
                self.dom.borrow_mut().set_text(node, &self.text)?;
            }
        }
        let slots: Vec<usize> = dirty.iter().collect();
        self.recorder
            .record(format!("patch {} {:?}", self.name, slots));
        Ok(())
    }

    fn destroy(&mut self, detaching: bool) {
        if detaching {
            if let Some(node) = self.node {
                if let Err(err) = self.dom.borrow_mut().detach(node) {
                    log::debug!("{} already detached: {err}", self.name);
                }
            }
        }
        self.recorder
            .record(format!("destroy {} {detaching}", self.name));
    }

    fn first(&self) -> Option<NodeId> {
        self.node
    }

    fn intro(&mut self, local: bool) {
        self.recorder.record(format!("intro {} {local}", self.name));
        if let (Some(hook), Some(node)) = (self.intro.as_mut(), self.node) {
            hook(node, local);
        }
    }

    fn outro(&mut self, local: bool) {
        self.recorder.record(format!("outro {} {local}", self.name));
        if let (Some(hook), Some(node)) = (self.outro.as_mut(), self.node) {
            hook(node, local);
        }
    }

    fn has_outro(&self) -> bool {
        self.outro.is_some()
    }
}

/// Component rendering its first prop as text through a [`RecordingFragment`].
pub struct RecordingComponent {
    name: String,
    props: Vec<(&'static str, usize)>,
    defaults: Vec<Value>,
    dom: SharedDom,
    recorder: Recorder,
    fail_when: Option<FailurePredicate>,
}

impl RecordingComponent {
    /// `props` maps prop names to slots in declaration order; each starts
    /// from the matching entry of `defaults`.
    pub fn new(
        name: impl Into<String>,
        props: &[(&'static str, Value)],
        dom: &SharedDom,
        recorder: &Recorder,
    ) -> Self {
        Self {
            name: name.into(),
            props: props
                .iter()
                .enumerate()
                .map(|(slot, (prop, _))| (*prop, slot))
                .collect(),
            defaults: props.iter().map(|(_, value)| value.clone()).collect(),
            dom: dom.clone(),
            recorder: recorder.clone(),
            fail_when: None,
        }
    }

    pub fn failing_when(mut self, predicate: impl Fn(&[Value]) -> bool + 'static) -> Self {
        self.fail_when = Some(Rc::new(predicate));
        self
    }
}

impl ComponentDefinition for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn props(&self) -> &[(&'static str, usize)] {
        &self.props
    }

    fn instance(&self, _component: &Component, props: &Props) -> Vec<Value> {
        self.props
            .iter()
            .map(|(prop, slot)| {
                props
                    .get(prop)
                    .cloned()
                    .unwrap_or_else(|| self.defaults[*slot].clone())
            })
            .collect()
    }

    fn create_fragment(&self, _component: &Component, ctx: &[Value]) -> Box<dyn Fragment> {
        Box::new(
            RecordingFragment::new(self.name.clone(), &self.dom, &self.recorder)
                .showing(0, ctx)
                .failing_with(self.fail_when.clone()),
        )
    }
}
