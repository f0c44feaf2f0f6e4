//! Component instances: state slots, dirty tracking, lifecycle hooks, props,
//! bindings and component events.
//!
//! Every reactive assignment goes through [`Component::invalidate`]. It is the
//! only path that marks a component dirty and hands it to the scheduler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::context::{ContextKey, ContextMap};
use crate::dirty::DirtyBits;
use crate::dom::NodeId;
use crate::fragment::Fragment;
use crate::runtime::{pop_active_runtime, push_active_runtime, Callback, RuntimeHandle};
use crate::value::{ChangePolicy, Value};
use crate::{next_instance_id, RuntimeError};

pub type Teardown = Box<dyn FnOnce() + 'static>;
type MountHook = Box<dyn FnOnce() -> Option<Teardown> + 'static>;
type BoundCallback = Rc<dyn Fn(&Value) + 'static>;
type EventHandler = Rc<dyn Fn(&ComponentEvent) + 'static>;
type UpdateHook = Rc<dyn Fn(&Component) + 'static>;

/// Named values passed to a component at construction or through
/// [`Component::set_props`].
#[derive(Clone, Default)]
pub struct Props {
    entries: Vec<(Rc<str>, Value)>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing an earlier value for the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| &**key == name) {
            Some((_, current)) => *current = value,
            None => self.entries.push((Rc::from(name), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value)
    }

    pub fn merge(&mut self, other: Props) {
        for (name, value) in other.entries {
            self.insert(&name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (&**name, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[derive(Default)]
pub struct ComponentOptions {
    pub target: Option<NodeId>,
    pub anchor: Option<NodeId>,
    pub props: Props,
    pub intro: bool,
    /// Replaces the context inherited from the parent component.
    pub context: Option<ContextMap>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn anchor(mut self, anchor: NodeId) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn intro(mut self, intro: bool) -> Self {
        self.intro = intro;
        self
    }

    pub fn context(mut self, context: ContextMap) -> Self {
        self.context = Some(context);
        self
    }
}

/// What a compiled component provides to the runtime.
pub trait ComponentDefinition {
    fn name(&self) -> &str {
        "component"
    }

    /// Prop names and the state slot each one writes.
    fn props(&self) -> &[(&'static str, usize)] {
        &[]
    }

    fn change_policy(&self) -> ChangePolicy {
        ChangePolicy::Identity
    }

    /// Builds the initial state slots. Lifecycle hooks, context entries and
    /// the reactive update hook are registered on `component` from here.
    fn instance(&self, component: &Component, props: &Props) -> Vec<Value>;

    fn create_fragment(&self, component: &Component, ctx: &[Value]) -> Box<dyn Fragment>;
}

struct ComponentInner {
    id: usize,
    name: String,
    runtime: RuntimeHandle,
    slots: RefCell<Vec<Value>>,
    dirty: RefCell<DirtyBits>,
    enqueued: Cell<bool>,
    ready: Cell<bool>,
    destroyed: Cell<bool>,
    detach_on_destroy: Cell<bool>,
    skip_bound: Cell<bool>,
    policy: Cell<ChangePolicy>,
    prop_slots: RefCell<HashMap<String, usize>>,
    bound: RefCell<HashMap<usize, BoundCallback>>,
    on_mount: RefCell<Vec<MountHook>>,
    on_destroy: RefCell<Vec<Teardown>>,
    before_update: RefCell<Vec<Callback>>,
    after_update: RefCell<Vec<Callback>>,
    update_hook: RefCell<Option<UpdateHook>>,
    context: RefCell<ContextMap>,
    callbacks: RefCell<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_subscription: Cell<u64>,
    fragment: RefCell<Option<Box<dyn Fragment>>>,
}

/// A live component instance. Cloning yields another handle to the same
/// instance.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

impl Component {
    fn new(runtime: RuntimeHandle, name: &str, policy: ChangePolicy, context: ContextMap) -> Self {
        Self {
            inner: Rc::new(ComponentInner {
                id: next_instance_id(),
                name: name.to_string(),
                runtime,
                slots: RefCell::new(Vec::new()),
                dirty: RefCell::new(DirtyBits::all()),
                enqueued: Cell::new(false),
                ready: Cell::new(false),
                destroyed: Cell::new(false),
                detach_on_destroy: Cell::new(true),
                skip_bound: Cell::new(false),
                policy: Cell::new(policy),
                prop_slots: RefCell::new(HashMap::default()),
                bound: RefCell::new(HashMap::default()),
                on_mount: RefCell::new(Vec::new()),
                on_destroy: RefCell::new(Vec::new()),
                before_update: RefCell::new(Vec::new()),
                after_update: RefCell::new(Vec::new()),
                update_hook: RefCell::new(None),
                context: RefCell::new(context),
                callbacks: RefCell::new(HashMap::default()),
                next_subscription: Cell::new(1),
                fragment: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn runtime(&self) -> RuntimeHandle {
        self.inner.runtime.clone()
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Whether the component sits in the scheduler's queue.
    pub fn is_pending(&self) -> bool {
        self.inner.enqueued.get()
    }

    pub fn get(&self, slot: usize) -> Value {
        self.inner
            .slots
            .borrow()
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    pub fn slots(&self) -> Vec<Value> {
        self.inner.slots.borrow().clone()
    }

    pub fn dirty(&self) -> DirtyBits {
        self.inner.dirty.borrow().clone()
    }

    pub fn change_policy(&self) -> ChangePolicy {
        self.inner.policy.get()
    }

    /// Assigns `value` to `slot`.
    ///
    /// Nothing happens when the change policy judges the value unchanged. Once
    /// the component is ready, a change notifies the slot's bound callback
    /// synchronously and marks the slot dirty. Returns `value` so call sites
    /// can stay expression-like.
    pub fn invalidate(&self, slot: usize, value: impl Into<Value>) -> Value {
        let value = value.into();
        let inner = &self.inner;
        if inner.destroyed.get() {
            return value;
        }
        let changed = {
            let mut slots = inner.slots.borrow_mut();
            match slots.get_mut(slot) {
                Some(current) => {
                    let changed = inner.policy.get().changed(current, &value);
                    if changed {
                        *current = value.clone();
                    }
                    changed
                }
                None => {
                    if inner.ready.get() {
                        log::warn!(
                            "{} #{}: invalidated unknown slot {slot} ({} slots)",
                            inner.name,
                            inner.id,
                            slots.len()
                        );
                    }
                    false
                }
            }
        };
        if changed && inner.ready.get() {
            if !inner.skip_bound.get() {
                let bound = inner.bound.borrow().get(&slot).cloned();
                if let Some(callback) = bound {
                    callback(&value);
                }
            }
            self.make_dirty(slot);
        }
        value
    }

    fn make_dirty(&self, slot: usize) {
        if !self.inner.enqueued.replace(true) {
            *self.inner.dirty.borrow_mut() = DirtyBits::clean();
            self.inner.runtime.enqueue_dirty(self.clone());
        }
        self.inner.dirty.borrow_mut().set(slot);
    }

    /// Queues the component for a patch with whatever bits are currently
    /// dirty. Idempotent while the component is pending.
    pub fn request_update(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        if !self.inner.enqueued.replace(true) {
            self.inner.runtime.enqueue_dirty(self.clone());
        }
    }

    pub(crate) fn clear_pending(&self) {
        self.inner.enqueued.set(false);
        *self.inner.dirty.borrow_mut() = DirtyBits::clean();
    }

    /// One scheduler step: reactive hook, before-update hooks, patch, then
    /// after-update hooks queued as render callbacks.
    pub(crate) fn update(&self) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        if inner.destroyed.get() {
            log::warn!("{} #{}: skipping patch of destroyed component", inner.name, inner.id);
            self.clear_pending();
            return Ok(());
        }
        if inner.fragment.borrow().is_none() {
            self.clear_pending();
            return Ok(());
        }
        self.run_update_hook();
        self.run_before_update();
        inner.enqueued.set(false);
        let dirty = inner.dirty.borrow_mut().take();
        let ctx = self.slots();
        let id = inner.id;
        let result = self
            .with_fragment_mut(|fragment| fragment.patch(&ctx, &dirty))
            .unwrap_or(Ok(()));
        result.map_err(|err| match err {
            RuntimeError::Dom(err) => RuntimeError::Patch {
                component: id,
                reason: err.to_string(),
            },
            RuntimeError::Patch { reason, .. } => RuntimeError::Patch {
                component: id,
                reason,
            },
            other => other,
        })?;
        let after_update = inner.after_update.borrow().clone();
        for callback in after_update {
            inner.runtime.add_render_callback(callback);
        }
        Ok(())
    }

    fn run_update_hook(&self) {
        let hook = self.inner.update_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn run_before_update(&self) {
        let hooks = self.inner.before_update.borrow().clone();
        for hook in hooks {
            hook.call();
        }
    }

    /// Runs `f` against the fragment with the fragment detached from the
    /// instance, so `f` may freely call back into this component. If the
    /// component is destroyed while `f` runs, the fragment is destroyed
    /// afterwards instead of being put back.
    pub(crate) fn with_fragment_mut<R>(&self, f: impl FnOnce(&mut dyn Fragment) -> R) -> Option<R> {
        let mut fragment = self.inner.fragment.borrow_mut().take()?;
        let result = f(fragment.as_mut());
        if self.inner.destroyed.get() {
            fragment.destroy(self.inner.detach_on_destroy.get());
        } else {
            *self.inner.fragment.borrow_mut() = Some(fragment);
        }
        Some(result)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.inner
            .fragment
            .borrow()
            .as_ref()
            .and_then(|fragment| fragment.first())
    }

    pub(crate) fn has_outro(&self) -> bool {
        self.inner
            .fragment
            .borrow()
            .as_ref()
            .map(|fragment| fragment.has_outro())
            .unwrap_or(false)
    }

    /// Sets the reactive hook run before every patch, ahead of the
    /// before-update hooks.
    pub fn set_update_hook(&self, hook: impl Fn(&Component) + 'static) {
        *self.inner.update_hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Registers a hook run after the first mount. A returned teardown runs
    /// when the component is destroyed.
    pub fn on_mount(&self, hook: impl FnOnce() -> Option<Teardown> + 'static) {
        self.inner.on_mount.borrow_mut().push(Box::new(hook));
    }

    pub fn on_destroy(&self, hook: impl FnOnce() + 'static) {
        if self.inner.destroyed.get() {
            return;
        }
        self.inner.on_destroy.borrow_mut().push(Box::new(hook));
    }

    pub fn before_update(&self, hook: impl Fn() + 'static) {
        self.inner.before_update.borrow_mut().push(Callback::new(hook));
    }

    pub fn after_update(&self, hook: impl Fn() + 'static) {
        self.inner.after_update.borrow_mut().push(Callback::new(hook));
    }

    pub fn set_context<T: 'static>(&self, key: ContextKey<T>, value: T) {
        self.inner.context.borrow_mut().insert(key, value);
    }

    pub fn get_context<T: Clone + 'static>(&self, key: ContextKey<T>) -> Option<T> {
        self.inner.context.borrow().get(key)
    }

    pub fn has_context<T>(&self, key: ContextKey<T>) -> bool {
        self.inner.context.borrow().contains(key)
    }

    pub fn context(&self) -> ContextMap {
        self.inner.context.borrow().clone()
    }

    /// Subscribes to a component event raised through an [`EventDispatcher`].
    pub fn on(&self, event: &str, handler: impl Fn(&ComponentEvent) + 'static) -> EventSubscription {
        let id = self.inner.next_subscription.get();
        self.inner.next_subscription.set(id + 1);
        self.inner
            .callbacks
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push((id, Rc::new(handler)));
        EventSubscription {
            component: Rc::downgrade(&self.inner),
            event: event.to_string(),
            id,
        }
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher {
            component: Rc::downgrade(&self.inner),
        }
    }

    pub fn slot_of_prop(&self, name: &str) -> Option<usize> {
        self.inner.prop_slots.borrow().get(name).copied()
    }

    /// Updates props from outside. Bound callbacks are not notified for these
    /// writes, so a parent pushing a value down never hears it echoed back.
    pub fn set_props(&self, props: Props) {
        if self.inner.destroyed.get() || props.is_empty() {
            return;
        }
        self.inner.skip_bound.set(true);
        for (name, value) in props.iter() {
            match self.slot_of_prop(name) {
                Some(slot) => {
                    self.invalidate(slot, value.clone());
                }
                None => log::warn!("{} was given unknown prop '{name}'", self.inner.name),
            }
        }
        self.inner.skip_bound.set(false);
    }

    pub fn bind(&self, prop: &str, callback: impl Fn(&Value) + 'static) -> Result<bool, RuntimeError> {
        bind(self, prop, callback)
    }

    pub fn mount(&self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        mount_component(self, target, anchor)
    }

    pub fn destroy(&self) {
        destroy_component(self, true);
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("ready", &self.inner.ready.get())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

/// Constructs a component under `runtime`.
///
/// The context is inherited from whichever component is currently being
/// constructed or patched, unless `options.context` replaces it. With a
/// target, the fragment is mounted and the runtime flushed before returning.
pub fn init(
    runtime: &RuntimeHandle,
    definition: &dyn ComponentDefinition,
    options: ComponentOptions,
) -> Result<Component, RuntimeError> {
    let parent = runtime.current_component();
    let context = match options.context.clone() {
        Some(context) => context,
        None => parent.map(|parent| parent.context()).unwrap_or_default(),
    };
    let component = Component::new(
        runtime.clone(),
        definition.name(),
        definition.change_policy(),
        context,
    );
    {
        let mut prop_slots = component.inner.prop_slots.borrow_mut();
        for (name, slot) in definition.props() {
            prop_slots.insert((*name).to_string(), *slot);
        }
    }

    push_active_runtime(runtime);
    runtime.push_component(component.clone());
    let result = build(&component, definition, &options);
    runtime.pop_component();
    pop_active_runtime();
    result?;

    if let Some(target) = options.target {
        if options.intro {
            runtime.transition_in(&component, false);
        }
        mount_component(&component, target, options.anchor)?;
        runtime.flush()?;
    }
    Ok(component)
}

fn build(
    component: &Component,
    definition: &dyn ComponentDefinition,
    options: &ComponentOptions,
) -> Result<(), RuntimeError> {
    let ctx = definition.instance(component, &options.props);
    *component.inner.slots.borrow_mut() = ctx;
    component.run_update_hook();
    component.inner.ready.set(true);
    *component.inner.dirty.borrow_mut() = DirtyBits::clean();
    component.run_before_update();
    let ctx = component.slots();
    let mut fragment = definition.create_fragment(component, &ctx);
    fragment.create()?;
    *component.inner.fragment.borrow_mut() = Some(fragment);
    Ok(())
}

/// Mounts the component's fragment and defers its mount hooks to the next
/// drain.
pub fn mount_component(
    component: &Component,
    target: NodeId,
    anchor: Option<NodeId>,
) -> Result<(), RuntimeError> {
    if component.is_destroyed() {
        return Err(RuntimeError::Destroyed {
            component: component.id(),
        });
    }
    component
        .with_fragment_mut(|fragment| fragment.mount(target, anchor))
        .unwrap_or(Ok(()))?;

    let mounted = component.clone();
    let runtime = component.runtime();
    runtime.add_render_callback(Callback::once(move || {
        let hooks = std::mem::take(&mut *mounted.inner.on_mount.borrow_mut());
        let teardowns: Vec<Teardown> = hooks.into_iter().filter_map(|hook| hook()).collect();
        if mounted.is_destroyed() {
            for teardown in teardowns {
                teardown();
            }
        } else {
            mounted.inner.on_destroy.borrow_mut().extend(teardowns);
        }
    }));
    let after_update = component.inner.after_update.borrow().clone();
    for callback in after_update {
        runtime.add_render_callback(callback);
    }
    Ok(())
}

/// Tears the component down: destroy hooks, then the fragment. Later calls
/// are no-ops.
pub fn destroy_component(component: &Component, detaching: bool) {
    let inner = &component.inner;
    if inner.destroyed.replace(true) {
        return;
    }
    inner.detach_on_destroy.set(detaching);
    let teardowns = std::mem::take(&mut *inner.on_destroy.borrow_mut());
    for teardown in teardowns {
        teardown();
    }
    let fragment = inner.fragment.borrow_mut().take();
    if let Some(mut fragment) = fragment {
        fragment.destroy(detaching);
    }
    inner.slots.borrow_mut().clear();
    inner.bound.borrow_mut().clear();
    inner.callbacks.borrow_mut().clear();
    inner.on_mount.borrow_mut().clear();
    inner.before_update.borrow_mut().clear();
    inner.after_update.borrow_mut().clear();
    inner.update_hook.borrow_mut().take();
    inner.runtime.forget_outro(inner.id);
}

/// Registers a two-way binding on `prop` and immediately reports the current
/// value to `callback`. Returns `false` when the component has no such prop.
pub fn bind(
    component: &Component,
    prop: &str,
    callback: impl Fn(&Value) + 'static,
) -> Result<bool, RuntimeError> {
    if component.is_destroyed() {
        return Err(RuntimeError::Destroyed {
            component: component.id(),
        });
    }
    let Some(slot) = component.slot_of_prop(prop) else {
        return Ok(false);
    };
    let callback: BoundCallback = Rc::new(callback);
    component
        .inner
        .bound
        .borrow_mut()
        .insert(slot, callback.clone());
    callback(&component.get(slot));
    Ok(true)
}

/// Event raised by [`EventDispatcher::dispatch`].
pub struct ComponentEvent {
    name: String,
    detail: Value,
    cancelable: bool,
    default_prevented: Cell<bool>,
}

impl ComponentEvent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn prevent_default(&self) {
        if self.cancelable {
            self.default_prevented.set(true);
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    component: Weak<ComponentInner>,
}

impl EventDispatcher {
    pub fn dispatch(&self, event: &str, detail: impl Into<Value>) -> bool {
        self.emit(event, detail.into(), false)
    }

    /// Like [`dispatch`](Self::dispatch), but handlers may call
    /// [`ComponentEvent::prevent_default`]. Returns `false` if one did.
    pub fn dispatch_cancelable(&self, event: &str, detail: impl Into<Value>) -> bool {
        self.emit(event, detail.into(), true)
    }

    /// Re-raises an event received from a child on this component. Handlers
    /// share the child's event, so a prevented default is seen by both.
    pub fn bubble(&self, event: &ComponentEvent) -> bool {
        for handler in self.handlers(event.name()) {
            handler(event);
        }
        !event.default_prevented()
    }

    fn handlers(&self, name: &str) -> Vec<EventHandler> {
        let Some(inner) = self.component.upgrade() else {
            return Vec::new();
        };
        let handlers = match inner.callbacks.borrow().get(name) {
            Some(handlers) => handlers.iter().map(|(_, handler)| handler.clone()).collect(),
            None => Vec::new(),
        };
        handlers
    }

    fn emit(&self, name: &str, detail: Value, cancelable: bool) -> bool {
        let handlers = self.handlers(name);
        if handlers.is_empty() {
            return true;
        }
        let event = ComponentEvent {
            name: name.to_string(),
            detail,
            cancelable,
            default_prevented: Cell::new(false),
        };
        for handler in handlers {
            handler(&event);
        }
        !event.default_prevented()
    }
}

pub struct EventSubscription {
    component: Weak<ComponentInner>,
    event: String,
    id: u64,
}

impl EventSubscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.component.upgrade() {
            let mut callbacks = inner.callbacks.borrow_mut();
            if let Some(handlers) = callbacks.get_mut(&self.event) {
                handlers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// Adapts a child component so a keyed block can own it.
pub struct ChildFragment {
    component: Component,
    props_of: Option<Box<dyn Fn(&[Value]) -> Props>>,
}

impl ChildFragment {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            props_of: None,
        }
    }

    /// Maps the block context to child props on every patch.
    pub fn with_props(mut self, props_of: impl Fn(&[Value]) -> Props + 'static) -> Self {
        self.props_of = Some(Box::new(props_of));
        self
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}

impl Fragment for ChildFragment {
    fn mount(&mut self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        mount_component(&self.component, target, anchor)
    }

    fn patch(&mut self, ctx: &[Value], _dirty: &DirtyBits) -> Result<(), RuntimeError> {
        if let Some(props_of) = &self.props_of {
            self.component.set_props(props_of(ctx));
        }
        Ok(())
    }

    fn destroy(&mut self, detaching: bool) {
        destroy_component(&self.component, detaching);
    }

    fn first(&self) -> Option<NodeId> {
        self.component.first()
    }

    fn intro(&mut self, local: bool) {
        self.component.with_fragment_mut(|fragment| fragment.intro(local));
    }

    fn outro(&mut self, local: bool) {
        self.component.with_fragment_mut(|fragment| fragment.outro(local));
    }

    fn has_outro(&self) -> bool {
        self.component.has_outro()
    }
}

#[cfg(test)]
#[path = "tests/component_tests.rs"]
mod tests;
