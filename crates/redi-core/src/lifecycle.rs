//! Free lifecycle, context and callback functions that act on the component
//! currently being constructed or patched.
//!
//! These mirror the methods on [`Component`] for code that only has access to
//! the runtime's component stack, e.g. helpers called from
//! [`ComponentDefinition::instance`](crate::ComponentDefinition::instance).

use crate::component::{Component, EventDispatcher, Teardown};
use crate::context::ContextKey;
use crate::runtime::{current_runtime_handle, Callback, RuntimeHandle};
use crate::RuntimeError;

/// Guard that pops the runtime's component stack on drop.
#[must_use = "ComponentScopeGuard pops the component stack on drop"]
pub struct ComponentScopeGuard {
    runtime: RuntimeHandle,
}

impl Drop for ComponentScopeGuard {
    fn drop(&mut self) {
        self.runtime.pop_component();
    }
}

impl Component {
    /// Makes this component current on its runtime until the guard drops.
    pub fn enter(&self) -> ComponentScopeGuard {
        let runtime = self.runtime();
        runtime.push_component(self.clone());
        ComponentScopeGuard { runtime }
    }
}

pub fn current_component() -> Option<Component> {
    current_runtime_handle().and_then(|runtime| runtime.current_component())
}

fn require_component(operation: &'static str) -> Result<Component, RuntimeError> {
    current_component().ok_or(RuntimeError::OutsideComponent { operation })
}

pub fn on_mount(hook: impl FnOnce() -> Option<Teardown> + 'static) -> Result<(), RuntimeError> {
    require_component("on_mount")?.on_mount(hook);
    Ok(())
}

pub fn on_destroy(hook: impl FnOnce() + 'static) -> Result<(), RuntimeError> {
    require_component("on_destroy")?.on_destroy(hook);
    Ok(())
}

pub fn before_update(hook: impl Fn() + 'static) -> Result<(), RuntimeError> {
    require_component("before_update")?.before_update(hook);
    Ok(())
}

pub fn after_update(hook: impl Fn() + 'static) -> Result<(), RuntimeError> {
    require_component("after_update")?.after_update(hook);
    Ok(())
}

pub fn set_context<T: 'static>(key: ContextKey<T>, value: T) -> Result<(), RuntimeError> {
    require_component("set_context")?.set_context(key, value);
    Ok(())
}

pub fn get_context<T: Clone + 'static>(key: ContextKey<T>) -> Result<Option<T>, RuntimeError> {
    Ok(require_component("get_context")?.get_context(key))
}

pub fn has_context<T>(key: ContextKey<T>) -> Result<bool, RuntimeError> {
    Ok(require_component("has_context")?.has_context(key))
}

/// Ids of every context key visible to the current component, ascending.
pub fn all_context_keys() -> Result<Vec<usize>, RuntimeError> {
    Ok(require_component("all_context_keys")?.context().keys())
}

pub fn create_event_dispatcher() -> Result<EventDispatcher, RuntimeError> {
    Ok(require_component("create_event_dispatcher")?.dispatcher())
}

pub fn add_render_callback(callback: Callback) {
    match current_runtime_handle() {
        Some(runtime) => runtime.add_render_callback(callback),
        None => log::warn!("add_render_callback called with no runtime"),
    }
}

pub fn add_flush_callback(callback: Callback) {
    match current_runtime_handle() {
        Some(runtime) => runtime.add_flush_callback(callback),
        None => log::warn!("add_flush_callback called with no runtime"),
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
