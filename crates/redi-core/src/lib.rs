#![doc = r"Core runtime for redi components: change tracking, the microtask-batched
update scheduler, outro groups and keyed list reconciliation."]

pub mod collections;
mod component;
mod context;
pub mod dirty;
pub mod dom;
mod fragment;
mod frame_clock;
pub mod hash;
mod keyed;
mod lifecycle;
mod outro;
pub mod platform;
mod registry;
mod runtime;
mod value;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use component::{
    bind, destroy_component, init, mount_component, ChildFragment, Component, ComponentDefinition,
    ComponentEvent, ComponentOptions, EventDispatcher, EventSubscription, Props, Teardown,
};
pub use context::{ContextKey, ContextMap};
pub use dirty::DirtyBits;
pub use dom::{Dom, DomError, MemoryDom, NodeId, NodeKind, SharedDom};
pub use fragment::{EmptyFragment, Fragment};
pub use frame_clock::{FrameCallbackRegistration, FrameClock, LoopTask};
pub use keyed::{destroy_each, validate_keys, DestroyStrategy, KeyedBlock, KeyedEach};
pub use lifecycle::{
    add_flush_callback, add_render_callback, after_update, all_context_keys, before_update,
    create_event_dispatcher, current_component, get_context, has_context, on_destroy, on_mount,
    set_context, ComponentScopeGuard,
};
pub use outro::{OutroGroup, OutroTarget};
pub use platform::{Clock, FrozenClock, RuntimeScheduler};
pub use registry::{
    resolve_component_path, ComponentLoader, ComponentRegistry, ComponentSource, LazyComponent,
    LoadFuture, LOADING_MESSAGE, LOAD_FAILED_MESSAGE,
};
pub use runtime::{
    request_update, tick, Callback, FlushFuture, Runtime, RuntimeHandle, SchedulerState,
    TaskHandle,
};
pub use value::{ChangePolicy, Value};

pub type FrameCallbackId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    DuplicateKey { key: String },
    Patch { component: usize, reason: String },
    OutsideComponent { operation: &'static str },
    Destroyed { component: usize },
    UnknownComponent { path: String },
    Dom(DomError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DuplicateKey { key } => {
                write!(f, "cannot have duplicate keys in a keyed each: {key}")
            }
            RuntimeError::Patch { component, reason } => {
                write!(f, "patch failed for component {component}: {reason}")
            }
            RuntimeError::OutsideComponent { operation } => {
                write!(f, "{operation} called outside component initialization")
            }
            RuntimeError::Destroyed { component } => {
                write!(f, "component {component} has been destroyed")
            }
            RuntimeError::UnknownComponent { path } => {
                write!(f, "no component registered for {path}")
            }
            RuntimeError::Dom(err) => write!(f, "dom: {err}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Dom(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DomError> for RuntimeError {
    fn from(err: DomError) -> Self {
        RuntimeError::Dom(err)
    }
}

static NEXT_INSTANCE_ID: AtomicUsize = AtomicUsize::new(1);

/// Identity shared by components and keyed blocks. Never reused within a process.
pub fn next_instance_id() -> usize {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}
