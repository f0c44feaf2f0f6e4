//! Component registry and asynchronous loader.
//!
//! Components are never produced by evaluating fetched text. A
//! [`ComponentSource`] resolves a path to a typed [`ComponentDefinition`]; the
//! bundled [`ComponentRegistry`] source is a map populated by the host.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use crate::collections::map::HashMap;
use crate::component::{init, Component, ComponentDefinition, ComponentOptions, Props};
use crate::dom::{Dom, DomError, NodeId, SharedDom};
use crate::runtime::RuntimeHandle;
use crate::RuntimeError;

pub type LoadResult = Result<Rc<dyn ComponentDefinition>, RuntimeError>;
pub type BoxedLoad = Pin<Box<dyn Future<Output = LoadResult> + 'static>>;

pub const LOADING_MESSAGE: &str = "Loading...";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load component";

/// Produces component definitions for resolved paths.
pub trait ComponentSource {
    fn fetch(&self, resolved_path: &str) -> BoxedLoad;
}

/// Resolves a component reference the way page links do.
///
/// `./name` is relative to the directory of `current_page`, `/path` is used
/// as-is, and a bare name lives in the `_lib` directory of the current
/// page's first path segment.
pub fn resolve_component_path(path: &str, current_page: &str) -> String {
    if let Some(relative) = path.strip_prefix("./") {
        let base = match current_page.rfind('/') {
            Some(index) => &current_page[..index],
            None => "",
        };
        return format!("{base}/{relative}");
    }
    if path.starts_with('/') {
        return path.to_string();
    }
    match current_page.split('/').nth(1) {
        Some(segment) if !segment.is_empty() => format!("/{segment}/_lib/{path}"),
        _ => path.to_string(),
    }
}

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    entries: Rc<RefCell<HashMap<String, Rc<dyn ComponentDefinition>>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &str, definition: impl ComponentDefinition + 'static) {
        self.entries
            .borrow_mut()
            .insert(path.to_string(), Rc::new(definition));
    }

    pub fn get(&self, path: &str) -> Option<Rc<dyn ComponentDefinition>> {
        self.entries.borrow().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.borrow().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl ComponentSource for ComponentRegistry {
    fn fetch(&self, resolved_path: &str) -> BoxedLoad {
        let result = match self.get(resolved_path) {
            Some(definition) => Ok(definition),
            None => {
                log::warn!("no component registered at {resolved_path}");
                Err(RuntimeError::UnknownComponent {
                    path: resolved_path.to_string(),
                })
            }
        };
        Box::pin(std::future::ready(result))
    }
}

#[derive(Default)]
struct InFlight {
    result: Option<LoadResult>,
    wakers: Vec<Waker>,
}

struct LoaderInner {
    runtime: RuntimeHandle,
    source: Rc<dyn ComponentSource>,
    dom: RefCell<Option<SharedDom>>,
    current_page: RefCell<String>,
    loaded: RefCell<HashMap<String, Rc<dyn ComponentDefinition>>>,
    loading: RefCell<HashMap<String, Rc<RefCell<InFlight>>>>,
}

/// Loads component definitions through a [`ComponentSource`], caching
/// successful loads and sharing a single fetch between concurrent requests
/// for the same path.
#[derive(Clone)]
pub struct ComponentLoader {
    inner: Rc<LoaderInner>,
}

impl ComponentLoader {
    pub fn new(runtime: RuntimeHandle, source: impl ComponentSource + 'static) -> Self {
        Self {
            inner: Rc::new(LoaderInner {
                runtime,
                source: Rc::new(source),
                dom: RefCell::new(None),
                current_page: RefCell::new("/".to_string()),
                loaded: RefCell::new(HashMap::default()),
                loading: RefCell::new(HashMap::default()),
            }),
        }
    }

    /// Lets lazy components show a message in their target while loading
    /// and after a failed load.
    pub fn with_dom(self, dom: SharedDom) -> Self {
        *self.inner.dom.borrow_mut() = Some(dom);
        self
    }

    /// Sets the page that relative and bare component paths resolve against.
    pub fn set_current_page(&self, page: &str) {
        *self.inner.current_page.borrow_mut() = page.to_string();
    }

    pub fn resolve(&self, path: &str) -> String {
        resolve_component_path(path, &self.inner.current_page.borrow())
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.inner.loaded.borrow().contains_key(path)
    }

    pub fn is_loading(&self, path: &str) -> bool {
        self.inner.loading.borrow().contains_key(path)
    }

    pub fn load(&self, path: &str) -> LoadFuture {
        if let Some(definition) = self.inner.loaded.borrow().get(path).cloned() {
            log::debug!("component {path} served from cache");
            return LoadFuture::ready(Ok(definition));
        }
        if let Some(slot) = self.inner.loading.borrow().get(path).cloned() {
            log::debug!("component {path} already loading");
            return LoadFuture::waiting(slot);
        }

        let resolved = self.resolve(path);
        let slot = Rc::new(RefCell::new(InFlight::default()));
        self.inner
            .loading
            .borrow_mut()
            .insert(path.to_string(), slot.clone());

        let fetch = self.inner.source.fetch(&resolved);
        let loader = self.inner.clone();
        let key = path.to_string();
        let task_slot = slot.clone();
        let spawned = self.inner.runtime.spawn_local(async move {
            let result = fetch.await;
            match &result {
                Ok(definition) => {
                    loader
                        .loaded
                        .borrow_mut()
                        .insert(key.clone(), definition.clone());
                }
                Err(err) => log::warn!("failed to load component {key}: {err}"),
            }
            loader.loading.borrow_mut().remove(&key);
            let wakers = {
                let mut slot = task_slot.borrow_mut();
                slot.result = Some(result);
                std::mem::take(&mut slot.wakers)
            };
            for waker in wakers {
                waker.wake();
            }
        });
        if spawned.is_none() {
            self.inner.loading.borrow_mut().remove(path);
            return LoadFuture::ready(Err(RuntimeError::UnknownComponent { path: resolved }));
        }
        LoadFuture::waiting(slot)
    }

    /// Returns a placeholder that constructs the component at `path` with
    /// `options` once it has loaded.
    pub fn lazy(&self, path: &str, options: ComponentOptions) -> LazyComponent {
        LazyComponent::start(self, path, options)
    }
}

enum LoadState {
    Ready(LoadResult),
    Waiting(Rc<RefCell<InFlight>>),
}

/// Future returned by [`ComponentLoader::load`].
pub struct LoadFuture {
    state: LoadState,
}

impl LoadFuture {
    fn ready(result: LoadResult) -> Self {
        Self {
            state: LoadState::Ready(result),
        }
    }

    fn waiting(slot: Rc<RefCell<InFlight>>) -> Self {
        Self {
            state: LoadState::Waiting(slot),
        }
    }
}

impl Future for LoadFuture {
    type Output = LoadResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &self.get_mut().state {
            LoadState::Ready(result) => Poll::Ready(result.clone()),
            LoadState::Waiting(slot) => {
                let mut slot = slot.borrow_mut();
                match &slot.result {
                    Some(result) => Poll::Ready(result.clone()),
                    None => {
                        slot.wakers.push(cx.waker().clone());
                        Poll::Pending
                    }
                }
            }
        }
    }
}

/// Message element kept in a lazy component's target until it is built.
struct Placeholder {
    dom: SharedDom,
    target: NodeId,
    anchor: Option<NodeId>,
    node: Cell<Option<NodeId>>,
}

impl Placeholder {
    fn show(&self, message: &str) {
        self.clear();
        let mounted = mount_message(&mut *self.dom.borrow_mut(), self.target, self.anchor, message);
        match mounted {
            Ok(node) => self.node.set(Some(node)),
            Err(err) => log::warn!("cannot show {message:?} in {}: {err}", self.target),
        }
    }

    fn clear(&self) {
        if let Some(node) = self.node.take() {
            if let Err(err) = self.dom.borrow_mut().detach(node) {
                log::warn!("cannot remove placeholder {node}: {err}");
            }
        }
    }

    fn node(&self) -> Option<NodeId> {
        self.node.get()
    }
}

fn mount_message(
    dom: &mut dyn Dom,
    target: NodeId,
    anchor: Option<NodeId>,
    message: &str,
) -> Result<NodeId, DomError> {
    let element = dom.create_element("div");
    let text = dom.create_text(message);
    dom.insert(element, text, None)?;
    dom.insert(target, element, anchor)?;
    Ok(element)
}

struct LazyInner {
    path: String,
    component: RefCell<Option<Component>>,
    pending_props: RefCell<Props>,
    destroyed: Cell<bool>,
    error: RefCell<Option<RuntimeError>>,
    placeholder: Option<Placeholder>,
}

/// Stand-in for a component that is still loading.
///
/// Props set before the load completes are applied at construction. A load
/// that completes after [`destroy`](Self::destroy) is ignored. When the
/// loader has a DOM and the options name a target, a loading message sits in
/// the target until construction and a failure message replaces it on error.
#[derive(Clone)]
pub struct LazyComponent {
    inner: Rc<LazyInner>,
}

impl LazyComponent {
    fn start(loader: &ComponentLoader, path: &str, options: ComponentOptions) -> Self {
        let dom = loader.inner.dom.borrow().clone();
        let placeholder = match (dom, options.target) {
            (Some(dom), Some(target)) => Some(Placeholder {
                dom,
                target,
                anchor: options.anchor,
                node: Cell::new(None),
            }),
            _ => None,
        };
        if let Some(placeholder) = &placeholder {
            placeholder.show(LOADING_MESSAGE);
        }
        let lazy = Self {
            inner: Rc::new(LazyInner {
                path: path.to_string(),
                component: RefCell::new(None),
                pending_props: RefCell::new(Props::new()),
                destroyed: Cell::new(false),
                error: RefCell::new(None),
                placeholder,
            }),
        };
        let load = loader.load(path);
        let runtime = loader.inner.runtime.clone();
        let weak: Weak<LazyInner> = Rc::downgrade(&lazy.inner);
        let spawner = runtime.clone();
        spawner.spawn_local(async move {
            let result = load.await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.destroyed.get() {
                log::debug!("lazy component {} loaded after destroy", inner.path);
                return;
            }
            if let Some(placeholder) = &inner.placeholder {
                placeholder.clear();
            }
            let built = result.and_then(|definition| {
                let mut options = options;
                let pending = std::mem::take(&mut *inner.pending_props.borrow_mut());
                options.props.merge(pending);
                init(&runtime, definition.as_ref(), options)
            });
            match built {
                Ok(component) => *inner.component.borrow_mut() = Some(component),
                Err(err) => {
                    log::warn!("lazy component {} failed: {err}", inner.path);
                    if let Some(placeholder) = &inner.placeholder {
                        placeholder.show(LOAD_FAILED_MESSAGE);
                    }
                    *inner.error.borrow_mut() = Some(err);
                }
            }
        });
        lazy
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn component(&self) -> Option<Component> {
        self.inner.component.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.component.borrow().is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn error(&self) -> Option<RuntimeError> {
        self.inner.error.borrow().clone()
    }

    /// The loading or failure message currently shown in the target.
    pub fn placeholder(&self) -> Option<NodeId> {
        self.inner.placeholder.as_ref().and_then(Placeholder::node)
    }

    pub fn set_props(&self, props: Props) {
        let component = self.component();
        match component {
            Some(component) => component.set_props(props),
            None => self.inner.pending_props.borrow_mut().merge(props),
        }
    }

    pub fn destroy(&self) {
        self.inner.destroyed.set(true);
        if let Some(placeholder) = &self.inner.placeholder {
            placeholder.clear();
        }
        let component = self.inner.component.borrow_mut().take();
        if let Some(component) = component {
            component.destroy();
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
