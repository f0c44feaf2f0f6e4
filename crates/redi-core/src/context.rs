use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collections::map::HashMap;

static NEXT_CONTEXT_KEY: AtomicUsize = AtomicUsize::new(1);

/// Typed key into a component's context map.
///
/// Every call to [`ContextKey::new`] yields a distinct key, so two libraries
/// can never collide on a context entry by accident.
pub struct ContextKey<T> {
    id: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_KEY.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

/// Context entries visible to one component.
///
/// A child starts from a snapshot of its parent's entries; overriding a key on
/// the child never reaches back into the parent.
#[derive(Clone, Default)]
pub struct ContextMap {
    entries: HashMap<usize, Rc<dyn Any>>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: 'static>(mut self, key: ContextKey<T>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: 'static>(&mut self, key: ContextKey<T>, value: T) {
        self.entries.insert(key.id, Rc::new(value));
    }

    pub fn get<T: Clone + 'static>(&self, key: ContextKey<T>) -> Option<T> {
        self.entries
            .get(&key.id)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T>(&self, key: ContextKey<T>) -> bool {
        self.entries.contains_key(&key.id)
    }

    pub fn keys(&self) -> Vec<usize> {
        let mut keys: Vec<usize> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextMap")
            .field("keys", &self.keys())
            .finish()
    }
}
