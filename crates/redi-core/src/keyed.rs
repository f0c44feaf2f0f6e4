//! Keyed list reconciliation.
//!
//! Blocks are matched by key between the previous and the next list. The walk
//! runs from both tails towards the front with the anchor trailing behind it,
//! so every insert lands before an already-placed block. When the two cursors
//! disagree, the block that would otherwise travel further is moved first.

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::dirty::DirtyBits;
use crate::dom::NodeId;
use crate::fragment::Fragment;
use crate::outro::OutroTarget;
use crate::runtime::RuntimeHandle;
use crate::value::Value;
use crate::{next_instance_id, RuntimeError};

struct KeyedBlockInner<K> {
    id: usize,
    key: K,
    fragment: RefCell<Box<dyn Fragment>>,
}

/// One reconciled list item: a key and the fragment rendered for it.
pub struct KeyedBlock<K> {
    inner: Rc<KeyedBlockInner<K>>,
}

impl<K> Clone for KeyedBlock<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> KeyedBlock<K> {
    pub fn new(key: K, fragment: Box<dyn Fragment>) -> Self {
        Self {
            inner: Rc::new(KeyedBlockInner {
                id: next_instance_id(),
                key,
                fragment: RefCell::new(fragment),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn key(&self) -> &K {
        &self.inner.key
    }

    pub fn ptr_eq(&self, other: &KeyedBlock<K>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.inner.fragment.borrow().first()
    }

    pub fn create(&self) -> Result<(), RuntimeError> {
        self.inner.fragment.borrow_mut().create()
    }

    pub fn mount(&self, target: NodeId, anchor: Option<NodeId>) -> Result<(), RuntimeError> {
        self.inner.fragment.borrow_mut().mount(target, anchor)
    }

    pub fn patch(&self, ctx: &[Value], dirty: &DirtyBits) -> Result<(), RuntimeError> {
        self.inner.fragment.borrow_mut().patch(ctx, dirty)
    }

    pub fn destroy(&self, detaching: bool) {
        self.inner.fragment.borrow_mut().destroy(detaching);
    }
}

impl<K: Debug> Debug for KeyedBlock<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedBlock")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .finish()
    }
}

impl<K: 'static> OutroTarget for KeyedBlock<K> {
    fn target_id(&self) -> usize {
        self.inner.id
    }

    fn has_outro(&self) -> bool {
        self.inner.fragment.borrow().has_outro()
    }

    fn intro(&self, local: bool) {
        self.inner.fragment.borrow_mut().intro(local);
    }

    fn outro(&self, local: bool) {
        self.inner.fragment.borrow_mut().outro(local);
    }

    fn destroy(&self, detaching: bool) {
        KeyedBlock::destroy(self, detaching);
    }
}

/// How blocks whose keys disappear are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestroyStrategy {
    /// Destroy and detach immediately.
    #[default]
    Detach,
    /// Run the block's outro first. The block leaves the list at once but its
    /// nodes stay until its outro group completes.
    Outro,
}

type Lookup<K> = Rc<RefCell<HashMap<K, KeyedBlock<K>>>>;

/// A keyed each-block: the current ordered blocks plus the key lookup that
/// also tracks blocks still playing their outro.
pub struct KeyedEach<K> {
    runtime: RuntimeHandle,
    blocks: Vec<KeyedBlock<K>>,
    lookup: Lookup<K>,
    strategy: DestroyStrategy,
    dynamic: bool,
}

impl<K> KeyedEach<K>
where
    K: Clone + Eq + Hash + Debug + 'static,
{
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            blocks: Vec::new(),
            lookup: Rc::new(RefCell::new(HashMap::default())),
            strategy: DestroyStrategy::Detach,
            dynamic: true,
        }
    }

    pub fn with_strategy(mut self, strategy: DestroyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// When false, reused blocks are only moved, never patched.
    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn blocks(&self) -> &[KeyedBlock<K>] {
        &self.blocks
    }

    pub fn keys(&self) -> Vec<K> {
        self.blocks.iter().map(|block| block.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `key` still has a block, including one that is outroing.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup.borrow().contains_key(key)
    }

    /// Reconciles the list against `len` new items.
    ///
    /// `context_of(i)` yields the context of item `i` and `key_of` derives its
    /// key. Duplicate keys are rejected before any block is touched. Blocks
    /// with surviving keys are reused (and patched when the list is dynamic),
    /// missing keys are created with `create_block`, and vanished keys are
    /// removed according to the destroy strategy.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile(
        &mut self,
        dirty: &DirtyBits,
        len: usize,
        context_of: impl Fn(usize) -> Vec<Value>,
        key_of: impl Fn(&[Value]) -> K,
        target: NodeId,
        anchor: Option<NodeId>,
        mut create_block: impl FnMut(&K, &[Value]) -> Box<dyn Fragment>,
    ) -> Result<(), RuntimeError> {
        let contexts: Vec<Vec<Value>> = (0..len).map(&context_of).collect();
        let keys: Vec<K> = contexts.iter().map(|ctx| key_of(ctx)).collect();
        validate_keys(&keys)?;

        let outro = self.strategy == DestroyStrategy::Outro;
        if outro {
            self.runtime.group_outros();
        }
        let result = self.update_keyed(dirty, contexts, keys, target, anchor, &mut create_block);
        if outro {
            self.runtime.check_outros();
        }
        result
    }

    fn update_keyed(
        &mut self,
        dirty: &DirtyBits,
        contexts: Vec<Vec<Value>>,
        keys: Vec<K>,
        target: NodeId,
        anchor: Option<NodeId>,
        create_block: &mut dyn FnMut(&K, &[Value]) -> Box<dyn Fragment>,
    ) -> Result<(), RuntimeError> {
        let old_blocks = std::mem::take(&mut self.blocks);
        let mut o = old_blocks.len();
        let mut n = keys.len();

        let mut old_indexes: HashMap<K, usize> = HashMap::default();
        for (index, block) in old_blocks.iter().enumerate() {
            old_indexes.insert(block.key().clone(), index);
        }

        let mut new_slots: Vec<Option<KeyedBlock<K>>> = vec![None; n];
        let mut new_lookup: HashMap<K, KeyedBlock<K>> = HashMap::default();
        let mut deltas: HashMap<K, usize> = HashMap::default();
        let mut updates: Vec<(KeyedBlock<K>, Vec<Value>)> = Vec::new();

        for (index, (ctx, key)) in contexts.into_iter().zip(keys).enumerate().rev() {
            let existing = self.lookup.borrow().get(&key).cloned();
            let block = match existing {
                Some(block) => {
                    if self.dynamic {
                        updates.push((block.clone(), ctx));
                    }
                    block
                }
                None => {
                    let block = KeyedBlock::new(key.clone(), create_block(&key, &ctx));
                    if let Err(err) = block.create() {
                        self.blocks = old_blocks;
                        return Err(err);
                    }
                    block
                }
            };
            if let Some(old_index) = old_indexes.get(&key) {
                deltas.insert(key.clone(), index.abs_diff(*old_index));
            }
            new_lookup.insert(key, block.clone());
            new_slots[index] = Some(block);
        }
        // Reused and created blocks are owned by the list from here on, even if
        // a mount below fails.
        self.blocks = new_slots.into_iter().flatten().collect();
        let new_blocks = &self.blocks;

        let mut will_move: HashSet<K> = HashSet::default();
        let mut did_move: HashSet<K> = HashSet::default();
        let mut next = anchor;

        while o > 0 && n > 0 {
            let new_block = &new_blocks[n - 1];
            let old_block = &old_blocks[o - 1];
            let new_key = new_block.key();
            let old_key = old_block.key();

            if new_block.ptr_eq(old_block) {
                next = new_block.first();
                o -= 1;
                n -= 1;
            } else if !new_lookup.contains_key(old_key) {
                self.remove_block(old_block);
                o -= 1;
            } else if !self.lookup.borrow().contains_key(new_key) || will_move.contains(new_key) {
                next = self.insert_block(new_block, target, next)?;
                n -= 1;
            } else if did_move.contains(old_key) {
                o -= 1;
            } else if moves_further(&deltas, new_key, old_key) {
                did_move.insert(new_key.clone());
                next = self.insert_block(new_block, target, next)?;
                n -= 1;
            } else {
                will_move.insert(old_key.clone());
                o -= 1;
            }
        }

        while o > 0 {
            o -= 1;
            let old_block = &old_blocks[o];
            if !new_lookup.contains_key(old_block.key()) {
                self.remove_block(old_block);
            }
        }

        while n > 0 {
            next = self.insert_block(&new_blocks[n - 1], target, next)?;
            n -= 1;
        }

        for (block, ctx) in updates {
            block.patch(&ctx, dirty)?;
        }
        Ok(())
    }

    fn insert_block(
        &self,
        block: &KeyedBlock<K>,
        target: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<Option<NodeId>, RuntimeError> {
        log::trace!("keyed insert {:?} before {:?}", block.key(), anchor);
        self.runtime.transition_in(block, true);
        block.mount(target, anchor)?;
        self.lookup
            .borrow_mut()
            .insert(block.key().clone(), block.clone());
        Ok(block.first())
    }

    fn remove_block(&self, block: &KeyedBlock<K>) {
        match self.strategy {
            DestroyStrategy::Detach => destroy_block(block, &self.lookup),
            DestroyStrategy::Outro => outro_and_destroy_block(&self.runtime, block, &self.lookup),
        }
    }

    /// Destroys every block, e.g. when the owning fragment is destroyed.
    pub fn destroy(&mut self, detaching: bool) {
        let blocks = std::mem::take(&mut self.blocks);
        destroy_each(&blocks, detaching);
        self.lookup.borrow_mut().clear();
    }
}

fn moves_further<K: Eq + Hash>(deltas: &HashMap<K, usize>, new_key: &K, old_key: &K) -> bool {
    match (deltas.get(new_key), deltas.get(old_key)) {
        (Some(new_delta), Some(old_delta)) => new_delta > old_delta,
        _ => false,
    }
}

/// Rejects a key list containing the same key twice.
pub fn validate_keys<K: Eq + Hash + Debug>(keys: &[K]) -> Result<(), RuntimeError> {
    let mut seen: HashSet<&K> = HashSet::default();
    for key in keys {
        if !seen.insert(key) {
            return Err(RuntimeError::DuplicateKey {
                key: format!("{key:?}"),
            });
        }
    }
    Ok(())
}

fn destroy_block<K: Eq + Hash>(block: &KeyedBlock<K>, lookup: &Lookup<K>) {
    block.destroy(true);
    forget_block(block, lookup);
}

fn outro_and_destroy_block<K>(runtime: &RuntimeHandle, block: &KeyedBlock<K>, lookup: &Lookup<K>)
where
    K: Eq + Hash + 'static,
{
    let lookup = lookup.clone();
    let removed = block.clone();
    runtime.transition_out(
        block,
        true,
        true,
        Some(Box::new(move || forget_block(&removed, &lookup))),
    );
}

fn forget_block<K: Eq + Hash>(block: &KeyedBlock<K>, lookup: &Lookup<K>) {
    let mut lookup = lookup.borrow_mut();
    let same = lookup
        .get(block.key())
        .map(|current| current.ptr_eq(block))
        .unwrap_or(false);
    if same {
        lookup.remove(block.key());
    }
}

/// Destroys a list of blocks in order.
pub fn destroy_each<K>(blocks: &[KeyedBlock<K>], detaching: bool) {
    for block in blocks {
        block.destroy(detaching);
    }
}

#[cfg(test)]
#[path = "tests/keyed_tests.rs"]
mod tests;
