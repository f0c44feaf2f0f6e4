use smallvec::SmallVec;

const WORD_BITS: usize = 64;

/// Per-component bit vector marking which state slots changed since the last patch.
///
/// The `all` sentinel marks every slot dirty without sizing the vector. A
/// component only carries it between construction and its first ready state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirtyBits {
    words: SmallVec<[u64; 2]>,
    all: bool,
}

impl DirtyBits {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            words: SmallVec::new(),
            all: true,
        }
    }

    pub fn from_slots(slots: impl IntoIterator<Item = usize>) -> Self {
        let mut bits = Self::clean();
        for slot in slots {
            bits.set(slot);
        }
        bits
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_clean(&self) -> bool {
        !self.all && self.words.iter().all(|word| *word == 0)
    }

    pub fn set(&mut self, slot: usize) {
        if self.all {
            return;
        }
        let word = slot / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (slot % WORD_BITS);
    }

    pub fn contains(&self, slot: usize) -> bool {
        if self.all {
            return true;
        }
        self.words
            .get(slot / WORD_BITS)
            .map(|word| word & (1u64 << (slot % WORD_BITS)) != 0)
            .unwrap_or(false)
    }

    /// True when any of `slots` is dirty. Generated patch code uses this to
    /// skip work for unaffected bindings.
    pub fn any(&self, slots: &[usize]) -> bool {
        slots.iter().any(|slot| self.contains(*slot))
    }

    pub fn union_with(&mut self, other: &DirtyBits) {
        if other.all {
            *self = Self::all();
            return;
        }
        if self.all {
            return;
        }
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (word, other_word) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= other_word;
        }
    }

    /// Resets to clean and returns the previous contents.
    pub fn take(&mut self) -> DirtyBits {
        std::mem::take(self)
    }

    /// Dirty slot indices in ascending order. Empty for the `all` sentinel.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * WORD_BITS + bit)
        })
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }
}

#[cfg(test)]
#[path = "tests/dirty_tests.rs"]
mod tests;
