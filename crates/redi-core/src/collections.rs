//! Hash collections used across the runtime.
//!
//! The default build uses Fx hashing for the scheduler's identity sets and the
//! keyed lookup tables. Enable `std-hash` to fall back to SipHash.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::hash_map::Entry;
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
    pub use std::collections::hash_map::Entry;
}
