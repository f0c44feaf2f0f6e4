use std::hash::{Hash, Hasher};

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    // fast branch
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hashes any value with the runtime's default hasher.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = default::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Short base-36 digest of `text`, used to name generated style rules.
pub fn short_digest(text: &str) -> String {
    let mut remaining = hash_value(text);
    if remaining == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while remaining > 0 {
        let digit = (remaining % 36) as u32;
        digits.push(std::char::from_digit(digit, 36).unwrap_or('0'));
        remaining /= 36;
    }
    digits.iter().rev().collect()
}
