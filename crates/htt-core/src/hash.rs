//! Identifier hashing.
//!
//! Pair-wise products (e.g. one MET per dilepton pair) are keyed by
//! combining the ids of their inputs with [`hash_combine`], which reproduces
//! the classic `boost::hash_combine` mixing for integer values.

use std::hash::Hasher;
use twox_hash::XxHash64;

/// Mix `value` into `seed`.
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Key of a product built for the ordered pair of objects `(id1, id2)`.
pub fn pair_id(id1: u64, id2: u64) -> u64 {
    hash_combine(hash_combine(0, id1), id2)
}

/// Stable 64-bit hash of a label.
pub fn label_hash(label: &str) -> u64 {
    let mut h = XxHash64::with_seed(0);
    h.write(label.as_bytes());
    h.finish()
}
