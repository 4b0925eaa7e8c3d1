//! Deterministic hashing. The standard library `HashMap` is seeded randomly per process, which
//! would make iteration order (and therefore RNG consumption) differ between runs. Every map in
//! the simulator uses the `FxHash` based aliases exported here instead.
//!
//! `hash_str` derives per-stream seed offsets in `crate::random`; `hash_serialized` fingerprints
//! configuration for the population cache and for detecting mid-run parameter changes.

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute the hash of a `&str`.
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

/// Hashes the `bincode` serialization of `value`.
pub fn hash_serialized<T: Serialize>(value: &T) -> u64 {
    let serialized = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .expect("serializable values always encode");
    xxh3_64(&serialized)
}
