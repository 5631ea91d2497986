//! Backend instance selection

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Pick the instance for `key` by rendezvous hashing, skipping excluded ones.
///
/// The same key maps to the same instance while the instance set is stable,
/// and excluding an instance only moves the keys that mapped to it.
pub fn rendezvous_endpoint(
    key: &str,
    endpoints: &[String],
    exclude: &HashSet<String>,
) -> Option<String> {
    endpoints
        .iter()
        .filter(|endpoint| !exclude.contains(*endpoint))
        .max_by_key(|endpoint| score(endpoint, key))
        .cloned()
}

fn score(endpoint: &str, key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
