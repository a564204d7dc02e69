//! Key hashing for shard routing
//!
//! BLAKE3 keeps the key → shard mapping stable across processes and
//! platforms, so every client routes a key to the same authority.

/// Compute the shard owning a key
pub fn shard_key(key: &str, num_shards: usize) -> usize {
    if num_shards <= 1 {
        return 0;
    }
    let hash = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[0..8]);
    (u64::from_le_bytes(prefix) % num_shards as u64) as usize
}
