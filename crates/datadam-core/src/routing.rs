//! Deterministic routing of row keys to dispatcher lanes.

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 64-bit FNV-1a hash of a routing key. Stable across runs and platforms.
pub fn hash_key(key: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Lane index for `key` among `lanes` regular lanes.
pub fn lane_for(key: &str, lanes: usize) -> usize {
    if lanes == 0 {
        return 0;
    }
    (hash_key(key) % lanes as u64) as usize
}
