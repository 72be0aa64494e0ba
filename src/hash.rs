// Hashing — FNV-1a digests used for storage keys and shard selection.
//
// The 64-bit hex digest is part of the persisted key space (cache keys,
// thumbnail object names, metadata and feed rows), so its output format
// must never change.

const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;
const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// FNV-1a 64-bit digest of the input.
pub fn fnv1a_64(input: &str) -> u64 {
    input.bytes().fold(FNV64_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV64_PRIME)
    })
}

/// FNV-1a 64-bit digest formatted as lower-case hex with no padding.
///
/// This is the canonical "hash" of a URL or CID everywhere in the system.
pub fn fnv1a_64_hex(input: &str) -> String {
    format!("{:x}", fnv1a_64(input))
}

/// FNV-1a 32-bit digest, used to pick a shard.
pub fn fnv32(input: &str) -> u32 {
    input.bytes().fold(FNV32_OFFSET, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV32_PRIME)
    })
}
