// Bloom filter for duplicate-event detection.
//
// Sized from the expected element count and target false-positive rate.
// Bit positions come from double hashing two independent 64-bit hashes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::hash::fnv1a_64;

pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// A filter expected to hold `capacity` items at false-positive rate `fpr`.
    pub fn with_rate(capacity: usize, fpr: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = fpr.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 30.0) as u32;
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: vec![0u64; words],
            num_bits: words as u64 * 64,
            num_hashes,
        }
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    fn positions(&self, key: &str) -> impl Iterator<Item = u64> + '_ {
        let h1 = fnv1a_64(key);
        let h2 = {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            hasher.finish() | 1
        };
        (0..u64::from(self.num_hashes))
            .map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    /// Whether `key` may have been added. False means definitely not.
    pub fn contains(&self, key: &str) -> bool {
        self.positions(key)
            .all(|bit| self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    /// Add `key`, returning whether it was (probably) already present.
    pub fn test_and_add(&mut self, key: &str) -> bool {
        let positions: Vec<u64> = self.positions(key).collect();
        let mut present = true;
        for bit in positions {
            let word = &mut self.bits[(bit / 64) as usize];
            let mask = 1u64 << (bit % 64);
            if *word & mask == 0 {
                present = false;
                *word |= mask;
            }
        }
        present
    }
}
