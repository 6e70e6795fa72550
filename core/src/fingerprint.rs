//! 128-bit state fingerprints
//!
//! Each Execute command carries an xxHash3-128 of the full state blob so a
//! replayer can detect divergence without the blob being re-sent every step.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

/// xxHash3-128 digest split into four little-endian words (low word first).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u32; 4]);

impl Fingerprint {
    pub fn of(state: &[u8]) -> Self {
        Self::from_u128(xxh3_128(state))
    }

    pub fn from_u128(value: u128) -> Self {
        Self([
            value as u32,
            (value >> 32) as u32,
            (value >> 64) as u32,
            (value >> 96) as u32,
        ])
    }

    pub fn as_u128(&self) -> u128 {
        let [a, b, c, d] = self.0;
        (a as u128) | ((b as u128) << 32) | ((c as u128) << 64) | ((d as u128) << 96)
    }

    pub fn words(self) -> [u32; 4] {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.as_u128())
    }
}
