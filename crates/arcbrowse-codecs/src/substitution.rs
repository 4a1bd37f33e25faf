//! Byte substitution tables
//!
//! Some archives obfuscate their text index with a fixed 256-entry
//! byte-to-byte map before storing it. Decoding applies the inverse map.

use crate::error::{CodecError, CodecResult};

/// A 256-entry byte permutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    map: [u8; 256],
}

impl SubstitutionTable {
    /// Wrap an explicit table.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidWeights` if the table is not a permutation,
    /// since a non-bijective map cannot be inverted.
    pub fn new(map: [u8; 256]) -> CodecResult<Self> {
        let mut seen = [false; 256];
        for &b in &map {
            if seen[b as usize] {
                return Err(CodecError::InvalidWeights(format!(
                    "substitution table maps two bytes to {b:#04x}"
                )));
            }
            seen[b as usize] = true;
        }
        Ok(Self { map })
    }

    /// Build the affine permutation `b -> b * multiplier + addend (mod 256)`.
    ///
    /// `multiplier` is forced odd so the map is always a permutation.
    pub const fn affine(multiplier: u8, addend: u8) -> Self {
        let multiplier = multiplier | 1;
        let mut map = [0u8; 256];
        let mut i = 0;
        while i < 256 {
            map[i] = (i as u8).wrapping_mul(multiplier).wrapping_add(addend);
            i += 1;
        }
        Self { map }
    }

    /// The inverse permutation.
    pub const fn inverse(&self) -> Self {
        let mut map = [0u8; 256];
        let mut i = 0;
        while i < 256 {
            map[self.map[i] as usize] = i as u8;
            i += 1;
        }
        Self { map }
    }

    /// Map a single byte.
    pub const fn map_byte(&self, b: u8) -> u8 {
        self.map[b as usize]
    }

    /// Map every byte of `data` in place.
    pub fn apply(&self, data: &mut [u8]) {
        for b in data {
            *b = self.map[*b as usize];
        }
    }

    /// Raw table contents.
    pub const fn as_bytes(&self) -> &[u8; 256] {
        &self.map
    }
}
