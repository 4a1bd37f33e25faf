//! XOR obfuscation used by archive payloads
//!
//! Two key sources appear in practice:
//!
//! - a constant byte supplied by the game title (usually through a scheme
//!   database), and
//! - a byte folded from the entry's own stored offset. Every entry is bound to
//!   its position in the container, so bytes copied elsewhere no longer
//!   decrypt.
//!
//! XOR is its own inverse, so the same functions encrypt and decrypt.
//!
//! ```
//! use arcbrowse_codecs::xor;
//!
//! let mut data = b"scenario.txt payload".to_vec();
//! xor::apply_offset_key(&mut data, 0x1234_5678, 0);
//! xor::apply_offset_key(&mut data, 0x1234_5678, 0);
//! assert_eq!(data, b"scenario.txt payload");
//! ```

/// Fold the eight bytes of a stored 64-bit offset into one key byte.
///
/// Byte `i` is `(offset >> (8 * i)) & 0xFF`, so the result does not depend
/// on host endianness.
pub const fn offset_key(offset: u64) -> u8 {
    let mut key = 0u8;
    let mut i = 0;
    while i < 8 {
        key ^= (offset >> (i * 8)) as u8;
        i += 1;
    }
    key
}

/// XOR `data[start..]` with the key folded from `offset`.
///
/// A `start` past the end of the buffer leaves the buffer untouched.
pub fn apply_offset_key(data: &mut [u8], offset: u64, start: usize) {
    apply_constant(data, offset_key(offset), start);
}

/// XOR `data[start..]` with a constant key byte.
pub fn apply_constant(data: &mut [u8], key: u8, start: usize) {
    if key == 0 {
        return;
    }
    if let Some(tail) = data.get_mut(start..) {
        for byte in tail {
            *byte ^= key;
        }
    }
}
