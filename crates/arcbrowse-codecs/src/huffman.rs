//! Weight-table Huffman coding
//!
//! A packed payload starts with 256 little-endian `u32` symbol weights, each
//! XORed with [`WEIGHT_MASK`]. The end-of-stream symbol `0x100` has an
//! implicit weight of one. The tree is rebuilt from the weights by repeatedly
//! merging the two lowest non-zero active nodes, found by a linear scan that
//! keeps the first index on ties. Existing archives depend on that exact
//! selection order, so it must not be replaced with a heap.
//!
//! Bits are read MSB-first; `0` walks to the first-picked child, `1` to the
//! second. Decoding stops at the end symbol, when the input runs out, or when
//! the output reaches its capacity.

use crate::error::{CodecError, CodecResult};
use tracing::trace;

/// Mask XORed over every stored weight
pub const WEIGHT_MASK: u32 = 0xA53C_C35A;

/// End-of-stream symbol
pub const END_SYMBOL: u16 = 0x100;

/// Byte symbols plus the end symbol
const LEAF_COUNT: usize = 257;

/// Leaves plus one internal node per merge
const NODE_COUNT: usize = LEAF_COUNT * 2 - 1;

/// Size of the stored weight table in bytes
pub const WEIGHT_TABLE_SIZE: usize = 256 * 4;

const NO_NODE: u16 = u16::MAX;

struct HuffmanTree {
    left: [u16; NODE_COUNT],
    right: [u16; NODE_COUNT],
    parent: [u16; NODE_COUNT],
    root: u16,
}

impl HuffmanTree {
    fn build(weights: &[u32; LEAF_COUNT]) -> CodecResult<Self> {
        let mut weight = [0u64; NODE_COUNT];
        let mut active = [false; NODE_COUNT];
        for (i, &w) in weights.iter().enumerate() {
            weight[i] = u64::from(w);
            active[i] = w != 0;
        }

        let mut tree = Self {
            left: [NO_NODE; NODE_COUNT],
            right: [NO_NODE; NODE_COUNT],
            parent: [NO_NODE; NODE_COUNT],
            root: NO_NODE,
        };

        let mut next = LEAF_COUNT;
        loop {
            let Some(first) = lowest_active(&weight, &active, next, None) else {
                return Err(CodecError::InvalidWeights("no symbol has a weight".into()));
            };
            let Some(second) = lowest_active(&weight, &active, next, Some(first)) else {
                tree.root = first as u16;
                break;
            };
            if next >= NODE_COUNT {
                return Err(CodecError::InvalidWeights("tree node capacity exceeded".into()));
            }

            weight[next] = weight[first] + weight[second];
            active[next] = true;
            active[first] = false;
            active[second] = false;
            tree.left[next] = first as u16;
            tree.right[next] = second as u16;
            tree.parent[first] = next as u16;
            tree.parent[second] = next as u16;
            next += 1;
        }

        trace!("Huffman tree built with {} internal nodes", next - LEAF_COUNT);
        Ok(tree)
    }

    const fn is_leaf(node: u16) -> bool {
        (node as usize) < LEAF_COUNT
    }

    /// Code for `symbol` as a bit list, root first.
    fn code(&self, symbol: u16) -> Vec<bool> {
        let mut bits = Vec::new();
        let mut node = symbol;
        while node != self.root {
            let parent = self.parent[node as usize];
            bits.push(self.right[parent as usize] == node);
            node = parent;
        }
        bits.reverse();
        bits
    }
}

/// First active node with the smallest non-zero weight, skipping `exclude`.
fn lowest_active(
    weight: &[u64; NODE_COUNT],
    active: &[bool; NODE_COUNT],
    limit: usize,
    exclude: Option<usize>,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in 0..limit {
        if !active[i] || Some(i) == exclude || weight[i] == 0 {
            continue;
        }
        match best {
            Some(b) if weight[b] <= weight[i] => {}
            _ => best = Some(i),
        }
    }
    best
}

fn read_weights(input: &[u8]) -> CodecResult<[u32; LEAF_COUNT]> {
    if input.len() < WEIGHT_TABLE_SIZE {
        return Err(CodecError::Truncated {
            needed: WEIGHT_TABLE_SIZE,
            available: input.len(),
        });
    }
    let mut weights = [0u32; LEAF_COUNT];
    for (i, chunk) in input[..WEIGHT_TABLE_SIZE].chunks_exact(4).enumerate() {
        let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        weights[i] = raw ^ WEIGHT_MASK;
    }
    weights[END_SYMBOL as usize] = 1;
    Ok(weights)
}

/// Decode a weight table plus bit stream into at most `capacity` bytes.
///
/// # Errors
///
/// Returns `CodecError::Truncated` when the weight table is incomplete.
pub fn decode(input: &[u8], capacity: usize) -> CodecResult<Vec<u8>> {
    let weights = read_weights(input)?;
    let tree = HuffmanTree::build(&weights)?;
    let bits = &input[WEIGHT_TABLE_SIZE..];

    // Every decoded byte costs at least one bit.
    let mut out = Vec::with_capacity(capacity.min(bits.len().saturating_mul(8)));
    if HuffmanTree::is_leaf(tree.root) {
        // Only the end symbol carries weight: the stream is empty.
        return Ok(out);
    }

    let total_bits = bits.len() * 8;
    let mut bit_pos = 0usize;
    let mut node = tree.root;
    while out.len() < capacity && bit_pos < total_bits {
        let byte = bits[bit_pos / 8];
        let bit = (byte >> (7 - (bit_pos % 8))) & 1;
        bit_pos += 1;

        node = if bit == 0 {
            tree.left[node as usize]
        } else {
            tree.right[node as usize]
        };
        if node == NO_NODE {
            return Err(CodecError::CorruptBitStream(bit_pos));
        }
        if HuffmanTree::is_leaf(node) {
            if node == END_SYMBOL {
                break;
            }
            out.push(node as u8);
            node = tree.root;
        }
    }

    trace!("Huffman decoded {} bytes from {} bits", out.len(), bit_pos);
    Ok(out)
}

/// Encode `data` with a weight table derived from its byte frequencies.
///
/// The output decodes back to `data` with [`decode`] given a capacity of at
/// least `data.len()`.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let mut weights = [0u32; LEAF_COUNT];
    for (w, &c) in weights.iter_mut().zip(counts.iter()) {
        *w = u32::try_from(c).unwrap_or(u32::MAX);
    }
    weights[END_SYMBOL as usize] = 1;

    let mut out = Vec::with_capacity(WEIGHT_TABLE_SIZE + data.len() / 2);
    for &w in &weights[..256] {
        out.extend_from_slice(&(w ^ WEIGHT_MASK).to_le_bytes());
    }

    // The weight table always contains the end symbol, so building cannot
    // fail here.
    let Ok(tree) = HuffmanTree::build(&weights) else {
        return out;
    };
    if HuffmanTree::is_leaf(tree.root) {
        return out;
    }

    let mut codes: Vec<Option<Vec<bool>>> = vec![None; LEAF_COUNT];
    let mut writer = BitWriter::new(&mut out);
    for &b in data {
        let code = codes[b as usize].get_or_insert_with(|| tree.code(u16::from(b)));
        writer.write_bits(code);
    }
    writer.write_bits(&tree.code(END_SYMBOL));
    writer.finish();
    out
}

struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    current: u8,
    filled: u8,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            current: 0,
            filled: 0,
        }
    }

    fn write_bits(&mut self, bits: &[bool]) {
        for &bit in bits {
            self.current = (self.current << 1) | u8::from(bit);
            self.filled += 1;
            if self.filled == 8 {
                self.out.push(self.current);
                self.current = 0;
                self.filled = 0;
            }
        }
    }

    fn finish(self) {
        if self.filled > 0 {
            self.out.push(self.current << (8 - self.filled));
        }
    }
}
