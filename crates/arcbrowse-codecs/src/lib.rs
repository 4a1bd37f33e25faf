//! Byte-level transforms used by game resource archives
//!
//! Archive formats for visual-novel and adventure engines rarely use a
//! single well-known codec. Instead they chain a few cheap transforms in a
//! per-format order, usually selected by flag bits in the archive index:
//!
//! - **XOR**: per-byte XOR against a constant, or against a key folded from
//!   the entry's own stored offset ([`xor`])
//! - **Substitution**: a 256-entry byte map applied to index blobs
//!   ([`substitution`])
//! - **Huffman**: a 512-node tree built from a stored weight table
//!   ([`huffman`])
//! - **RLE**: byte-oriented run-length coding ([`rle`])
//! - **Zlib**: ordinary RFC 1950 streams ([`zlib`])
//!
//! Every transform works on in-memory buffers and performs no I/O.
//!
//! # Example
//!
//! ```
//! use arcbrowse_codecs::{huffman, rle};
//!
//! let data = b"aaaaaaaabcbcbcbc".to_vec();
//! let packed = huffman::encode(&rle::encode(&data));
//! let rle_bytes = huffman::decode(&packed, 1024).expect("valid stream");
//! let restored = rle::decode(&rle_bytes, data.len()).expect("valid stream");
//! assert_eq!(restored, data);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod huffman;
pub mod rle;
pub mod substitution;
pub mod xor;
pub mod zlib;

pub use error::{CodecError, CodecResult};
pub use substitution::SubstitutionTable;
