//! Error types for codec operations

use thiserror::Error;

/// Result alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding packed or encrypted payloads
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended before a mandatory structure was complete
    #[error("truncated input: needed {needed} bytes, got {available}")]
    Truncated {
        /// Bytes required by the structure being read
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Huffman weight table does not describe a usable tree
    #[error("invalid Huffman weight table: {0}")]
    InvalidWeights(String),

    /// Huffman bit stream walked into a node that does not exist
    #[error("corrupt Huffman stream at bit {0}")]
    CorruptBitStream(usize),

    /// Zlib stream could not be inflated
    #[error("zlib error: {0}")]
    Zlib(String),

    /// Decoded output would exceed the configured limit
    #[error("decompressed size exceeds limit of {limit} bytes")]
    SizeLimitExceeded {
        /// The limit that was hit
        limit: usize,
    },
}
