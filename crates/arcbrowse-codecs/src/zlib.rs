//! RFC 1950 zlib streams

use crate::error::{CodecError, CodecResult};
use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::io::Read;

/// Default ceiling on inflated output (1 GiB)
///
/// Archive entries in this ecosystem store a 32-bit unpacked size, so
/// anything larger is a corrupt or hostile stream.
pub const MAX_INFLATE_SIZE: usize = 1024 * 1024 * 1024;

/// Inflate a zlib stream, refusing to produce more than `limit` bytes.
///
/// # Errors
///
/// Returns `CodecError::Zlib` for malformed streams and
/// `CodecError::SizeLimitExceeded` when the output grows past `limit`.
pub fn inflate(input: &[u8], limit: usize) -> CodecResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(input);
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = decoder
            .read(&mut buffer)
            .map_err(|e| CodecError::Zlib(e.to_string()))?;
        if n == 0 {
            break;
        }
        if out.len() + n > limit {
            return Err(CodecError::SizeLimitExceeded { limit });
        }
        out.extend_from_slice(&buffer[..n]);
    }
    Ok(out)
}

/// Compress `input` into a zlib stream at the default level.
///
/// # Errors
///
/// Returns `CodecError::Zlib` if the encoder fails.
pub fn deflate(input: &[u8]) -> CodecResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(input, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Zlib(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inflates_what_it_deflates() {
        let data = b"PACKDATA0000".repeat(64);
        let packed = deflate(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(packed[0], 0x78);
        assert_eq!(inflate(&packed, MAX_INFLATE_SIZE).unwrap(), data);
    }

    #[test]
    fn limit_is_enforced() {
        let packed = deflate(&vec![0u8; 100_000]).unwrap();
        assert!(matches!(
            inflate(&packed, 1000),
            Err(CodecError::SizeLimitExceeded { limit: 1000 })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(inflate(b"definitely not zlib", MAX_INFLATE_SIZE).is_err());
    }
}
