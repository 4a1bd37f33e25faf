//! Error types for archive browsing

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by views, streams, formats and the virtual filesystem
///
/// "Not this format" is never an error: probes return `Ok(None)` so the
/// catalog can try the next candidate. The variants below are reserved for
/// recognized-but-corrupt input, byte-level bounds violations and
/// user-facing conditions.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A read needed more bytes than the stream holds
    #[error("unexpected end of stream")]
    EndOfStream,

    /// Offset lies beyond the end of a view
    #[error("offset {offset:#x} out of range (size {size:#x})")]
    OutOfRange {
        /// Requested offset
        offset: u64,
        /// Size of the view
        size: u64,
    },

    /// Recognized container with an inconsistent structure
    #[error("invalid {format} archive: {reason}")]
    InvalidFormat {
        /// Tag of the format that recognized the input
        format: &'static str,
        /// What was wrong
        reason: String,
    },

    /// No registered format accepted the input
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// Operation stopped by the caller
    #[error("operation canceled")]
    Canceled,

    /// Encrypted content whose key is not known
    #[error("unknown encryption scheme: {0}")]
    UnknownEncryptionScheme(String),

    /// Entry name that cannot be used as a path
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// File does not fit the 32-bit size model
    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    /// Name lookup failed
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Directory navigation failed
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Capability not offered by this format or filesystem
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Payload transform failed
    #[error("codec error: {0}")]
    Codec(#[from] arcbrowse_codecs::CodecError),

    /// Image decoding failed
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Scheme database problem
    #[error("scheme database error: {0}")]
    Scheme(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary record parsing failure
    #[error("binary format error: {0}")]
    BinRead(binrw::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::EndOfStream
        } else {
            Self::Io(err)
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(e) => e.into(),
            other => Self::BinRead(other),
        }
    }
}

impl Error {
    /// Build an [`Error::InvalidFormat`] for `format`.
    pub fn invalid(format: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            format,
            reason: reason.into(),
        }
    }

    /// Whether this error reports a user-initiated stop
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Whether this error reports a read past the end of the data
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// Whether the caller should treat this as "input not recognized"
    pub const fn is_not_recognized(&self) -> bool {
        matches!(
            self,
            Self::EndOfStream | Self::OutOfRange { .. } | Self::UnknownFormat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_eof_maps_to_end_of_stream() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert!(err.is_end_of_stream());
        let err: Error = io::Error::other("boom").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn canceled_is_distinguished() {
        assert!(Error::Canceled.is_canceled());
        assert!(!Error::EndOfStream.is_canceled());
        assert!(Error::UnknownFormat("x".into()).is_not_recognized());
    }
}
