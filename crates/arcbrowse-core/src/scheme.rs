//! Versioned scheme database
//!
//! Formats that need external data (title keys, name lists) receive it from
//! a scheme database loaded after the catalog is built. On disk the database
//! is an 8-byte magic, an `i32` little-endian version and a zlib stream
//! holding a JSON object keyed by format tag:
//!
//! ```text
//! 0x00  "ARCSCHM\x1a"
//! 0x08  i32 version
//! 0x0C  zlib(JSON { "<TAG>": <format-specific value>, ... })
//! ```

use crate::error::{Error, Result};
use arcbrowse_codecs::zlib;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Leading bytes of a scheme database file
pub const SCHEME_MAGIC: &[u8; 8] = b"ARCSCHM\x1a";

/// Largest JSON payload accepted when inflating a database
const MAX_SCHEME_SIZE: usize = 64 * 1024 * 1024;

/// Per-format configuration keyed by format tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemeDatabase {
    version: i32,
    schemes: BTreeMap<String, Value>,
}

impl SchemeDatabase {
    /// Empty database with the given version.
    pub const fn new(version: i32) -> Self {
        Self {
            version,
            schemes: BTreeMap::new(),
        }
    }

    /// Add or replace the scheme of `tag`.
    #[must_use]
    pub fn with_scheme(mut self, tag: impl Into<String>, scheme: Value) -> Self {
        self.schemes.insert(tag.into(), scheme);
        self
    }

    /// Database version
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Scheme for `tag`, if present
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.schemes.get(tag)
    }

    /// Tags with a scheme
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Parse a database.
    ///
    /// # Errors
    ///
    /// Returns `Error::Scheme` for a wrong magic or a payload that is not a
    /// JSON object, and propagates I/O and zlib failures.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != SCHEME_MAGIC {
            return Err(Error::Scheme("bad magic".to_string()));
        }
        let version = reader.read_i32::<LittleEndian>()?;

        let mut packed = Vec::new();
        reader.read_to_end(&mut packed)?;
        let json = zlib::inflate(&packed, MAX_SCHEME_SIZE)?;
        let schemes: BTreeMap<String, Value> = match serde_json::from_slice(&json)? {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(Error::Scheme(format!(
                    "expected an object, found {}",
                    json_kind(&other)
                )));
            }
        };
        debug!(
            "Read scheme database v{} with {} formats",
            version,
            schemes.len()
        );
        Ok(Self { version, schemes })
    }

    /// Serialize the database.
    ///
    /// # Errors
    ///
    /// Propagates I/O and compression failures.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(SCHEME_MAGIC)?;
        writer.write_i32::<LittleEndian>(self.version)?;
        let json = serde_json::to_vec(&self.schemes)?;
        writer.write_all(&zlib::deflate(&json)?)?;
        Ok(())
    }

    /// Load a database file.
    ///
    /// # Errors
    ///
    /// See [`SchemeDatabase::read`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }

    /// Save to a file.
    ///
    /// # Errors
    ///
    /// See [`SchemeDatabase::write`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn written_database_reads_back() {
        let db = SchemeDatabase::new(7).with_scheme("HPK", json!({"titles": {"SKR1": 90}}));
        let mut bytes = Vec::new();
        db.write(&mut bytes).unwrap();
        assert_eq!(&bytes[..8], SCHEME_MAGIC);
        assert_eq!(&bytes[8..12], &7i32.to_le_bytes());

        let back = SchemeDatabase::read(&bytes[..]).unwrap();
        assert_eq!(back, db);
        assert_eq!(back.tags().collect::<Vec<_>>(), ["HPK"]);
        assert_eq!(back.get("HPK").unwrap()["titles"]["SKR1"], 90);
    }

    #[test]
    fn wrong_magic_is_a_scheme_error() {
        let err = SchemeDatabase::read(&b"NOTSCHEM\0\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, Error::Scheme(_)));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let mut bytes = SCHEME_MAGIC.to_vec();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&zlib::deflate(b"[1,2]").unwrap());
        assert!(matches!(SchemeDatabase::read(&bytes[..]), Err(Error::Scheme(_))));
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemes.dat");
        let db = SchemeDatabase::new(3).with_scheme("TXPK", json!(null));
        db.save(&path).unwrap();
        assert_eq!(SchemeDatabase::from_file(&path).unwrap().version(), 3);
    }
}
