//! `HPAK` archives
//!
//! ```text
//! 0x00  "HPAK"
//! 0x04  u32 entry count
//! 0x08  u32 index offset
//! 0x0C  [u8; 4] title code
//! ```
//!
//! The index is a run of 48-byte records: a NUL-padded Shift-JIS name of 32
//! bytes, then offset, stored size, unpacked size and flags. Flags select
//! the payload transforms, applied in this order:
//!
//! 1. `0x40` decrypt. The low nibble is the first encrypted byte: zero means
//!    the whole payload is XORed with the title key from the scheme
//!    database, anything else means an offset-derived key from that byte on.
//! 2. `0x80` Huffman.
//! 3. `0x10` RLE.

use arcbrowse_codecs::{huffman, rle, xor};
use arcbrowse_core::archive::{ArcIndex, ArchiveFormat, Resource};
use arcbrowse_core::entry::{Entry, is_sane_count, kind};
use arcbrowse_core::stream::decode_cstring;
use arcbrowse_core::{ArcFile, ArcView, EntryStream, Error, Result};
use binrw::BinRead;
use encoding_rs::SHIFT_JIS;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, trace};

const RECORD_SIZE: u64 = 48;

/// Payload is encrypted
pub const FLAG_ENCRYPTED: u32 = 0x40;
/// Payload is Huffman coded
pub const FLAG_HUFFMAN: u32 = 0x80;
/// Payload is run-length coded
pub const FLAG_RLE: u32 = 0x10;
/// First encrypted byte; zero selects the title key
pub const START_MASK: u32 = 0x0F;

#[derive(Debug, BinRead)]
#[br(little, magic = b"HPAK")]
struct Header {
    count: u32,
    index_offset: u32,
    title: [u8; 4],
}

#[derive(Debug, BinRead)]
#[br(little)]
struct Record {
    name: [u8; 32],
    offset: u32,
    size: u32,
    unpacked_size: u32,
    flags: u32,
}

/// Title resolved when the archive was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpkState {
    /// Four-character title code from the header
    pub title: String,
    /// Constant key for the title, if the scheme knows it
    pub key: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct HpkScheme {
    #[serde(default)]
    titles: HashMap<String, u8>,
}

/// `HPAK` archive with per-title keys
#[derive(Debug, Default)]
pub struct HpkFormat {
    titles: RwLock<HashMap<String, u8>>,
}

impl HpkFormat {
    /// Format with no known titles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constant key of a title.
    #[must_use]
    pub fn with_title(self, code: impl Into<String>, key: u8) -> Self {
        self.titles.write().insert(code.into(), key);
        self
    }

    /// Key registered for `code`
    pub fn title_key(&self, code: &str) -> Option<u8> {
        self.titles.read().get(code).copied()
    }
}

impl Resource for HpkFormat {
    fn tag(&self) -> &'static str {
        "HPK"
    }

    fn description(&self) -> &'static str {
        "HPAK resource archive"
    }

    fn signature(&self) -> u32 {
        u32::from_le_bytes(*b"HPAK")
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["hpk", "pak"]
    }

    fn kind(&self) -> &'static str {
        kind::ARCHIVE
    }

    fn update_scheme(&self, scheme: &serde_json::Value) -> Result<()> {
        let scheme = HpkScheme::deserialize(scheme)
            .map_err(|e| Error::Scheme(format!("HPK: {e}")))?;
        debug!("HPK scheme adds {} titles", scheme.titles.len());
        self.titles.write().extend(scheme.titles);
        Ok(())
    }
}

impl ArchiveFormat for HpkFormat {
    fn try_open(&self, view: &ArcView) -> Result<Option<ArcIndex>> {
        if !view.ascii_equal_at(0, "HPAK") {
            return Ok(None);
        }
        let header = Header::read(&mut view.binary_stream(0, 16)?)?;
        let count = i64::from(header.count);
        if !is_sane_count(count) {
            return Ok(None);
        }
        let index_offset = u64::from(header.index_offset);
        let index_size = count as u64 * RECORD_SIZE;
        if index_offset + index_size > view.max_offset() {
            return Ok(None);
        }

        let mut stream = view.binary_stream(index_offset, index_size)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let record = Record::read(&mut stream)?;
            let mut entry = Entry::new(
                decode_cstring(&record.name, SHIFT_JIS),
                i64::from(record.offset),
                record.size,
            )
            .with_flags(record.flags);
            if record.flags & (FLAG_HUFFMAN | FLAG_RLE) != 0 {
                entry = entry.with_packed(record.unpacked_size, true);
            }
            if !entry.check_placement(view.max_offset()) {
                debug!("HPK entry {} lies outside the file", entry.name());
                return Ok(None);
            }
            entries.push(entry);
        }

        let title = String::from_utf8_lossy(&header.title)
            .trim_end_matches('\0')
            .to_string();
        let key = self.title_key(&title);
        trace!("HPK title {:?} key known: {}", title, key.is_some());
        Ok(Some(ArcIndex::new(entries).with_state(HpkState { title, key })))
    }

    fn open_entry<'a>(&self, arc: &'a ArcFile, entry: &Entry) -> Result<EntryStream<'a>> {
        let flags = entry.flags();
        if flags & FLAG_ENCRYPTED == 0 && !entry.is_packed() {
            return arc.open_raw(entry);
        }

        let mut data = arc
            .view()
            .read_bytes_at(entry.offset() as u64, u64::from(entry.size()))?;

        if flags & FLAG_ENCRYPTED != 0 {
            let start = (flags & START_MASK) as usize;
            if start == 0 {
                let state = arc.state::<HpkState>();
                let key = state
                    .and_then(|s| s.key.or_else(|| self.title_key(&s.title)))
                    .ok_or_else(|| {
                        Error::UnknownEncryptionScheme(
                            state.map_or_else(String::new, |s| s.title.clone()),
                        )
                    })?;
                xor::apply_constant(&mut data, key, 0);
            } else {
                xor::apply_offset_key(&mut data, entry.offset() as u64, start);
            }
        }

        let unpacked = entry.unpacked_size() as usize;
        if flags & FLAG_HUFFMAN != 0 {
            let capacity = if flags & FLAG_RLE != 0 {
                rle::max_encoded_len(unpacked)
            } else {
                unpacked
            };
            data = huffman::decode(&data, capacity)?;
        }
        if flags & FLAG_RLE != 0 {
            data = rle::decode(&data, unpacked)?;
        }
        Ok(EntryStream::from_bytes(data))
    }
}
