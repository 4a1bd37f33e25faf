//! `TXPK` archives with a text index
//!
//! ```text
//! 0x00  "TXPK"
//! 0x04  u32 index size
//! 0x08  index, byte-substituted
//! ```
//!
//! After undoing the substitution the index is Shift-JIS text, one entry
//! per line: `path<TAB>offset<TAB>size`. Paths use `\` between directories
//! and offsets count from the start of the file.

use arcbrowse_codecs::SubstitutionTable;
use arcbrowse_core::archive::{ArcIndex, ArchiveFormat, Resource};
use arcbrowse_core::entry::{Entry, is_sane_count, kind};
use arcbrowse_core::{ArcView, Error, Result};
use encoding_rs::SHIFT_JIS;
use tracing::debug;

const TAG: &str = "TXPK";
const INDEX_OFFSET: u64 = 8;

/// Table applied to every index byte when the archive is written
pub const INDEX_TABLE: SubstitutionTable = SubstitutionTable::affine(0x35, 0xA7);

const INDEX_DECODE: SubstitutionTable = INDEX_TABLE.inverse();

/// Text-indexed archive
#[derive(Debug, Default)]
pub struct TxpkFormat;

impl TxpkFormat {
    /// New format instance.
    pub const fn new() -> Self {
        Self
    }
}

fn parse_line(line: &str) -> Option<Entry> {
    let mut fields = line.split('\t');
    let name = fields.next()?.trim();
    let offset = fields.next()?.trim().parse::<i64>().ok()?;
    let size = fields.next()?.trim().parse::<u32>().ok()?;
    if name.is_empty() || fields.next().is_some() {
        return None;
    }
    Some(Entry::new(name, offset, size))
}

impl Resource for TxpkFormat {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn description(&self) -> &'static str {
        "Text-indexed resource archive"
    }

    fn signature(&self) -> u32 {
        u32::from_le_bytes(*b"TXPK")
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txp", "arc"]
    }

    fn kind(&self) -> &'static str {
        kind::ARCHIVE
    }
}

impl ArchiveFormat for TxpkFormat {
    fn try_open(&self, view: &ArcView) -> Result<Option<ArcIndex>> {
        let mut frame = view.create_frame();
        if !frame.ascii_equal(0, "TXPK") {
            return Ok(None);
        }
        let index_size = u64::from(frame.read_u32(4)?);
        if index_size == 0 || INDEX_OFFSET + index_size > view.max_offset() {
            return Ok(None);
        }

        let mut index = frame.read_bytes(INDEX_OFFSET, index_size)?;
        INDEX_DECODE.apply(&mut index);
        let (text, _, had_errors) = SHIFT_JIS.decode(&index);
        if had_errors {
            debug!("TXPK index of {} is not Shift-JIS text", view.name());
            return Ok(None);
        }

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if !is_sane_count(lines.len() as i64) {
            return Ok(None);
        }
        let mut entries = Vec::with_capacity(lines.len());
        for (number, line) in lines.into_iter().enumerate() {
            let entry = parse_line(line).ok_or_else(|| {
                Error::invalid(TAG, format!("malformed index line {}", number + 1))
            })?;
            if !entry.check_placement(view.max_offset()) {
                debug!("TXPK entry {} lies outside the file", entry.name());
                return Ok(None);
            }
            entries.push(entry);
        }
        Ok(Some(ArcIndex::new(entries)))
    }

    fn is_hierarchic(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use arcbrowse_core::{ArcFile, FileSystem};
    use std::io::Read;
    use std::sync::Arc;

    fn build(files: &[(&str, &[u8])], trailer: &str) -> Vec<u8> {
        let mut text = String::new();
        let mut payload = Vec::new();
        let mut sizes = Vec::new();
        for (name, data) in files {
            sizes.push((name, payload.len(), data.len()));
            payload.extend_from_slice(data);
        }
        // Offsets depend on the index length, which depends on the offsets.
        let mut index_len = 0;
        loop {
            text.clear();
            for (name, rel, len) in &sizes {
                text.push_str(&format!("{}\t{}\t{}\r\n", name, 8 + index_len + rel, len));
            }
            text.push_str(trailer);
            let (encoded, _, _) = SHIFT_JIS.encode(&text);
            if encoded.len() == index_len {
                break;
            }
            index_len = encoded.len();
        }
        let (encoded, _, _) = SHIFT_JIS.encode(&text);
        let mut index = encoded.into_owned();
        INDEX_TABLE.apply(&mut index);

        let mut out = b"TXPK".to_vec();
        out.extend_from_slice(&(index.len() as u32).to_le_bytes());
        out.extend_from_slice(&index);
        out.extend_from_slice(&payload);
        out
    }

    fn open(bytes: Vec<u8>) -> Result<Option<ArcFile>> {
        ArcFile::try_open(Arc::new(TxpkFormat), ArcView::from_bytes(bytes, "t.txp"))
    }

    #[test]
    fn reads_substituted_text_index() {
        let arc = open(build(&[("bg\\01.bmp", b"BMxx"), ("音声\\a.ogg", b"OggS")], ""))
            .unwrap()
            .unwrap();
        assert_eq!(arc.entries()[1].name(), "音声\\a.ogg");
        let mut data = Vec::new();
        arc.open_entry(&arc.entries()[1]).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"OggS");
    }

    #[test]
    fn backslash_paths_form_a_tree() {
        let arc = open(build(&[("bg\\01.bmp", b"BM"), ("se\\a.ogg", b"O")], ""))
            .unwrap()
            .unwrap();
        let mut fs = arc.create_file_system();
        assert_eq!(fs.get_files().unwrap().len(), 2);
        fs.set_current_directory("bg").unwrap();
        assert_eq!(fs.get_files().unwrap()[0].name(), "bg\\01.bmp");
    }

    #[test]
    fn malformed_lines_are_corruption() {
        let err = open(build(&[("a.txt", b"1")], "broken line\r\n")).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { format: "TXPK", .. }));
    }

    #[test]
    fn empty_or_truncated_index_is_not_recognized() {
        assert!(open(b"TXPK\0\0\0\0".to_vec()).unwrap().is_none());
        assert!(open(b"TXPK\xFF\0\0\0abc".to_vec()).unwrap().is_none());
    }

    #[test]
    fn substitution_tables_are_inverse() {
        for b in 0..=255u8 {
            assert_eq!(INDEX_DECODE.map_byte(INDEX_TABLE.map_byte(b)), b);
        }
    }
}
