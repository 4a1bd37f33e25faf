//! `LIB_PACKDATA0000` archives
//!
//! ```text
//! 0x00  "LIB_"
//! 0x04  "PACKDATA0000"
//! 0x10  u32 version
//! 0x14  i32 entry count
//! 0x18  u32 reserved
//! 0x1C  u32 encrypted
//! 0x20  index: count x 256-byte records
//! ```
//!
//! Each record holds a NUL-terminated UTF-16LE name in its first 0xE0
//! bytes, followed by compression, stored size, unpacked size, a reserved
//! word and the 64-bit payload offset. Encrypted archives XOR every payload
//! byte with a key folded from the entry's stored offset; compressed
//! payloads are zlib streams.

use arcbrowse_codecs::{xor, zlib};
use arcbrowse_core::archive::{ArcIndex, ArchiveFormat, PackSource, Resource};
use arcbrowse_core::entry::{Entry, is_sane_count, kind};
use arcbrowse_core::stream::decode_cstring;
use arcbrowse_core::{ArcFile, ArcView, CancelFlag, EntryStream, Error, Result, WriteSeek};
use binrw::{BinRead, BinWrite};
use encoding_rs::UTF_16LE;
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, info, trace};

const TAG: &str = "LIB";
const INDEX_OFFSET: u64 = 0x20;
const RECORD_SIZE: u64 = 0x100;
const NAME_FIELD: usize = 0xE0;
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little, magic = b"LIB_PACKDATA0000")]
struct Header {
    version: u32,
    count: i32,
    reserved: u32,
    encrypted: u32,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
struct Record {
    name: [u8; NAME_FIELD],
    compression: u32,
    size: u32,
    unpacked_size: u32,
    reserved: u32,
    offset: i64,
    padding: [u8; 8],
}

impl Record {
    fn name(&self) -> String {
        decode_cstring(&self.name, UTF_16LE)
    }

    fn encode_name(name: &str) -> Result<[u8; NAME_FIELD]> {
        let mut field = [0u8; NAME_FIELD];
        let units: Vec<u16> = name.encode_utf16().collect();
        if units.is_empty() || units.len() * 2 >= NAME_FIELD {
            return Err(Error::InvalidFileName(name.to_string()));
        }
        for (slot, unit) in field.chunks_exact_mut(2).zip(units) {
            slot.copy_from_slice(&unit.to_le_bytes());
        }
        Ok(field)
    }
}

/// Resolved per-archive flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibState {
    /// Payloads are XORed with the offset-derived key
    pub encrypted: bool,
}

/// `LIB_PACKDATA0000` resource archive
#[derive(Debug, Default)]
pub struct LibFormat;

impl LibFormat {
    /// New format instance.
    pub const fn new() -> Self {
        Self
    }
}

impl Resource for LibFormat {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn description(&self) -> &'static str {
        "LIB_PACKDATA resource archive"
    }

    fn signature(&self) -> u32 {
        0x5F42_494C
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["lib", "dat"]
    }

    fn kind(&self) -> &'static str {
        kind::ARCHIVE
    }
}

impl ArchiveFormat for LibFormat {
    fn try_open(&self, view: &ArcView) -> Result<Option<ArcIndex>> {
        let mut frame = view.create_frame();
        if !frame.ascii_equal(0, "LIB_") || !frame.ascii_equal(4, "PACKDATA0000") {
            return Ok(None);
        }
        let count = i64::from(frame.read_i32(0x14)?);
        if !is_sane_count(count) {
            debug!("LIB count {} is not plausible", count);
            return Ok(None);
        }
        let index_size = count as u64 * RECORD_SIZE;
        if INDEX_OFFSET + index_size > view.max_offset() {
            return Ok(None);
        }

        let mut stream = view.binary_stream(0, INDEX_OFFSET + index_size)?;
        let header = Header::read(&mut stream)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let record = Record::read(&mut stream)?;
            let mut entry = Entry::new(record.name(), record.offset, record.size)
                .with_flags(record.compression);
            if record.compression != 0 {
                entry = entry.with_packed(record.unpacked_size, true);
            }
            if !entry.check_placement(view.max_offset()) {
                debug!("LIB entry {} lies outside the file", entry.name());
                return Ok(None);
            }
            trace!("LIB entry {} at {:#x}", entry.name(), entry.offset());
            entries.push(entry);
        }

        let state = LibState {
            encrypted: header.encrypted != 0,
        };
        Ok(Some(ArcIndex::new(entries).with_state(state)))
    }

    fn open_entry<'a>(&self, arc: &'a ArcFile, entry: &Entry) -> Result<EntryStream<'a>> {
        let encrypted = arc.state::<LibState>().is_some_and(|s| s.encrypted);
        if !encrypted && !entry.is_packed() {
            return arc.open_raw(entry);
        }

        let mut data = arc
            .view()
            .read_bytes_at(entry.offset() as u64, u64::from(entry.size()))?;
        if encrypted {
            xor::apply_offset_key(&mut data, entry.offset() as u64, 0);
        }
        if entry.is_packed() {
            let limit = (entry.unpacked_size() as usize).min(zlib::MAX_INFLATE_SIZE);
            data = zlib::inflate(&data, limit)?;
        }
        Ok(EntryStream::from_bytes(data))
    }

    fn is_hierarchic(&self) -> bool {
        true
    }

    fn contained_formats(&self) -> &'static [&'static str] {
        &["BMP", "PNG", "GRP"]
    }

    fn can_create(&self) -> bool {
        true
    }

    fn create(
        &self,
        output: &mut dyn WriteSeek,
        files: &[PackSource],
        cancel: &CancelFlag,
    ) -> Result<()> {
        let count = i32::try_from(files.len())
            .ok()
            .filter(|&c| is_sane_count(i64::from(c)))
            .ok_or_else(|| Error::invalid(TAG, format!("cannot pack {} files", files.len())))?;

        let mut output: &mut dyn WriteSeek = output;
        let start = output.stream_position()?;
        let header = Header {
            version: FORMAT_VERSION,
            count,
            reserved: 0,
            encrypted: 0,
        };
        header.write(&mut output)?;
        let index_start = output.stream_position()?;
        output.write_all(&vec![0u8; files.len() * RECORD_SIZE as usize])?;

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            cancel.check()?;
            let name = Record::encode_name(&file.name)?;
            let data = std::fs::read(&file.path)?;
            let unpacked_size =
                u32::try_from(data.len()).map_err(|_| Error::FileTooLarge(data.len() as u64))?;
            let packed = zlib::deflate(&data)?;
            let (compression, payload) = if packed.len() < data.len() {
                (1, packed)
            } else {
                (0, data)
            };

            let offset = output.stream_position()? - start;
            output.write_all(&payload)?;
            records.push(Record {
                name,
                compression,
                size: payload.len() as u32,
                unpacked_size,
                reserved: 0,
                offset: offset as i64,
                padding: [0; 8],
            });
        }

        let end = output.stream_position()?;
        output.seek(SeekFrom::Start(index_start))?;
        for record in &records {
            record.write(&mut output)?;
        }
        output.seek(SeekFrom::Start(end))?;
        info!("Packed {} files into LIB archive", records.len());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Read};
    use std::sync::Arc;

    /// Build a LIB image by hand, independent of `create`.
    fn build(
        files: &[(&str, &[u8])],
        encrypted: bool,
        compress: bool,
    ) -> Vec<u8> {
        let mut out = b"LIB_PACKDATA0000".to_vec();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(files.len() as i32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&u32::from(encrypted).to_le_bytes());

        let mut offset = INDEX_OFFSET as usize + files.len() * RECORD_SIZE as usize;
        let mut payloads = Vec::new();
        for (name, data) in files {
            let mut payload = if compress {
                zlib::deflate(data).unwrap()
            } else {
                data.to_vec()
            };
            if encrypted {
                xor::apply_offset_key(&mut payload, offset as u64, 0);
            }
            let mut record = vec![0u8; RECORD_SIZE as usize];
            for (i, unit) in name.encode_utf16().enumerate() {
                record[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
            record[0xE0..0xE4].copy_from_slice(&u32::from(compress).to_le_bytes());
            record[0xE4..0xE8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            record[0xE8..0xEC].copy_from_slice(&(data.len() as u32).to_le_bytes());
            record[0xF0..0xF8].copy_from_slice(&(offset as i64).to_le_bytes());
            out.extend_from_slice(&record);
            offset += payload.len();
            payloads.push(payload);
        }
        for payload in payloads {
            out.extend_from_slice(&payload);
        }
        out
    }

    fn open(bytes: Vec<u8>) -> Option<ArcFile> {
        let view = ArcView::from_bytes(bytes, "test.lib");
        ArcFile::try_open(Arc::new(LibFormat), view).unwrap()
    }

    fn read_all(arc: &ArcFile, entry: &Entry) -> Vec<u8> {
        let mut out = Vec::new();
        arc.open_entry(entry).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn header_layout_matches_detection_offsets() {
        let bytes = build(&[("a", b"1")], true, false);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0x5F42_494C);
        assert_eq!(&bytes[4..16], b"PACKDATA0000");
        assert_eq!(i32::from_le_bytes(bytes[0x14..0x18].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[0x1C..0x20].try_into().unwrap()), 1);
    }

    #[test]
    fn encrypted_payloads_are_decrypted() {
        let arc = open(build(&[("a.txt", b"secret text")], true, false)).unwrap();
        assert_eq!(arc.state::<LibState>(), Some(&LibState { encrypted: true }));
        assert_eq!(read_all(&arc, &arc.entries()[0]), b"secret text");
    }

    #[test]
    fn compressed_payloads_are_inflated() {
        let data = b"compressible ".repeat(40);
        for encrypted in [false, true] {
            let arc = open(build(&[("c.bin", &data)], encrypted, true)).unwrap();
            let entry = &arc.entries()[0];
            assert!(entry.is_packed());
            assert_eq!(entry.unpacked_size() as usize, data.len());
            assert_eq!(read_all(&arc, entry), data);
        }
    }

    #[test]
    fn names_are_utf16() {
        let arc = open(build(&[("画像/背景.bmp", b"BM")], false, false)).unwrap();
        assert_eq!(arc.entries()[0].name(), "画像/背景.bmp");
    }

    #[test]
    fn truncated_index_is_not_recognized() {
        let mut bytes = build(&[("a", b"1"), ("b", b"2")], false, false);
        bytes.truncate(INDEX_OFFSET as usize + RECORD_SIZE as usize);
        assert!(open(bytes).is_none());
    }

    #[test]
    fn misplaced_entry_rejects_the_archive() {
        let mut bytes = build(&[("a", b"1234")], false, false);
        let at = INDEX_OFFSET as usize + 0xE4;
        bytes[at..at + 4].copy_from_slice(&0x1000u32.to_le_bytes());
        assert!(open(bytes).is_none());
    }

    #[test]
    fn created_archives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"tiny").unwrap();
        std::fs::write(&b, vec![7u8; 4096]).unwrap();

        let mut out = Cursor::new(Vec::new());
        LibFormat
            .create(
                &mut out,
                &[PackSource::new("a.txt", &a), PackSource::new("data/b.bin", &b)],
                &CancelFlag::new(),
            )
            .unwrap();

        let arc = open(out.into_inner()).unwrap();
        let entries = arc.entries();
        assert_eq!(entries[0].name(), "a.txt");
        assert!(!entries[0].is_packed());
        assert!(entries[1].is_packed());
        assert_eq!(read_all(&arc, &entries[0]), b"tiny");
        assert_eq!(read_all(&arc, &entries[1]), vec![7u8; 4096]);
    }

    #[test]
    fn create_rejects_empty_and_oversized_names() {
        let mut out = Cursor::new(Vec::new());
        assert!(LibFormat.create(&mut out, &[], &CancelFlag::new()).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();
        let long = "n".repeat(200);
        let err = LibFormat
            .create(&mut out, &[PackSource::new(long, &path)], &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFileName(_)));
    }

    #[test]
    fn canceled_create_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"x").unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut out = Cursor::new(Vec::new());
        let err = LibFormat
            .create(&mut out, &[PackSource::new("x", &path)], &cancel)
            .unwrap_err();
        assert!(err.is_canceled());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn created_entries_keep_names_and_bytes(
            name in "[a-z]{1,12}(/[a-z]{1,12}){0,2}\\.[a-z]{3}",
            data in proptest::collection::vec(any::<u8>(), 1..512),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("input");
            std::fs::write(&path, &data).unwrap();

            let mut out = Cursor::new(Vec::new());
            LibFormat
                .create(&mut out, &[PackSource::new(name.clone(), &path)], &CancelFlag::new())
                .unwrap();
            let arc = open(out.into_inner()).unwrap();
            let entry = &arc.entries()[0];
            prop_assert_eq!(entry.name(), name.as_str());
            prop_assert_eq!(entry.unpacked_size() as usize, data.len());
            prop_assert_eq!(read_all(&arc, entry), data);
        }
    }
}
