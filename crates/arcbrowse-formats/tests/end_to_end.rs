#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Archives on disk, opened and browsed through the default formats

use arcbrowse_codecs::xor;
use arcbrowse_core::archive::ArchiveFormat;
use arcbrowse_core::{
    ArcView, CancelFlag, Entry, Error, ExtractAction, FileSystemStack, SchemeDatabase,
};
use arcbrowse_formats::{LibFormat, catalog_builder, default_catalog};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Unencrypted, uncompressed LIB archive.
fn lib_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"LIB_PACKDATA0000".to_vec();
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(files.len() as i32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let mut offset = 0x20 + files.len() * 0x100;
    for (name, data) in files {
        let mut record = vec![0u8; 0x100];
        for (i, unit) in name.encode_utf16().enumerate() {
            record[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        record[0xE4..0xE8].copy_from_slice(&(data.len() as u32).to_le_bytes());
        record[0xE8..0xEC].copy_from_slice(&(data.len() as u32).to_le_bytes());
        record[0xF0..0xF8].copy_from_slice(&(offset as i64).to_le_bytes());
        out.extend_from_slice(&record);
        offset += data.len();
    }
    for (_, data) in files {
        out.extend_from_slice(data);
    }
    out
}

/// Bare header with an arbitrary entry count and enough padding to hold
/// one record.
fn lib_with_count(count: i32) -> Vec<u8> {
    let mut out = b"LIB_PACKDATA0000".to_vec();
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.resize(0x20 + 0x100, 0);
    out
}

/// 24-bit top-down bitmap of one color.
fn bitmap(width: u32, height: u32, bgr: [u8; 3]) -> Vec<u8> {
    let stride = ((width as usize * 3) + 3) & !3;
    let data_size = stride * height as usize;
    let mut out = b"BM".to_vec();
    out.extend_from_slice(&((54 + data_size) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&54u32.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(-(height as i32)).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 24]);
    for _ in 0..height {
        let mut row: Vec<u8> = bgr.repeat(width as usize);
        row.resize(stride, 0);
        out.extend_from_slice(&row);
    }
    out
}

fn find(entries: &[Entry], name: &str) -> Entry {
    entries
        .iter()
        .find(|e| e.name() == name || e.name().ends_with(&format!("/{name}")))
        .cloned()
        .unwrap_or_else(|| panic!("{name} not listed"))
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn lib_with_two_raw_entries() {
    let first = [0x11u8; 16];
    let second: Vec<u8> = (0..16).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "data.lib",
        &lib_archive(&[("a.bin", &first), ("b.bin", &second)]),
    );

    let arc = default_catalog()
        .open_archive(ArcView::open(&path).unwrap(), &path, &[])
        .unwrap();
    assert_eq!(arc.format().tag(), "LIB");
    let names: Vec<_> = arc.entries().iter().map(Entry::name).collect();
    assert_eq!(names, ["a.bin", "b.bin"]);

    for (entry, expected) in arc.entries().iter().zip([first.to_vec(), second]) {
        assert_eq!(entry.size(), 16);
        assert!(!entry.is_packed());
        let mut data = Vec::new();
        arc.open_entry(entry).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, expected);
    }

    let out = dir.path().join("out");
    let summary = arc
        .extract_files(&out, |_| ExtractAction::Continue, &CancelFlag::new())
        .unwrap();
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.bytes, 32);
    assert_eq!(fs::read(out.join("a.bin")).unwrap(), first);
}

#[test]
fn implausible_counts_are_not_recognized() {
    for count in [0, -1, 0x40000] {
        let view = ArcView::from_bytes(lib_with_count(count), "bad.lib");
        assert!(LibFormat::new().try_open(&view).unwrap().is_none());

        let err = default_catalog()
            .open_archive(view, "bad.lib", &[])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFormat(_)), "count {count}: {err}");
    }
}

#[test]
fn images_inside_a_lib_decode_through_the_stack() {
    let dir = tempfile::tempdir().unwrap();
    let picture = bitmap(3, 2, [0, 255, 0]);
    write(
        dir.path(),
        "cg.lib",
        &lib_archive(&[("cg/title.bmp", &picture), ("readme.txt", b"hello")]),
    );

    let mut stack = FileSystemStack::new(default_catalog(), dir.path()).unwrap();
    let lib = find(&stack.get_files().unwrap(), "cg.lib");
    stack.ch_dir(&lib).unwrap();
    assert_eq!(stack.count(), 2);

    let listing = stack.get_files().unwrap();
    let cg = find(&listing, "cg");
    assert!(cg.is_directory());
    stack.ch_dir(&cg).unwrap();

    let title = find(&stack.get_files().unwrap(), "title.bmp");
    assert_eq!(title.kind(), "image");
    let image = default_catalog().decode_image(stack.top(), &title).unwrap();
    assert_eq!((image.width(), image.height()), (3, 2));
    assert_eq!(image.image.to_rgb8().get_pixel(2, 1).0, [0, 255, 0]);
}

#[test]
fn split_bitmap_finds_its_sibling_in_the_archive() {
    let width = 2u32;
    let stride = 8;
    let mut grp = b"GRP1".to_vec();
    grp.extend_from_slice(&width.to_le_bytes());
    grp.extend_from_slice(&3u32.to_le_bytes());
    grp.extend_from_slice(&24u16.to_le_bytes());
    grp.extend_from_slice(&1u16.to_le_bytes());
    grp.extend_from_slice(&[0x10; 6]);
    grp.extend_from_slice(&[0; 2]);
    let mut gr2 = b"GRP2".to_vec();
    gr2.resize(16, 0);
    for _ in 0..2 {
        let mut row = vec![0x80u8; 6];
        row.resize(stride, 0);
        gr2.extend_from_slice(&row);
    }

    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "bg.lib",
        &lib_archive(&[("bg/sky.grp", &grp), ("bg/sky.gr2", &gr2)]),
    );
    let mut stack = FileSystemStack::new(default_catalog(), dir.path()).unwrap();
    let lib = find(&stack.get_files().unwrap(), "bg.lib");
    stack.ch_dir(&lib).unwrap();

    let sky = stack.top().find_file("bg/sky.grp").unwrap();
    let image = default_catalog().decode_image(stack.top(), &sky).unwrap();
    let rgb = image.image.to_rgb8();
    assert_eq!(rgb.dimensions(), (2, 3));
    assert_eq!(rgb.get_pixel(0, 0).0, [0x10; 3]);
    assert_eq!(rgb.get_pixel(1, 2).0, [0x80; 3]);
}

/// HPK archive with one entry encrypted by the title's constant key.
fn hpk_archive(title: &[u8; 4], key: u8, name: &str, plain: &[u8]) -> Vec<u8> {
    let mut payload = plain.to_vec();
    xor::apply_constant(&mut payload, key, 0);

    let mut out = b"HPAK".to_vec();
    out.extend_from_slice(&1u32.to_le_bytes());
    let index_offset = 16 + payload.len() as u32;
    out.extend_from_slice(&index_offset.to_le_bytes());
    out.extend_from_slice(title);
    out.extend_from_slice(&payload);

    let mut record = [0u8; 48];
    record[..name.len()].copy_from_slice(name.as_bytes());
    record[32..36].copy_from_slice(&16u32.to_le_bytes());
    record[36..40].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    record[40..44].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    record[44..48].copy_from_slice(&0x40u32.to_le_bytes());
    out.extend_from_slice(&record);
    out
}

#[test]
fn hpk_key_arrives_with_a_scheme_database() {
    let catalog = catalog_builder().build();
    let bytes = hpk_archive(b"RKTN", 0x5A, "script.txt", b"scene 1");
    let arc = catalog
        .open_archive(ArcView::from_bytes(bytes, "game.hpk"), "game.hpk", &[])
        .unwrap();
    let entry = arc.entries()[0].clone();

    let err = arc.open_entry(&entry).unwrap_err();
    assert!(matches!(err, Error::UnknownEncryptionScheme(ref title) if title == "RKTN"));

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("schemes.dat");
    SchemeDatabase::new(3)
        .with_scheme("HPK", json!({ "titles": { "RKTN": 0x5A } }))
        .save(&db_path)
        .unwrap();
    let db = SchemeDatabase::from_file(&db_path).unwrap();
    assert!(catalog.load_schemes(&db).unwrap());
    assert_eq!(catalog.scheme_version(), 3);
    assert!(!catalog.load_schemes(&db).unwrap());

    let mut data = Vec::new();
    arc.open_entry(&entry).unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, b"scene 1");
}
