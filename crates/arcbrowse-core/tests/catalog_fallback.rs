#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Candidate ordering and fallthrough when several formats share a
//! signature

use arcbrowse_core::archive::{ArcIndex, ArchiveFormat, Resource};
use arcbrowse_core::{ArcView, Entry, Error, FormatCatalog, Result};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const SIGNATURE: u32 = 0x5F42_494C;

#[derive(Clone, Copy)]
enum Outcome {
    Reject,
    Corrupt,
    Accept,
}

struct Candidate {
    tag: &'static str,
    signature: u32,
    extensions: &'static [&'static str],
    outcome: Outcome,
    probes: Arc<AtomicUsize>,
}

impl Resource for Candidate {
    fn tag(&self) -> &'static str {
        self.tag
    }
    fn description(&self) -> &'static str {
        "candidate"
    }
    fn signature(&self) -> u32 {
        self.signature
    }
    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }
    fn kind(&self) -> &'static str {
        "archive"
    }
}

impl ArchiveFormat for Candidate {
    fn try_open(&self, _view: &ArcView) -> Result<Option<ArcIndex>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Reject => Ok(None),
            Outcome::Corrupt => Err(Error::invalid(self.tag, "index runs past the end")),
            Outcome::Accept => Ok(Some(ArcIndex::new(vec![Entry::new(self.tag, 0, 4)]))),
        }
    }
}

fn candidate(
    tag: &'static str,
    signature: u32,
    extensions: &'static [&'static str],
    outcome: Outcome,
) -> (Candidate, Arc<AtomicUsize>) {
    let probes = Arc::new(AtomicUsize::new(0));
    let format = Candidate {
        tag,
        signature,
        extensions,
        outcome,
        probes: Arc::clone(&probes),
    };
    (format, probes)
}

fn lib_view() -> ArcView {
    let mut bytes = b"LIB_PACKDATA0000".to_vec();
    bytes.resize(64, 0);
    ArcView::from_bytes(bytes, "data.lib")
}

#[test]
fn second_format_result_is_used_after_first_rejects() {
    let (first, first_probes) = candidate("FIRST", SIGNATURE, &["lib"], Outcome::Reject);
    let (second, second_probes) = candidate("SECOND", SIGNATURE, &["dat"], Outcome::Accept);
    let catalog = FormatCatalog::builder().archive(second).archive(first).build();

    let order: Vec<_> = catalog
        .find_archive_formats("data.lib", SIGNATURE, &[])
        .iter()
        .map(|f| f.tag())
        .collect();
    assert_eq!(order, ["FIRST", "SECOND"]);

    let arc = catalog.open_archive(lib_view(), "data.lib", &[]).unwrap();
    assert_eq!(arc.format().tag(), "SECOND");
    assert_eq!(first_probes.load(Ordering::SeqCst), 1);
    assert_eq!(second_probes.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_candidates_do_not_stop_the_search() {
    let (broken, _) = candidate("BROKEN", SIGNATURE, &["lib"], Outcome::Corrupt);
    let (generic, generic_probes) = candidate("GENERIC", 0, &[], Outcome::Accept);
    let catalog = FormatCatalog::builder().archive(generic).archive(broken).build();

    let arc = catalog.open_archive(lib_view(), "data.lib", &[]).unwrap();
    assert_eq!(arc.format().tag(), "GENERIC");
    assert_eq!(generic_probes.load(Ordering::SeqCst), 1);
}

#[test]
fn each_format_is_tried_once() {
    let (multi, probes) = candidate("MULTI", 0, &["lib"], Outcome::Reject);
    let catalog = FormatCatalog::builder().archive(multi).build();
    let err = catalog.open_archive(lib_view(), "data.lib", &[]).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat(name) if name == "data.lib"));
    assert_eq!(probes.load(Ordering::SeqCst), 1);
}

#[test]
fn hint_outranks_extension() {
    let (by_ext, _) = candidate("EXT", SIGNATURE, &["lib"], Outcome::Accept);
    let (hinted, _) = candidate("HINTED", SIGNATURE, &[], Outcome::Accept);
    let catalog = FormatCatalog::builder().archive(by_ext).archive(hinted).build();
    let arc = catalog
        .open_archive(lib_view(), "data.lib", &["HINTED"])
        .unwrap();
    assert_eq!(arc.format().tag(), "HINTED");
}
