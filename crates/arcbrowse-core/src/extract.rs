//! Extraction of archive entries to disk

use crate::archive::ArcFile;
use crate::config::OverwritePolicy;
use crate::entry::Entry;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared with a worker
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Fresh, unraised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop after the current entry.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Error::Canceled)` once the flag is raised.
    ///
    /// # Errors
    ///
    /// Returns `Error::Canceled` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Per-entry decision returned by an extraction callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractAction {
    /// Extract this entry
    Continue,
    /// Leave this entry out
    Skip,
    /// Stop the whole extraction
    Abort,
}

/// Counts reported after an extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Entries written
    pub extracted: usize,
    /// Entries skipped by the callback or the overwrite policy
    pub skipped: usize,
    /// Bytes written
    pub bytes: u64,
}

/// Map an entry name onto a path below `destination`.
///
/// Both `/` and `\` separate components. Absolute names, drive prefixes and
/// `..` components are refused.
///
/// # Errors
///
/// Returns `Error::InvalidFileName` if the name would escape `destination`
/// or has no usable component.
pub fn entry_path(destination: &Path, name: &str) -> Result<PathBuf> {
    let invalid = || Error::InvalidFileName(name.to_string());
    if name.starts_with(['/', '\\']) || name.as_bytes().get(1) == Some(&b':') {
        return Err(invalid());
    }

    let mut path = destination.to_path_buf();
    let mut depth = 0usize;
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(invalid()),
            _ => {
                let mut components = Path::new(part).components();
                if !matches!(components.next(), Some(Component::Normal(_)))
                    || components.next().is_some()
                {
                    return Err(invalid());
                }
                path.push(part);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(invalid());
    }
    Ok(path)
}

fn write_file(input: &mut impl Read, path: &Path) -> Result<u64> {
    let mut output = BufWriter::new(File::create(path)?);
    let written = io::copy(input, &mut output)?;
    output.flush()?;
    Ok(written)
}

/// Remove a partially written file.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove partial {}: {}", path.display(), e);
        }
    }
}

/// Writes entries of one archive below a destination directory
pub struct Extractor<'a> {
    arc: &'a ArcFile,
    destination: PathBuf,
    overwrite: OverwritePolicy,
    cancel: CancelFlag,
}

impl<'a> Extractor<'a> {
    /// Extractor writing below `destination`, overwriting existing files.
    pub fn new(arc: &'a ArcFile, destination: impl Into<PathBuf>) -> Self {
        Self {
            arc,
            destination: destination.into(),
            overwrite: OverwritePolicy::default(),
            cancel: CancelFlag::new(),
        }
    }

    /// Set the overwrite policy.
    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Share a cancellation flag with the caller.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Write one entry; `None` when the overwrite policy skipped it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFileName` for unsafe names, an I/O error when
    /// the target exists under [`OverwritePolicy::Fail`], and propagates
    /// decoding failures.
    pub fn extract_entry(&self, entry: &Entry) -> Result<Option<PathBuf>> {
        let path = entry_path(&self.destination, entry.name())?;
        if path.exists() {
            match self.overwrite {
                OverwritePolicy::Overwrite => {}
                OverwritePolicy::Skip => {
                    debug!("Keeping existing {}", path.display());
                    return Ok(None);
                }
                OverwritePolicy::Fail => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} already exists", path.display()),
                    )
                    .into());
                }
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut input = self.arc.open_entry(entry)?;
        let written = write_file(&mut input, &path).inspect_err(|_| discard(&path))?;
        debug!("Extracted {} ({} bytes)", entry.name(), written);
        Ok(Some(path))
    }

    /// Extract every data entry in ascending offset order.
    ///
    /// The cancellation flag is checked between entries.
    ///
    /// # Errors
    ///
    /// Returns `Error::Canceled` when cancellation is requested or the
    /// callback aborts, and propagates the first extraction failure.
    pub fn run<F>(&self, mut callback: F) -> Result<ExtractSummary>
    where
        F: FnMut(&Entry) -> ExtractAction,
    {
        let mut order: Vec<&Entry> = self
            .arc
            .entries()
            .iter()
            .filter(|e| !e.is_virtual())
            .collect();
        order.sort_by_key(|e| e.offset());

        let mut summary = ExtractSummary::default();
        for entry in order {
            self.cancel.check()?;
            match callback(entry) {
                ExtractAction::Continue => {}
                ExtractAction::Skip => {
                    summary.skipped += 1;
                    continue;
                }
                ExtractAction::Abort => {
                    warn!("Extraction from {} aborted", self.arc.name());
                    return Err(Error::Canceled);
                }
            }
            match self.extract_entry(entry)? {
                Some(_) => {
                    summary.extracted += 1;
                    summary.bytes += u64::from(entry.unpacked_size());
                }
                None => summary.skipped += 1,
            }
        }

        info!(
            "Extracted {} entries from {} ({} skipped)",
            summary.extracted,
            self.arc.name(),
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::archive::tests::open_toy;

    #[test]
    fn rejects_escaping_names() {
        let dest = Path::new("/tmp/out");
        for bad in ["../x", "a/../../x", "/etc/passwd", "\\win", "C:\\x", "", "./"] {
            assert!(
                matches!(entry_path(dest, bad), Err(Error::InvalidFileName(_))),
                "{bad} accepted"
            );
        }
        assert_eq!(
            entry_path(dest, "bg\\01.bmp").unwrap(),
            dest.join("bg").join("01.bmp")
        );
        assert_eq!(entry_path(dest, "./a//b").unwrap(), dest.join("a").join("b"));
    }

    #[test]
    fn extracts_in_offset_order_with_directories() {
        let arc = open_toy(&[("d/a.txt", b"aaa"), ("b.txt", b"bb")], false);
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let summary = arc
            .extract_files(
                dir.path(),
                |e| {
                    seen.push(e.name().to_string());
                    ExtractAction::Continue
                },
                &CancelFlag::new(),
            )
            .unwrap();
        assert_eq!(seen, ["d/a.txt", "b.txt"]);
        assert_eq!(summary.extracted, 2);
        assert_eq!(fs::read(dir.path().join("d").join("a.txt")).unwrap(), b"aaa");
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"bb");
    }

    #[test]
    fn skip_and_abort_are_honored() {
        let arc = open_toy(&[("a", b"1"), ("b", b"2"), ("c", b"3")], false);
        let dir = tempfile::tempdir().unwrap();
        let summary = arc
            .extract_files(
                dir.path(),
                |e| {
                    if e.name() == "b" {
                        ExtractAction::Skip
                    } else {
                        ExtractAction::Continue
                    }
                },
                &CancelFlag::new(),
            )
            .unwrap();
        assert_eq!((summary.extracted, summary.skipped), (2, 1));

        let err = arc
            .extract_files(dir.path(), |_| ExtractAction::Abort, &CancelFlag::new())
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn cancellation_is_checked_between_entries() {
        let arc = open_toy(&[("a", b"1"), ("b", b"2")], false);
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let mut calls = 0;
        let err = arc
            .extract_files(
                dir.path(),
                |_| {
                    calls += 1;
                    flag.cancel();
                    ExtractAction::Continue
                },
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(calls, 1);
        assert!(dir.path().join("a").exists());
        assert!(!dir.path().join("b").exists());
    }

    #[test]
    fn overwrite_policies() {
        let arc = open_toy(&[("a", b"new")], false);
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"old").unwrap();
        let entry = &arc.entries()[0];

        let skip = Extractor::new(&arc, dir.path()).with_overwrite(OverwritePolicy::Skip);
        assert_eq!(skip.extract_entry(entry).unwrap(), None);
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"old");

        let fail = Extractor::new(&arc, dir.path()).with_overwrite(OverwritePolicy::Fail);
        assert!(matches!(fail.extract_entry(entry), Err(Error::Io(_))));

        arc.extract(entry, dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"new");
    }

    #[test]
    fn failed_copy_leaves_no_partial_file() {
        let arc = open_toy(&[("ok", b"fine"), ("broken.bin", b"unused")], false);
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(&arc, dir.path());

        let broken = &arc.entries()[1];
        assert!(matches!(extractor.extract_entry(broken), Err(Error::Io(_))));
        assert!(!dir.path().join("broken.bin").exists());

        let ok = &arc.entries()[0];
        extractor.extract_entry(ok).unwrap();
        assert_eq!(fs::read(dir.path().join("ok")).unwrap(), b"fine");
    }
}
