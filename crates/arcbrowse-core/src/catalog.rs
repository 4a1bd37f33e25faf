//! Registry of archive and image formats
//!
//! The catalog is built once with [`FormatCatalog::builder`] and shared as
//! `Arc<FormatCatalog>`. Its signature and extension indices never change
//! after [`CatalogBuilder::build`]; scheme data loaded later is pushed into
//! the formats themselves through [`FormatCatalog::load_schemes`].
//!
//! Candidate ordering for a probe:
//!
//! 1. formats registered for the file's signature, with formats named in
//!    the containing archive's hint first and formats claiming the file's
//!    extension next (stable within each group);
//! 2. when the signature is non-zero, formats registered for signature 0
//!    that were not already tried, ordered the same way.

use crate::archive::{ArcFile, ArchiveFormat, Resource};
use crate::entry::{Entry, extension_of};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::image::{ImageData, ImageFormat, ImageMetaData, ImageStream};
use crate::scheme::SchemeDatabase;
use crate::stream::BinaryStream;
use crate::view::ArcView;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Registers formats before the catalog is frozen
#[derive(Default)]
pub struct CatalogBuilder {
    archives: Vec<Arc<dyn ArchiveFormat>>,
    images: Vec<Arc<dyn ImageFormat>>,
}

impl CatalogBuilder {
    /// Register an archive format.
    #[must_use]
    pub fn archive(mut self, format: impl ArchiveFormat + 'static) -> Self {
        self.archives.push(Arc::new(format));
        self
    }

    /// Register an image format.
    #[must_use]
    pub fn image(mut self, format: impl ImageFormat + 'static) -> Self {
        self.images.push(Arc::new(format));
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<FormatCatalog> {
        let archive_signatures = index_signatures(&self.archives);
        let image_signatures = index_signatures(&self.images);

        let mut kinds = HashMap::new();
        for format in &self.archives {
            register_kind(&mut kinds, format.as_ref());
        }
        for format in &self.images {
            register_kind(&mut kinds, format.as_ref());
        }

        info!(
            "Format catalog ready: {} archive formats, {} image formats",
            self.archives.len(),
            self.images.len()
        );
        Arc::new(FormatCatalog {
            archives: self.archives,
            images: self.images,
            archive_signatures,
            image_signatures,
            kinds,
            scheme_version: Mutex::new(0),
        })
    }
}

fn index_signatures<T: ?Sized + Resource>(formats: &[Arc<T>]) -> HashMap<u32, Vec<usize>> {
    let mut map: HashMap<u32, Vec<usize>> = HashMap::new();
    for (index, format) in formats.iter().enumerate() {
        for signature in format.signatures() {
            let slot = map.entry(signature).or_default();
            if !slot.contains(&index) {
                slot.push(index);
            }
        }
    }
    map
}

fn register_kind<T: ?Sized + Resource>(kinds: &mut HashMap<&'static str, &'static str>, format: &T) {
    for ext in format.extensions() {
        kinds.entry(*ext).or_insert_with(|| format.kind());
    }
}

/// Immutable registry of formats, shared across threads
pub struct FormatCatalog {
    archives: Vec<Arc<dyn ArchiveFormat>>,
    images: Vec<Arc<dyn ImageFormat>>,
    archive_signatures: HashMap<u32, Vec<usize>>,
    image_signatures: HashMap<u32, Vec<usize>>,
    kinds: HashMap<&'static str, &'static str>,
    scheme_version: Mutex<i32>,
}

impl FormatCatalog {
    /// Start registering formats.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Registered archive formats in registration order
    pub fn archive_formats(&self) -> &[Arc<dyn ArchiveFormat>] {
        &self.archives
    }

    /// Registered image formats in registration order
    pub fn image_formats(&self) -> &[Arc<dyn ImageFormat>] {
        &self.images
    }

    /// Archive format with the given tag
    pub fn archive_format(&self, tag: &str) -> Option<&Arc<dyn ArchiveFormat>> {
        self.archives.iter().find(|f| f.tag().eq_ignore_ascii_case(tag))
    }

    /// Archive candidates for a file, in probing order.
    pub fn find_archive_formats(
        &self,
        name: &str,
        signature: u32,
        hint: &[&str],
    ) -> Vec<Arc<dyn ArchiveFormat>> {
        find_formats(&self.archives, &self.archive_signatures, name, signature, hint)
    }

    /// Image candidates for a file, in probing order.
    pub fn find_image_formats(
        &self,
        name: &str,
        signature: u32,
        hint: &[&str],
    ) -> Vec<Arc<dyn ImageFormat>> {
        find_formats(&self.images, &self.image_signatures, name, signature, hint)
    }

    /// Open `view` with the first archive format that accepts it.
    ///
    /// Candidate failures are logged and the next candidate is tried.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownFormat` when no candidate accepts the file.
    pub fn open_archive(&self, view: ArcView, name: &str, hint: &[&str]) -> Result<ArcFile> {
        let signature = view.signature();
        for format in self.find_archive_formats(name, signature, hint) {
            trace!("Probing {} as {}", name, format.tag());
            match ArcFile::try_open(Arc::clone(&format), view.clone()) {
                Ok(Some(arc)) => return Ok(arc),
                Ok(None) => {}
                Err(e) => warn!("{} failed to open {}: {}", format.tag(), name, e),
            }
        }
        debug!("No archive format accepted {} ({:#010x})", name, signature);
        Err(Error::UnknownFormat(name.to_string()))
    }

    /// Find the image format that recognizes `stream`.
    ///
    /// The stream is rewound before each candidate.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the stream cannot be rewound.
    pub fn identify_image(
        &self,
        stream: &mut ImageStream<'_>,
        hint: &[&str],
    ) -> Result<Option<(Arc<dyn ImageFormat>, ImageMetaData)>> {
        let signature = stream.signature()?;
        let name = stream.name().to_string();
        for format in self.find_image_formats(&name, signature, hint) {
            stream.set_position(0)?;
            match format.read_metadata(stream) {
                Ok(Some(mut meta)) => {
                    meta.file_name.get_or_insert_with(|| name.clone());
                    debug!(
                        "{} is {} {}x{} {}bpp",
                        name,
                        format.tag(),
                        meta.width,
                        meta.height,
                        meta.bpp
                    );
                    return Ok(Some((format, meta)));
                }
                Ok(None) => {}
                Err(e) => trace!("{} rejected {}: {}", format.tag(), name, e),
            }
        }
        Ok(None)
    }

    /// Decode the image stored in `entry` of `source`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownFormat` if no image format recognizes the
    /// entry, and propagates decoding failures.
    pub fn decode_image(&self, source: &dyn FileSystem, entry: &Entry) -> Result<ImageData> {
        let reader = source.open_seekable_file(entry)?;
        let mut stream: ImageStream<'_> = BinaryStream::new(reader, entry.name())?;
        let Some((format, meta)) = self.identify_image(&mut stream, source.contained_formats())?
        else {
            return Err(Error::UnknownFormat(entry.name().to_string()));
        };
        stream.set_position(0)?;
        format.read(&mut stream, &meta, source)
    }

    /// Type tag for a file name based on registered extensions.
    pub fn entry_kind_from_name(&self, name: &str) -> &'static str {
        extension_of(name)
            .and_then(|ext| self.kinds.get(ext.as_str()).copied())
            .unwrap_or("")
    }

    /// Fill in empty type tags of `entries` from their names.
    pub fn assign_kinds(&self, entries: &mut [Entry]) {
        for entry in entries.iter_mut().filter(|e| e.kind().is_empty()) {
            let kind = self.entry_kind_from_name(entry.name());
            if !kind.is_empty() {
                entry.set_kind(kind);
            }
        }
    }

    /// Version of the last scheme database applied
    pub fn scheme_version(&self) -> i32 {
        *self.scheme_version.lock()
    }

    /// Apply a scheme database newer than the one currently loaded.
    ///
    /// Returns `false` without touching any format when `db` is not newer.
    ///
    /// # Errors
    ///
    /// Returns the first format's scheme error; formats updated before it
    /// keep their new data and the version is left unchanged.
    pub fn load_schemes(&self, db: &SchemeDatabase) -> Result<bool> {
        let mut version = self.scheme_version.lock();
        if db.version() <= *version {
            debug!(
                "Scheme database v{} is not newer than v{}",
                db.version(),
                *version
            );
            return Ok(false);
        }

        let archives = self.archives.iter().map(|f| f.as_ref() as &dyn Resource);
        let images = self.images.iter().map(|f| f.as_ref() as &dyn Resource);
        for format in archives.chain(images) {
            if let Some(scheme) = db.get(format.tag()) {
                format.update_scheme(scheme)?;
                debug!("Updated {} scheme", format.tag());
            }
        }

        *version = db.version();
        info!("Loaded scheme database v{}", db.version());
        Ok(true)
    }
}

fn find_formats<T: ?Sized + Resource>(
    formats: &[Arc<T>],
    by_signature: &HashMap<u32, Vec<usize>>,
    name: &str,
    signature: u32,
    hint: &[&str],
) -> Vec<Arc<T>> {
    let ext = extension_of(name);
    let rank = |index: &usize| {
        let format = &formats[*index];
        let hinted = hint.iter().any(|tag| tag.eq_ignore_ascii_case(format.tag()));
        let by_ext = ext
            .as_deref()
            .is_some_and(|ext| format.extensions().contains(&ext));
        (!hinted, !by_ext)
    };

    let mut ordered: Vec<usize> = by_signature.get(&signature).cloned().unwrap_or_default();
    ordered.sort_by_key(rank);

    if signature != 0 {
        let mut fallback: Vec<usize> = by_signature
            .get(&0)
            .into_iter()
            .flatten()
            .copied()
            .filter(|index| !ordered.contains(index))
            .collect();
        fallback.sort_by_key(rank);
        ordered.extend(fallback);
    }

    ordered.into_iter().map(|i| Arc::clone(&formats[i])).collect()
}
