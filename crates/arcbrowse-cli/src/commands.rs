//! Command implementations

use crate::Location;
use anyhow::{Context, Result, bail};
use arcbrowse_core::archive::ArchiveFormat;
use arcbrowse_core::{
    ArcView, BinaryStream, BrowseConfig, CancelFlag, Error, ExtractAction, Extractor,
    FileSystemStack, FormatCatalog, OverwritePolicy, PackSource, ReadSeek,
};
use arcbrowse_formats::LibFormat;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Catalog and configuration shared by every command
pub struct Session {
    catalog: Arc<FormatCatalog>,
    config: BrowseConfig,
}

impl Session {
    pub fn new(catalog: Arc<FormatCatalog>, config: BrowseConfig) -> Self {
        Self { catalog, config }
    }

    /// Stack with `location` opened, innermost archive on top.
    fn open(&self, location: &Location) -> Result<FileSystemStack> {
        let archive = location
            .archive
            .canonicalize()
            .with_context(|| format!("cannot find {}", location.archive.display()))?;
        let (Some(root), Some(file_name)) = (archive.parent(), archive.file_name()) else {
            bail!("{} is not a file", archive.display());
        };

        let mut stack = FileSystemStack::new(Arc::clone(&self.catalog), root)?;
        let entry = stack.top().find_file(&file_name.to_string_lossy())?;
        stack
            .ch_dir(&entry)
            .with_context(|| format!("opening {}", archive.display()))?;

        for name in &location.inside {
            let entry = stack
                .top()
                .find_file(name)
                .with_context(|| format!("{name} not found in {}", stack.paths().join(" > ")))?;
            stack
                .ch_dir(&entry)
                .with_context(|| format!("opening {name}"))?;
        }
        debug!("Opened {}", stack.paths().join(" > "));
        Ok(stack)
    }

    pub fn list(&self, location: &Location, recursive: bool, json: bool) -> Result<()> {
        let stack = self.open(location)?;
        let entries = if recursive {
            let mut entries = stack.top().get_files_recursive()?;
            self.catalog.assign_kinds(&mut entries);
            entries
        } else {
            stack.get_files()?
        };

        let mut out = io::stdout().lock();
        if json {
            serde_json::to_writer_pretty(&mut out, &entries)?;
            writeln!(out)?;
            return Ok(());
        }
        for entry in &entries {
            let kind = if entry.kind().is_empty() { "-" } else { entry.kind() };
            let unpacked = entry
                .packed()
                .filter(|p| p.is_packed)
                .map_or_else(String::new, |p| format!("({})", p.unpacked_size));
            writeln!(out, "{kind:<9} {:>10} {unpacked:>12} {}", entry.size(), entry.name())?;
        }
        Ok(())
    }

    pub fn identify(&self, files: &[PathBuf]) -> Result<()> {
        let mut out = io::stdout().lock();
        for path in files {
            let name = path.display().to_string();
            let view = ArcView::open(path)
                .with_context(|| format!("opening {name}"))?
                .with_page_size(self.config.page_size);
            match self.catalog.open_archive(view, &name, &[]) {
                Ok(arc) => {
                    writeln!(
                        out,
                        "{name}: {} archive, {} entries",
                        arc.format().tag(),
                        arc.entries().len()
                    )?;
                    continue;
                }
                Err(Error::UnknownFormat(_)) => {}
                Err(e) => warn!("{name}: {e}"),
            }

            let reader: Box<dyn ReadSeek> = Box::new(File::open(path)?);
            let mut stream =
                BinaryStream::with_capacity(self.config.stream_buffer_size, reader, name.as_str())?;
            match self.catalog.identify_image(&mut stream, &[])? {
                Some((format, meta)) => writeln!(
                    out,
                    "{name}: {} image, {}x{} {}bpp",
                    format.tag(),
                    meta.width,
                    meta.height,
                    meta.bpp
                )?,
                None => writeln!(out, "{name}: unknown")?,
            }
        }
        Ok(())
    }

    pub fn extract(
        &self,
        location: &Location,
        output: &Path,
        overwrite: Option<OverwritePolicy>,
        only: &[String],
    ) -> Result<()> {
        let stack = self.open(location)?;
        let Some(arc) = stack.top().archive() else {
            bail!("{} is not an archive", location.archive.display());
        };

        let summary = Extractor::new(arc, output)
            .with_overwrite(overwrite.unwrap_or(self.config.overwrite))
            .with_cancel_flag(CancelFlag::new())
            .run(|entry| {
                if only.is_empty() || only.iter().any(|n| n.eq_ignore_ascii_case(entry.name())) {
                    ExtractAction::Continue
                } else {
                    ExtractAction::Skip
                }
            })?;
        println!(
            "{} extracted, {} skipped, {} bytes",
            summary.extracted, summary.skipped, summary.bytes
        );
        Ok(())
    }

    pub fn cat(&self, location: &Location, name: &str) -> Result<()> {
        let stack = self.open(location)?;
        let entry = stack.top().find_file(name)?;
        let mut reader = stack.top().open_file(&entry)?;
        let mut out = io::stdout().lock();
        io::copy(&mut reader, &mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn decode(&self, location: &Location, name: &str, output: &Path) -> Result<()> {
        let stack = self.open(location)?;
        let entry = stack.top().find_file(name)?;
        let image = self.catalog.decode_image(stack.top(), &entry)?;
        image
            .image
            .save(output)
            .with_context(|| format!("saving {}", output.display()))?;
        println!(
            "{}: {}x{} at ({}, {})",
            entry.name(),
            image.width(),
            image.height(),
            image.offset_x,
            image.offset_y
        );
        Ok(())
    }

    pub fn pack(&self, output: &Path, files: &[PathBuf]) -> Result<()> {
        let sources = files
            .iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .with_context(|| format!("{} has no file name", path.display()))?;
                Ok(PackSource::new(name.to_string_lossy(), path))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut writer = BufWriter::new(File::create(output)?);
        LibFormat::new().create(&mut writer, &sources, &CancelFlag::new())?;
        writer.flush()?;
        println!("{}: {} files", output.display(), sources.len());
        Ok(())
    }
}
