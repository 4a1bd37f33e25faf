//! Archives whose entry names form a directory tree

use super::{FileSystem, PARENT_DIR, lookup_key};
use crate::archive::ArcFile;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::stream::ReadSeek;
use crate::view::ArcView;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use tracing::debug;

/// Directory tree synthesized from slash- or backslash-separated names
///
/// The separator is taken from the first entry name that contains either
/// one. Subdirectories do not exist in the index; they are listed as
/// virtual [`Entry::directory`] records whose names are full paths.
pub struct TreeArchiveFileSystem {
    arc: ArcFile,
    delimiter: char,
    cwd: String,
    by_name: HashMap<String, usize>,
    directories: HashMap<String, String>,
}

impl TreeArchiveFileSystem {
    /// Wrap an opened archive.
    pub fn new(arc: ArcFile) -> Self {
        let delimiter = arc
            .entries()
            .iter()
            .find_map(|e| e.name().chars().find(|&c| c == '/' || c == '\\'))
            .unwrap_or('/');

        let mut by_name = HashMap::with_capacity(arc.entries().len());
        let mut directories = HashMap::new();
        for (index, entry) in arc.entries().iter().enumerate() {
            let name = normalize(entry.name(), delimiter);
            let mut end = 0;
            while let Some(pos) = name[end..].find(delimiter) {
                let dir = &name[..end + pos];
                directories
                    .entry(lookup_key(dir))
                    .or_insert_with(|| dir.to_string());
                end += pos + delimiter.len_utf8();
            }
            by_name.entry(lookup_key(&name)).or_insert(index);
        }
        debug!(
            "Tree of {} uses {:?} with {} directories",
            arc.name(),
            delimiter,
            directories.len()
        );

        Self {
            arc,
            delimiter,
            cwd: String::new(),
            by_name,
            directories,
        }
    }

    /// Separator used by entry names
    pub const fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Give back the archive.
    pub fn into_archive(self) -> ArcFile {
        self.arc
    }

    fn prefix(&self) -> String {
        if self.cwd.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.cwd, self.delimiter)
        }
    }

    fn under_prefix<'n>(name: &'n str, prefix: &str) -> Option<&'n str> {
        let head = name.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix).then(|| &name[prefix.len()..])
    }

    fn resolve(&self, path: &str) -> Option<String> {
        let path = normalize(path, self.delimiter);
        let absolute = path.starts_with(self.delimiter)
            || (!self.cwd.is_empty() && Self::under_prefix(&path, &self.prefix()).is_some());

        let mut parts: Vec<&str> = if absolute || self.cwd.is_empty() {
            Vec::new()
        } else {
            self.cwd.split(self.delimiter).collect()
        };
        for part in path.split(self.delimiter) {
            match part {
                "" | "." => {}
                PARENT_DIR => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        if parts.is_empty() {
            return Some(String::new());
        }
        let delimiter = self.delimiter.to_string();
        self.directories
            .get(&lookup_key(&parts.join(&delimiter)))
            .cloned()
    }
}

fn normalize(name: &str, delimiter: char) -> String {
    let other = if delimiter == '/' { '\\' } else { '/' };
    name.replace(other, delimiter.encode_utf8(&mut [0; 4]))
}

impl FileSystem for TreeArchiveFileSystem {
    fn current_directory(&self) -> &str {
        &self.cwd
    }

    fn set_current_directory(&mut self, path: &str) -> Result<()> {
        let target = self
            .resolve(path)
            .ok_or_else(|| Error::DirectoryNotFound(path.to_string()))?;
        debug!("Changed directory in {} to {:?}", self.arc.name(), target);
        self.cwd = target;
        Ok(())
    }

    fn get_files(&self) -> Result<Vec<Entry>> {
        let prefix = self.prefix();
        let mut seen = HashSet::new();
        let mut directories = Vec::new();
        let mut files = Vec::new();

        for entry in self.arc.entries() {
            let name = normalize(entry.name(), self.delimiter);
            let Some(rest) = Self::under_prefix(&name, &prefix) else {
                continue;
            };
            match rest.find(self.delimiter) {
                Some(pos) => {
                    let dir = &name[..prefix.len() + pos];
                    if seen.insert(lookup_key(dir)) {
                        directories.push(Entry::directory(dir));
                    }
                }
                None => files.push(entry.clone()),
            }
        }

        directories.extend(files);
        Ok(directories)
    }

    fn get_files_recursive(&self) -> Result<Vec<Entry>> {
        let prefix = self.prefix();
        Ok(self
            .arc
            .entries()
            .iter()
            .filter(|e| Self::under_prefix(&normalize(e.name(), self.delimiter), &prefix).is_some())
            .cloned()
            .collect())
    }

    fn find_file(&self, name: &str) -> Result<Entry> {
        let name = normalize(name, self.delimiter);
        let relative = self.combine_path(&self.cwd, &name);
        [relative.as_str(), name.trim_start_matches(self.delimiter)]
            .into_iter()
            .find_map(|candidate| self.by_name.get(&lookup_key(candidate)))
            .map(|&index| self.arc.entries()[index].clone())
            .ok_or_else(|| Error::FileNotFound(name.clone()))
    }

    fn open_file(&self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.arc.open_entry(entry)?))
    }

    fn open_seekable_file(&self, entry: &Entry) -> Result<Box<dyn ReadSeek + '_>> {
        self.arc.open_seekable_entry(entry)
    }

    fn open_view(&self, entry: &Entry) -> Result<ArcView> {
        self.arc.open_view(entry)
    }

    fn combine_path(&self, directory: &str, name: &str) -> String {
        if directory.is_empty() {
            name.to_string()
        } else {
            format!("{directory}{}{name}", self.delimiter)
        }
    }

    fn archive(&self) -> Option<&ArcFile> {
        Some(&self.arc)
    }
}
