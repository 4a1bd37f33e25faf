//! Browsing configuration
//!
//! [`BrowseConfig`] collects the knobs a front end may want to persist:
//! text encoding for legacy names, view and stream sizing, how extraction
//! treats existing files, and where the scheme database lives. Every field
//! has a default, so a partial JSON file is enough.

use crate::error::Result;
use crate::view::{DEFAULT_STREAM_CHUNK, PAGE_SIZE};
use encoding_rs::{Encoding, SHIFT_JIS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// What extraction does when the destination file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Leave the existing file and move on
    Skip,
    /// Stop with an I/O error
    Fail,
}

/// User-level configuration for views, streams and extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseConfig {
    /// Encoding label for names stored in legacy code pages
    pub encoding: String,
    /// Minimum window mapped by a view frame
    pub page_size: u64,
    /// Read-ahead used by entry streams
    pub stream_buffer_size: usize,
    /// Treatment of existing files during extraction
    pub overwrite: OverwritePolicy,
    /// Scheme database loaded at startup
    pub scheme_database: Option<PathBuf>,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            encoding: "shift_jis".to_string(),
            page_size: PAGE_SIZE,
            stream_buffer_size: DEFAULT_STREAM_CHUNK as usize,
            overwrite: OverwritePolicy::default(),
            scheme_database: None,
        }
    }
}

impl BrowseConfig {
    /// Load a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Json` if it
    /// is not valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the name encoding label.
    #[must_use]
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set the minimum frame window.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the entry stream read-ahead.
    #[must_use]
    pub const fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    /// Set the extraction overwrite policy.
    #[must_use]
    pub const fn with_overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Set the scheme database path.
    #[must_use]
    pub fn with_scheme_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.scheme_database = Some(path.into());
        self
    }

    /// Resolve [`BrowseConfig::encoding`], falling back to Shift-JIS.
    pub fn encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.encoding.as_bytes()).unwrap_or_else(|| {
            warn!("Unknown encoding label {:?}, using Shift-JIS", self.encoding);
            SHIFT_JIS
        })
    }
}
