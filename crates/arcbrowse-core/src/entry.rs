//! Archive directory records

use serde::Serialize;

/// Entry counts at or above this value are treated as a misdetected index
pub const MAX_ENTRY_COUNT: i64 = 0x40000;

/// Whether an entry count read from an index is plausible.
pub const fn is_sane_count(count: i64) -> bool {
    count > 0 && count < MAX_ENTRY_COUNT
}

/// Well-known values of [`Entry::kind`]
pub mod kind {
    /// Synthesized or on-disk directory
    pub const DIRECTORY: &str = "directory";
    /// Nested container
    pub const ARCHIVE: &str = "archive";
    /// Bitmap picture
    pub const IMAGE: &str = "image";
    /// Sound or music
    pub const AUDIO: &str = "audio";
    /// Engine script
    pub const SCRIPT: &str = "script";
}

/// Compression details of a packed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackedInfo {
    /// Size after decoding
    pub unpacked_size: u32,
    /// Whether the stored bytes need decoding at all
    pub is_packed: bool,
}

/// One resource inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    name: String,
    kind: String,
    offset: i64,
    size: u32,
    packed: Option<PackedInfo>,
    flags: u32,
}

impl Entry {
    /// File entry of `size` bytes at `offset`.
    pub fn new(name: impl Into<String>, offset: i64, size: u32) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
            offset,
            size,
            packed: None,
            flags: 0,
        }
    }

    /// Virtual directory entry with no data.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind::DIRECTORY.to_string(),
            offset: -1,
            size: 0,
            packed: None,
            flags: 0,
        }
    }

    /// Set the type tag.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Attach compression details.
    #[must_use]
    pub const fn with_packed(mut self, unpacked_size: u32, is_packed: bool) -> Self {
        self.packed = Some(PackedInfo {
            unpacked_size,
            is_packed,
        });
        self
    }

    /// Attach format-specific index flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Full name inside the container
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag, empty when unknown
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Override the type tag (the only mutable field once an index is read).
    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    /// Stored offset, `-1` for virtual entries
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    /// Stored size in bytes
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Compression details, if the format records any
    pub const fn packed(&self) -> Option<PackedInfo> {
        self.packed
    }

    /// Format-specific flags from the index
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the stored bytes must be decoded
    pub fn is_packed(&self) -> bool {
        self.packed.is_some_and(|p| p.is_packed)
    }

    /// Size after decoding; equals [`Entry::size`] for stored entries.
    pub fn unpacked_size(&self) -> u32 {
        self.packed.map_or(self.size, |p| p.unpacked_size)
    }

    /// Whether this entry has no backing data
    pub const fn is_virtual(&self) -> bool {
        self.offset < 0
    }

    /// Whether this entry stands for a directory
    pub fn is_directory(&self) -> bool {
        self.kind == kind::DIRECTORY
    }

    /// Lowercase extension of the name, without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    /// Whether the entry lies entirely within `max_offset` bytes.
    pub const fn check_placement(&self, max_offset: u64) -> bool {
        if self.offset < 0 {
            return false;
        }
        let offset = self.offset as u64;
        let size = self.size as u64;
        offset < max_offset && size <= max_offset && offset <= max_offset - size
    }
}

/// Lowercase extension of the last path component of `name`.
pub fn extension_of(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() && !file[1..].contains('.') || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sane_count_bounds() {
        assert!(!is_sane_count(0));
        assert!(is_sane_count(1));
        assert!(is_sane_count(0x3FFFF));
        assert!(!is_sane_count(0x40000));
        assert!(!is_sane_count(-5));
    }

    #[test]
    fn placement_edges() {
        assert!(Entry::new("a", 0, 16).check_placement(16));
        assert!(!Entry::new("a", 1, 16).check_placement(16));
        assert!(!Entry::new("a", 16, 0).check_placement(16));
        assert!(!Entry::new("a", -1, 0).check_placement(16));
        assert!(!Entry::new("a", 0, 17).check_placement(16));
    }

    #[test]
    fn packed_info_defaults_to_stored_size() {
        let stored = Entry::new("x.bin", 0, 10);
        assert!(!stored.is_packed());
        assert_eq!(stored.unpacked_size(), 10);
        let packed = Entry::new("x.bin", 0, 10).with_packed(40, true);
        assert!(packed.is_packed());
        assert_eq!(packed.unpacked_size(), 40);
    }

    #[test]
    fn directories_are_virtual() {
        let dir = Entry::directory("bg");
        assert!(dir.is_directory());
        assert!(dir.is_virtual());
        assert!(!dir.check_placement(u64::MAX));
    }

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(extension_of("data\\BG01.BMP").as_deref(), Some("bmp"));
        assert_eq!(extension_of("dir.d/file").as_deref(), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    proptest! {
        #[test]
        fn placement_matches_bounds(offset in -10i64..5000, size in 0u32..5000, max in 0u64..5000) {
            let entry = Entry::new("p", offset, size);
            let expected = offset >= 0
                && (offset as u64) < max
                && u64::from(size) <= max
                && (offset as u64) <= max - u64::from(size);
            prop_assert_eq!(entry.check_placement(max), expected);
            if offset >= 0 && offset as u64 + u64::from(size) > max {
                prop_assert!(!entry.check_placement(max));
            }
        }
    }
}
