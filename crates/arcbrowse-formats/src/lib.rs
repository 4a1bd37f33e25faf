//! Archive and image formats for arcbrowse
//!
//! Each module implements one format against the contracts in
//! `arcbrowse-core`:
//!
//! | Tag    | Kind    | Module         | Extensions |
//! |--------|---------|----------------|------------|
//! | `LIB`  | archive | [`packdata`]   | lib, dat   |
//! | `HPK`  | archive | [`hpk`]        | hpk, pak   |
//! | `TXPK` | archive | [`txpk`]       | txp, arc   |
//! | `BMP`  | image   | [`bmp`]        | bmp        |
//! | `PNG`  | image   | [`png`]        | png        |
//! | `GRP`  | image   | [`grp`]        | grp        |
//!
//! [`default_catalog`] registers all of them once per process.
//!
//! # Example
//!
//! ```no_run
//! use arcbrowse_core::ArcView;
//!
//! # fn main() -> arcbrowse_core::Result<()> {
//! let catalog = arcbrowse_formats::default_catalog();
//! let arc = catalog.open_archive(ArcView::open("data.lib")?, "data.lib", &[])?;
//! println!("{} entries in {} format", arc.entries().len(), arc.format().tag());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod bmp;
pub mod grp;
pub mod hpk;
pub mod packdata;
pub mod png;
pub mod txpk;

pub use bmp::BmpFormat;
pub use grp::GrpFormat;
pub use hpk::HpkFormat;
pub use packdata::LibFormat;
pub use png::PngFormat;
pub use txpk::TxpkFormat;

use arcbrowse_core::{CatalogBuilder, FormatCatalog};
use std::sync::{Arc, OnceLock};

/// Builder preloaded with every format in this crate.
///
/// Use this instead of [`default_catalog`] when the catalog's scheme state
/// must not be shared, or to add formats of your own.
pub fn catalog_builder() -> CatalogBuilder {
    FormatCatalog::builder()
        .archive(LibFormat::new())
        .archive(HpkFormat::new())
        .archive(TxpkFormat::new())
        .image(PngFormat::new())
        .image(GrpFormat::new())
        .image(BmpFormat::new())
}

/// Process-wide catalog with every format in this crate.
pub fn default_catalog() -> Arc<FormatCatalog> {
    static CATALOG: OnceLock<Arc<FormatCatalog>> = OnceLock::new();
    Arc::clone(CATALOG.get_or_init(|| catalog_builder().build()))
}
