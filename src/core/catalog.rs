use crate::io::naming::parse_product_name;
use crate::types::{Band, S2Error, S2Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Catalog of an extraction tree: the band files it holds plus the
/// deduplicated sets of acquisition dates and bands they cover.
///
/// Purely derived data, recomputed on every scan. The file list carries no
/// ordering guarantee; the sets are deduplicated by value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub files: Vec<PathBuf>,
    pub dates: BTreeSet<NaiveDate>,
    pub bands: BTreeSet<Band>,
}

/// Walks an extraction tree and parses granule names into a [`Catalog`],
/// the basis for an eventual time/band cube.
pub struct CatalogBuilder {
    extension: String,
}

impl CatalogBuilder {
    /// Builder scanning for the raw single-band tile extension (`jp2`)
    pub fn new() -> Self {
        Self {
            extension: "jp2".to_string(),
        }
    }

    /// Scan for a different raster extension, e.g. `tif` for a clipped tree
    pub fn with_extension(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Walk the whole tree under `root` and catalog every matching file.
    ///
    /// A file name that does not yield a valid band token and 8-digit date
    /// is a data-integrity error and aborts the scan.
    pub fn build<P: AsRef<Path>>(&self, root: P) -> S2Result<Catalog> {
        let suffix = format!(".{}", self.extension);
        let mut catalog = Catalog::default();

        for entry in WalkDir::new(root.as_ref()) {
            let entry = entry.map_err(|e| S2Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(&suffix) {
                continue;
            }

            let parsed = parse_product_name(&name)?;
            catalog.files.push(entry.path().to_path_buf());
            catalog.dates.insert(parsed.date);
            catalog.bands.insert(parsed.band);
        }

        log::info!(
            "cataloged {} files covering {} dates and {} bands",
            catalog.files.len(),
            catalog.dates.len(),
            catalog.bands.len()
        );
        Ok(catalog)
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
