//! bandsaw: A Fast, Modular Sentinel-2 Band Extraction and Clipping Toolkit
//!
//! This library manages a local archive of compressed Sentinel-2 products,
//! extracts per-band rasters at a chosen resolution, clips them to a region
//! of interest defined by a vector cutline, and catalogs the clipped tree
//! by acquisition date and band.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{Band, BandImage, BandPixel, Resolution, S2Error, S2Result};

pub use io::{ArchiveIndex, BandSelector, Extractor, ProductInfo, ProductName};
pub use core::{Catalog, CatalogBuilder, ClipParams, ClipProcessor, CutlineSelection, PreviewRenderer};
