//! Core processing modules

pub mod catalog;
pub mod clip;
pub mod preview;

// Re-export main types
pub use catalog::{Catalog, CatalogBuilder};
pub use clip::{fetch_images, ClipParams, ClipProcessor, CutlineSelection};
pub use preview::{PreviewParams, PreviewRenderer};
