//! I/O modules for reading product archives, file names, and metadata

pub mod archive;
pub mod metadata;
pub mod naming;

pub use archive::{ArchiveIndex, Extractor};
pub use metadata::{read_product_info, ProductInfo};
pub use naming::{derive_working_key, parse_product_name, BandSelector, ProductName};
