use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Digital-number pixel type of Sentinel-2 band rasters (UInt16)
pub type BandPixel = u16;

/// 2D single-band raster array (rows x cols)
pub type BandImage = Array2<BandPixel>;

/// Spatial resolutions a Sentinel-2 product ships bands at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    R10,
    R20,
    R60,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::R10, Resolution::R20, Resolution::R60];

    /// Ground sampling distance in meters
    pub fn meters(&self) -> u32 {
        match self {
            Resolution::R10 => 10,
            Resolution::R20 => 20,
            Resolution::R60 => 60,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.meters())
    }
}

impl TryFrom<u32> for Resolution {
    type Error = S2Error;

    fn try_from(meters: u32) -> Result<Self, Self::Error> {
        match meters {
            10 => Ok(Resolution::R10),
            20 => Ok(Resolution::R20),
            60 => Ok(Resolution::R60),
            other => Err(S2Error::InvalidResolution(other)),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = S2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let meters: u32 = s
            .trim_end_matches('m')
            .parse()
            .map_err(|_| S2Error::InvalidResolution(0))?;
        Resolution::try_from(meters)
    }
}

/// Sentinel-2 band designators, including the L2A auxiliary layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B10,
    B11,
    B12,
    Aot,
    Scl,
    Tci,
    Wvp,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B8A => "B8A",
            Band::B09 => "B09",
            Band::B10 => "B10",
            Band::B11 => "B11",
            Band::B12 => "B12",
            Band::Aot => "AOT",
            Band::Scl => "SCL",
            Band::Tci => "TCI",
            Band::Wvp => "WVP",
        };
        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Band {
    type Err = S2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let band = match s {
            "B01" => Band::B01,
            "B02" => Band::B02,
            "B03" => Band::B03,
            "B04" => Band::B04,
            "B05" => Band::B05,
            "B06" => Band::B06,
            "B07" => Band::B07,
            "B08" => Band::B08,
            "B8A" => Band::B8A,
            "B09" => Band::B09,
            "B10" => Band::B10,
            "B11" => Band::B11,
            "B12" => Band::B12,
            "AOT" => Band::Aot,
            "SCL" => Band::Scl,
            "TCI" => Band::Tci,
            "WVP" => Band::Wvp,
            other => {
                return Err(S2Error::EntryParse {
                    name: other.to_string(),
                    reason: "unknown band designator".to_string(),
                })
            }
        };
        Ok(band)
    }
}

/// Error types for Sentinel-2 archive and clipping operations
#[derive(Debug, thiserror::Error)]
pub enum S2Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("invalid archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    #[error("failed to parse entry name `{name}`: {reason}")]
    EntryParse { name: String, reason: String },

    #[error("malformed date token `{token}`: {source}")]
    DateParse {
        token: String,
        source: chrono::ParseError,
    },

    #[error("write failure at {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid cutline: {0}")]
    InvalidCutline(String),

    #[error("cutline has no overlap with raster {raster}")]
    EmptyClipRegion { raster: String },

    #[error("processing error: {0}")]
    Processing(String),

    #[error("CRS transform failed: {0}")]
    CrsTransform(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("invalid selector pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("unsupported resolution: {0}m (expected 10, 20 or 60)")]
    InvalidResolution(u32),
}

/// Result type for Sentinel-2 operations
pub type S2Result<T> = Result<T, S2Error>;
