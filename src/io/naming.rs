use crate::types::{Band, Resolution, S2Error, S2Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

/// Parsed fields of a Sentinel-2 granule file name
///
/// Names follow the fixed underscore-delimited convention
/// `<tile>_<datetime>_<band>[_<resolution>m].<ext>`, e.g.
/// `T32TQM_20210301T100031_B02_20m.jp2`. The band is the second-to-last
/// field, the acquisition date the leading 8 digits of the third-to-last
/// field. Anything that does not fit is a data-integrity error, never a
/// silent skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductName {
    /// MGRS tile id, e.g. `T32TQM`
    pub tile: String,
    /// Raw acquisition timestamp token, e.g. `20210301T100031`
    pub datetime: String,
    /// Acquisition date parsed from the leading 8 digits of the timestamp
    pub date: NaiveDate,
    pub band: Band,
    /// Resolution suffix, when the name carries one
    pub resolution: Option<Resolution>,
}

/// Parse a granule file name into its tile/date/band/resolution fields.
///
/// This is the single seam for the fixed-position name parsing; the band
/// selector and the catalog builder both go through it.
pub fn parse_product_name(name: &str) -> S2Result<ProductName> {
    let stem = name.split('.').next().unwrap_or(name);
    let fields: Vec<&str> = stem.split('_').collect();

    if fields.len() < 3 {
        return Err(S2Error::EntryParse {
            name: name.to_string(),
            reason: format!("expected at least 3 underscore fields, got {}", fields.len()),
        });
    }

    let band: Band = fields[fields.len() - 2].parse().map_err(|_| S2Error::EntryParse {
        name: name.to_string(),
        reason: format!("unknown band token `{}`", fields[fields.len() - 2]),
    })?;

    let datetime = fields[fields.len() - 3];
    let date_token = datetime.get(0..8).ok_or_else(|| S2Error::EntryParse {
        name: name.to_string(),
        reason: format!("date-bearing field `{}` is shorter than 8 characters", datetime),
    })?;
    let date = NaiveDate::parse_from_str(date_token, "%Y%m%d").map_err(|e| S2Error::DateParse {
        token: date_token.to_string(),
        source: e,
    })?;

    let resolution = fields[fields.len() - 1]
        .strip_suffix('m')
        .and_then(|v| v.parse::<u32>().ok())
        .and_then(|m| Resolution::try_from(m).ok());

    Ok(ProductName {
        tile: fields[0].to_string(),
        datetime: datetime.to_string(),
        date,
        band,
        resolution,
    })
}

/// Derive the working-directory key from an archive file name.
///
/// Takes the stem before the first `.`, splits on underscores and reads the
/// leading 8 digits of the last field, the date-bearing segment of the
/// product naming convention. The key is validated as a real calendar date.
pub fn derive_working_key(archive_name: &str) -> S2Result<String> {
    let stem = archive_name.split('.').next().unwrap_or(archive_name);
    let last = stem.rsplit('_').next().unwrap_or(stem);

    let key = last.get(0..8).ok_or_else(|| S2Error::EntryParse {
        name: archive_name.to_string(),
        reason: format!("trailing field `{}` is shorter than 8 characters", last),
    })?;

    NaiveDate::parse_from_str(key, "%Y%m%d").map_err(|e| S2Error::DateParse {
        token: key.to_string(),
        source: e,
    })?;

    Ok(key.to_string())
}

/// Decides whether an archive entry is a single-band raster at a given
/// resolution that should be materialized to disk.
pub struct BandSelector {
    resolution: Resolution,
    subpath: String,
    token_re: Regex,
}

impl BandSelector {
    pub fn new(resolution: Resolution) -> S2Result<Self> {
        // Band files for different resolutions of the same band share a
        // numeric prefix, so the match anchors on the full
        // resolution-qualified suffix of the name, not a bare substring.
        let token_re = Regex::new(&format!("B?[0-9]_{}m$", resolution.meters()))?;
        Ok(Self {
            resolution,
            subpath: format!("IMG_DATA/R{}m/T", resolution.meters()),
            token_re,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// True iff the entry lives under the resolution-tagged image-data
    /// subpath, has the raw raster extension, and its trailing name token
    /// (last 7 characters before the extension) carries the
    /// band-underscore-resolution suffix. First match wins.
    pub fn is_selected(&self, entry: &str) -> bool {
        if !entry.contains(&self.subpath) || !entry.ends_with(".jp2") {
            return false;
        }

        let base = entry.rsplit('/').next().unwrap_or(entry);
        let stem = base.split('.').next().unwrap_or(base);
        let token = if stem.len() > 7 {
            stem.get(stem.len() - 7..).unwrap_or(stem)
        } else {
            stem
        };

        self.token_re.is_match(token)
    }
}
