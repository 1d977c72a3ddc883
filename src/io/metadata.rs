use crate::types::{S2Error, S2Result};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Product-level metadata parsed from the `MTD_*.xml` descriptor inside a
/// product archive
#[derive(Debug, Clone, Serialize)]
pub struct ProductInfo {
    pub spacecraft: String,
    pub product_type: String,
    pub processing_level: String,
    pub sensing_start: DateTime<Utc>,
}

/// Locate and parse the product metadata descriptor of an archive.
///
/// Sentinel-2 products carry a single `MTD_MSIL*.xml` at the `.SAFE` root;
/// the first matching entry is used.
pub fn read_product_info<P: AsRef<Path>>(archive_path: P) -> S2Result<ProductInfo> {
    let archive_path = archive_path.as_ref();
    if !archive_path.exists() {
        return Err(S2Error::ArchiveNotFound(archive_path.display().to_string()));
    }

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut descriptor = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let basename = name.rsplit('/').next().unwrap_or(&name);
        if basename.starts_with("MTD_") && basename.ends_with(".xml") {
            descriptor = Some(name);
            break;
        }
    }

    let descriptor = descriptor.ok_or_else(|| {
        S2Error::Metadata(format!(
            "no MTD_*.xml descriptor in {}",
            archive_path.display()
        ))
    })?;
    log::debug!("reading product descriptor {}", descriptor);

    let mut entry = archive.by_name(&descriptor)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;

    parse_product_xml(&xml)
}

/// Parse the descriptor XML. Tags are matched by local name so the `n1:`
/// namespace prefixes of the vendor schema do not matter.
pub fn parse_product_xml(xml: &str) -> S2Result<ProductInfo> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut curr = String::new();

    let mut spacecraft = None;
    let mut product_type = None;
    let mut processing_level = None;
    let mut sensing_start = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| S2Error::Metadata(format!("XML parse error: {}", e)))?;

        match event {
            Event::Start(ref e) => {
                curr = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
            }
            Event::End(_) => {
                curr.clear();
            }
            Event::Text(e) => {
                let txt = e
                    .unescape()
                    .map_err(|e| S2Error::Metadata(format!("XML unescape error: {}", e)))?;
                match curr.as_str() {
                    "SPACECRAFT_NAME" => spacecraft = Some(txt.to_string()),
                    "PRODUCT_TYPE" => product_type = Some(txt.to_string()),
                    "PROCESSING_LEVEL" => processing_level = Some(txt.to_string()),
                    "PRODUCT_START_TIME" => sensing_start = Some(parse_sensing_time(&txt)?),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ProductInfo {
        spacecraft: spacecraft
            .ok_or_else(|| S2Error::Metadata("missing SPACECRAFT_NAME".to_string()))?,
        product_type: product_type
            .ok_or_else(|| S2Error::Metadata("missing PRODUCT_TYPE".to_string()))?,
        processing_level: processing_level
            .ok_or_else(|| S2Error::Metadata("missing PROCESSING_LEVEL".to_string()))?,
        sensing_start: sensing_start
            .ok_or_else(|| S2Error::Metadata("missing PRODUCT_START_TIME".to_string()))?,
    })
}

/// The descriptor writes UTC timestamps with a trailing `Z`, occasionally
/// without fractional seconds.
fn parse_sensing_time(value: &str) -> S2Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }

    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| S2Error::Metadata(format!("unparseable sensing time `{}`: {}", value, e)))
}
