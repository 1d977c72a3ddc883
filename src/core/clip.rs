use crate::types::{BandImage, BandPixel, Resolution, S2Error, S2Result};
use gdal::raster::{rasterize, Buffer};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use gdal_sys::OSRAxisMappingStrategy;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

/// Which cutline features participate in the clip geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutlineSelection {
    /// Only feature zero of the cutline layer (the historical default)
    FirstFeature,
    /// Union of every feature in the layer
    UnionAll,
}

/// Parameters for the clipping pipeline
#[derive(Debug, Clone)]
pub struct ClipParams {
    pub selection: CutlineSelection,
    /// Root directory the clipped output tree is mirrored under
    pub output_root: PathBuf,
    /// Value written into pixels outside the cutline, also the nodata marker
    pub fill_value: BandPixel,
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            selection: CutlineSelection::FirstFeature,
            output_root: PathBuf::from("clipped_images"),
            fill_value: 0,
        }
    }
}

/// Clips extracted band rasters against a vector cutline.
///
/// The cutline is loaded once at construction and re-reprojected per raster,
/// since heterogeneous source tiles may each carry a different CRS.
pub struct ClipProcessor {
    cutline_wkt: String,
    cutline_srs_wkt: Option<String>,
    params: ClipParams,
}

impl ClipProcessor {
    /// Load the cutline vector (shapefile, GeoJSON, anything OGR reads)
    /// and build a processor around it.
    pub fn from_cutline<P: AsRef<Path>>(cutline_path: P, params: ClipParams) -> S2Result<Self> {
        let cutline_path = cutline_path.as_ref();
        if !cutline_path.exists() {
            return Err(S2Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cutline not found: {}", cutline_path.display()),
            )));
        }

        let dataset = Dataset::open(cutline_path)?;
        let mut layer = dataset.layer(0)?;

        if params.selection == CutlineSelection::FirstFeature && layer.feature_count() > 1 {
            // Documented limitation of the historical behavior:
            // multi-feature cutlines use only feature zero.
            log::warn!(
                "cutline {} has multiple features, using only the first",
                cutline_path.display()
            );
        }

        let mut combined: Option<Geometry> = None;
        let mut srs_wkt = None;
        for feature in layer.features() {
            let geometry = feature.geometry().ok_or_else(|| {
                S2Error::InvalidCutline(format!(
                    "feature without geometry in {}",
                    cutline_path.display()
                ))
            })?;

            if srs_wkt.is_none() {
                srs_wkt = match geometry.spatial_ref() {
                    Some(srs) => Some(srs.to_wkt()?),
                    None => None,
                };
            }

            combined = match combined {
                None => Some(Geometry::from_wkt(&geometry.wkt()?)?),
                Some(acc) => Some(acc.union(geometry).ok_or_else(|| {
                    S2Error::InvalidCutline(format!(
                        "failed to union cutline features in {}",
                        cutline_path.display()
                    ))
                })?),
            };

            if params.selection == CutlineSelection::FirstFeature {
                break;
            }
        }

        let cutline = combined.ok_or_else(|| {
            S2Error::InvalidCutline(format!("no features in {}", cutline_path.display()))
        })?;

        log::info!("loaded cutline from {}", cutline_path.display());
        Ok(Self {
            cutline_wkt: cutline.wkt()?,
            cutline_srs_wkt: srs_wkt,
            params,
        })
    }

    /// Clip every band raster of `resolution` found in a working directory.
    ///
    /// Outputs land in `<output_root>/<workdir name>/` with the extension
    /// normalized to `.tif`. The output directory is created as needed and
    /// existing files are overwritten unconditionally.
    pub fn clip_directory<P: AsRef<Path>>(
        &self,
        workdir: P,
        resolution: Resolution,
    ) -> S2Result<Vec<PathBuf>> {
        let workdir = workdir.as_ref();
        let dir_name = workdir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| S2Error::Processing(format!(
                "working directory {} has no usable name",
                workdir.display()
            )))?;

        let out_dir = self.params.output_root.join(dir_name);
        fs::create_dir_all(&out_dir).map_err(|e| S2Error::WriteFailure {
            path: out_dir.clone(),
            source: e,
        })?;

        log::info!("clipping images in {}", workdir.display());

        let images = fetch_images(workdir, resolution, "jp2")?;
        let mut outputs = Vec::with_capacity(images.len());
        for image in &images {
            log::info!("clipping {}", image);

            let source = workdir.join(image);
            let target = out_dir.join(Path::new(image).with_extension("tif"));
            self.clip_raster(&source, &target)?;
            outputs.push(target);
        }

        Ok(outputs)
    }

    /// Clip a single raster against the cutline and write the result.
    ///
    /// The cutline is reprojected into the raster's CRS, the cropped pixel
    /// window is computed from the geometry envelope, pixels outside the
    /// geometry are filled, and a GTiff with the updated geotransform is
    /// written. A cutline with no overlap raises `EmptyClipRegion` instead
    /// of producing a degenerate raster.
    pub fn clip_raster(&self, source: &Path, target: &Path) -> S2Result<()> {
        let raster_name = source.display().to_string();

        let dataset = Dataset::open(source)?;
        let gt = dataset.geo_transform()?;
        let srs = dataset.spatial_ref()?;
        let (width, height) = dataset.raster_size();

        if gt[2] != 0.0 || gt[4] != 0.0 {
            log::warn!("{} has a rotated geotransform, window math assumes north-up", raster_name);
        }

        let geometry = self.cutline_in(&srs)?;

        let envelope = geometry.envelope();
        let (x_off, y_off, win_w, win_h) = pixel_window(
            &gt,
            (width, height),
            (envelope.MinX, envelope.MinY, envelope.MaxX, envelope.MaxY),
        )
        .ok_or_else(|| S2Error::EmptyClipRegion {
            raster: raster_name.clone(),
        })?;

        let band = dataset.rasterband(1)?;
        let window = band.read_as::<BandPixel>(
            (x_off as isize, y_off as isize),
            (win_w, win_h),
            (win_w, win_h),
            None,
        )?;
        let mut pixels: BandImage = Array2::from_shape_vec((win_h, win_w), window.data)
            .map_err(|e| S2Error::Processing(format!("failed to reshape raster window: {}", e)))?;

        let window_gt = [
            gt[0] + x_off as f64 * gt[1] + y_off as f64 * gt[2],
            gt[1],
            gt[2],
            gt[3] + x_off as f64 * gt[4] + y_off as f64 * gt[5],
            gt[4],
            gt[5],
        ];

        let mask = burn_mask(&geometry, &srs, &window_gt, win_w, win_h)?;
        if mask.iter().all(|&m| m == 0) {
            return Err(S2Error::EmptyClipRegion { raster: raster_name });
        }

        for ((row, col), value) in pixels.indexed_iter_mut() {
            if mask[[row, col]] == 0 {
                *value = self.params.fill_value;
            }
        }

        self.write_clipped(target, &srs, &window_gt, pixels)?;
        log::info!("wrote {} ({}x{})", target.display(), win_w, win_h);
        Ok(())
    }

    /// Rebuild the cutline geometry and reproject it into `target` CRS.
    fn cutline_in(&self, target: &SpatialRef) -> S2Result<Geometry> {
        let srs_wkt = self.cutline_srs_wkt.as_ref().ok_or_else(|| {
            S2Error::CrsTransform("cutline carries no spatial reference".to_string())
        })?;

        // Traditional GIS axis order on both sides so x/y stay lon/lat or
        // easting/northing no matter what the authority definition says.
        let source_srs = SpatialRef::from_wkt(srs_wkt)?;
        source_srs.set_axis_mapping_strategy(OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        let target_srs = target.clone();
        target_srs.set_axis_mapping_strategy(OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

        let mut geometry = Geometry::from_wkt(&self.cutline_wkt)?;
        geometry.set_spatial_ref(source_srs);
        geometry
            .transform_to(&target_srs)
            .map_err(|e| S2Error::CrsTransform(e.to_string()))
    }

    fn write_clipped(
        &self,
        target: &Path,
        srs: &SpatialRef,
        gt: &[f64; 6],
        pixels: BandImage,
    ) -> S2Result<()> {
        let (rows, cols) = pixels.dim();

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut output = driver.create_with_band_type::<BandPixel, _>(
            target.to_string_lossy().as_ref(),
            cols as isize,
            rows as isize,
            1,
        )?;
        output.set_geo_transform(gt)?;
        output.set_spatial_ref(srs)?;

        let mut band = output.rasterband(1)?;
        band.set_no_data_value(Some(self.params.fill_value as f64))?;

        let buffer = Buffer::new((cols, rows), pixels.into_raw_vec());
        band.write((0, 0), (cols, rows), &buffer)?;
        Ok(())
    }
}

/// List band rasters of one resolution in a directory, by name convention
/// (`{resolution}m` token plus the expected extension). Directory iteration
/// order, not sorted.
pub fn fetch_images<P: AsRef<Path>>(
    dir: P,
    resolution: Resolution,
    extension: &str,
) -> S2Result<Vec<String>> {
    let suffix = format!(".{}", extension);
    let tag = format!("{}m", resolution.meters());

    let mut images = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(&suffix) && name.contains(&tag) {
            images.push(name);
        }
    }
    Ok(images)
}

/// Pixel window covered by a geographic envelope, cropped to the raster.
///
/// Returns `(x_off, y_off, width, height)`, or `None` when the envelope
/// and the raster do not overlap.
fn pixel_window(
    gt: &[f64; 6],
    raster_size: (usize, usize),
    envelope: (f64, f64, f64, f64),
) -> Option<(usize, usize, usize, usize)> {
    let (min_x, min_y, max_x, max_y) = envelope;
    if gt[1] == 0.0 || gt[5] == 0.0 {
        return None;
    }

    // North-up: gt[5] is negative, so the envelope's max y maps to the
    // smallest row index.
    let col_first = ((min_x - gt[0]) / gt[1]).floor();
    let col_last = ((max_x - gt[0]) / gt[1]).ceil();
    let row_first = ((max_y - gt[3]) / gt[5]).floor();
    let row_last = ((min_y - gt[3]) / gt[5]).ceil();

    let x0 = col_first.max(0.0) as usize;
    let y0 = row_first.max(0.0) as usize;
    let x1 = col_last.min(raster_size.0 as f64).max(0.0) as usize;
    let y1 = row_last.min(raster_size.1 as f64).max(0.0) as usize;

    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

/// Burn the geometry into an in-memory byte mask aligned with the window.
fn burn_mask(
    geometry: &Geometry,
    srs: &SpatialRef,
    gt: &[f64; 6],
    width: usize,
    height: usize,
) -> S2Result<Array2<u8>> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut mask_ds = driver.create_with_band_type::<u8, _>("", width as isize, height as isize, 1)?;
    mask_ds.set_geo_transform(gt)?;
    mask_ds.set_spatial_ref(srs)?;

    rasterize(
        &mut mask_ds,
        &[1],
        std::slice::from_ref(geometry),
        &[1.0],
        None,
    )?;

    let band = mask_ds.rasterband(1)?;
    let mask = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;
    Array2::from_shape_vec((height, width), mask.data)
        .map_err(|e| S2Error::Processing(format!("failed to reshape clip mask: {}", e)))
}
