use crate::core::clip::fetch_images;
use crate::types::{Resolution, S2Error, S2Result};
use gdal::Dataset;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

/// Parameters for the band-grid preview
#[derive(Debug, Clone)]
pub struct PreviewParams {
    /// Edge length each band tile is scaled to, in pixels
    pub tile_size: u32,
    /// Gap between tiles, in pixels
    pub gutter: u32,
}

impl Default for PreviewParams {
    fn default() -> Self {
        Self {
            tile_size: 256,
            gutter: 8,
        }
    }
}

/// Renders a fixed grid of clipped single-band rasters into one grayscale
/// image for visual inspection. Not part of the pipeline core.
pub struct PreviewRenderer {
    params: PreviewParams,
}

impl PreviewRenderer {
    pub fn new(params: PreviewParams) -> Self {
        Self { params }
    }

    /// Renderer with the default tile layout
    pub fn standard() -> Self {
        Self::new(PreviewParams::default())
    }

    /// Grid shape per resolution: 2x2 for the four native 10m bands,
    /// 2x4 otherwise.
    fn grid_shape(resolution: Resolution) -> (usize, usize) {
        match resolution {
            Resolution::R10 => (2, 2),
            Resolution::R20 | Resolution::R60 => (2, 4),
        }
    }

    /// Render the clipped `.tif` bands of `dir` into a PNG at `output`.
    pub fn render<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        dir: P,
        resolution: Resolution,
        output: Q,
    ) -> S2Result<PathBuf> {
        let dir = dir.as_ref();
        let output = output.as_ref();
        let (rows, cols) = Self::grid_shape(resolution);

        let images = fetch_images(dir, resolution, "tif")?;
        if images.is_empty() {
            log::warn!("no clipped images for {}m in {}", resolution, dir.display());
        }

        let tile = self.params.tile_size;
        let gutter = self.params.gutter;
        let canvas_w = cols as u32 * (tile + gutter) + gutter;
        let canvas_h = rows as u32 * (tile + gutter) + gutter;
        let mut canvas = GrayImage::new(canvas_w, canvas_h);

        for (i, name) in images.iter().take(rows * cols).enumerate() {
            let scaled = self.load_tile(&dir.join(name))?;
            let col = (i % cols) as u32;
            let row = (i / cols) as u32;
            let x = gutter + col * (tile + gutter);
            let y = gutter + row * (tile + gutter);
            imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
            log::debug!("preview tile {} <- {}", i, name);
        }

        canvas
            .save(output)
            .map_err(|e| S2Error::Processing(format!("failed to write preview: {}", e)))?;
        log::info!("wrote preview {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Read a single-band raster and scale it to one grid tile,
    /// min/max-normalized to 8 bits.
    fn load_tile(&self, path: &Path) -> S2Result<GrayImage> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let data = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &data.data {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        let range = if max > min { max - min } else { 1.0 };

        let mut img = GrayImage::new(width as u32, height as u32);
        for (i, &v) in data.data.iter().enumerate() {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            let scaled = ((v - min) / range * 255.0).clamp(0.0, 255.0) as u8;
            img.put_pixel(x, y, Luma([scaled]));
        }

        let size = self.params.tile_size;
        Ok(imageops::resize(&img, size, size, FilterType::Triangle))
    }
}
