use approx::assert_relative_eq;
use bandsaw::core::{ClipParams, ClipProcessor, CutlineSelection, PreviewRenderer};
use bandsaw::types::{Resolution, S2Error};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// 100x100 pixels, 20m resolution, UTM zone 32N, north-up.
// Extent: x 600000..602000, y 5098000..5100000.
const GT: [f64; 6] = [600_000.0, 20.0, 0.0, 5_100_000.0, 0.0, -20.0];
const SIZE: usize = 100;

/// Gradient raster so every pixel value encodes its position
fn write_band_raster(path: &Path) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let mut dataset = driver
        .create_with_band_type::<u16, _>(path.to_string_lossy().as_ref(), SIZE, SIZE, 1)
        .expect("failed to create raster");
    dataset.set_geo_transform(&GT).unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(32632).unwrap())
        .unwrap();

    let data: Vec<u16> = (0..SIZE as u16)
        .flat_map(|row| (0..SIZE as u16).map(move |col| 1000 + row * 100 + col))
        .collect();
    let buffer = Buffer::new((SIZE, SIZE), data);
    let mut band = dataset.rasterband(1).unwrap();
    band.write((0, 0), (SIZE, SIZE), &buffer).unwrap();
}

fn polygon_json(ring: &[(f64, f64)]) -> String {
    let coords: Vec<String> = ring
        .iter()
        .chain(ring.first().into_iter())
        .map(|(x, y)| format!("[{}, {}]", x, y))
        .collect();
    format!(
        r#"{{"type": "Feature", "properties": {{}}, "geometry": {{"type": "Polygon", "coordinates": [[{}]]}}}}"#,
        coords.join(", ")
    )
}

/// GeoJSON cutline in UTM coordinates, CRS carried via the legacy member
fn write_utm_cutline(path: &Path, rings: &[&[(f64, f64)]]) {
    let features: Vec<String> = rings.iter().map(|ring| polygon_json(ring)).collect();
    let body = format!(
        r#"{{"type": "FeatureCollection",
"crs": {{"type": "name", "properties": {{"name": "urn:ogc:def:crs:EPSG::32632"}}}},
"features": [{}]}}"#,
        features.join(", ")
    );
    fs::write(path, body).expect("failed to write cutline");
}

/// Plain GeoJSON cutline in geographic lon/lat (default CRS84)
fn write_wgs84_cutline(path: &Path, ring: &[(f64, f64)]) {
    let body = format!(
        r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
        polygon_json(ring)
    );
    fs::write(path, body).expect("failed to write cutline");
}

fn setup_workdir(root: &Path) -> PathBuf {
    let workdir = root.join("20210301");
    fs::create_dir_all(&workdir).unwrap();
    write_band_raster(&workdir.join("T32TQM_20210301T100031_B02_20m.jp2"));
    workdir
}

fn read_back(path: &Path) -> (Vec<u16>, [f64; 6], (usize, usize)) {
    let dataset = Dataset::open(path).expect("failed to open clipped raster");
    let gt = dataset.geo_transform().unwrap();
    let size = dataset.raster_size();
    let band = dataset.rasterband(1).unwrap();
    let data = band.read_as::<u16>((0, 0), size, size, None).unwrap();
    (data.data, gt, size)
}

fn clip_params(root: &Path) -> ClipParams {
    ClipParams {
        output_root: root.join("clipped_images"),
        ..ClipParams::default()
    }
}

#[test]
fn test_clip_full_extent_is_identity() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    let cutline = dir.path().join("cut_poly.geojson");
    write_utm_cutline(
        &cutline,
        &[&[
            (599_000.0, 5_097_000.0),
            (603_000.0, 5_097_000.0),
            (603_000.0, 5_101_000.0),
            (599_000.0, 5_101_000.0),
        ]],
    );

    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path()))
        .expect("failed to load cutline");
    let outputs = clipper
        .clip_directory(&workdir, Resolution::R20)
        .expect("clipping failed");

    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].ends_with("20210301/T32TQM_20210301T100031_B02_20m.tif"));

    let (pixels, gt, size) = read_back(&outputs[0]);
    assert_eq!(size, (SIZE, SIZE));

    // Raster fully inside the cutline: identical pixels, unchanged transform
    let expected: Vec<u16> = (0..SIZE as u16)
        .flat_map(|row| (0..SIZE as u16).map(move |col| 1000 + row * 100 + col))
        .collect();
    assert_eq!(pixels, expected);
    for i in 0..6 {
        assert_relative_eq!(gt[i], GT[i], epsilon = 1e-6);
    }
}

#[test]
fn test_clip_crops_to_interior_cutline() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    let cutline = dir.path().join("cut_poly.geojson");
    write_utm_cutline(
        &cutline,
        &[&[
            (600_200.0, 5_099_000.0),
            (600_600.0, 5_099_000.0),
            (600_600.0, 5_099_800.0),
            (600_200.0, 5_099_800.0),
        ]],
    );

    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path())).unwrap();
    let outputs = clipper.clip_directory(&workdir, Resolution::R20).unwrap();

    let (pixels, gt, size) = read_back(&outputs[0]);
    assert_eq!(size, (20, 40));

    // Window starts 10 pixels in from the top-left corner
    assert_relative_eq!(gt[0], 600_200.0, epsilon = 1e-6);
    assert_relative_eq!(gt[3], 5_099_800.0, epsilon = 1e-6);
    assert_relative_eq!(gt[1], 20.0, epsilon = 1e-6);
    assert_relative_eq!(gt[5], -20.0, epsilon = 1e-6);

    // First output pixel is source pixel (row 10, col 10)
    assert_eq!(pixels[0], 1000 + 10 * 100 + 10);
}

#[test]
fn test_clip_without_overlap_is_an_error() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    let cutline = dir.path().join("cut_poly.geojson");
    write_utm_cutline(
        &cutline,
        &[&[
            (700_000.0, 5_097_000.0),
            (701_000.0, 5_097_000.0),
            (701_000.0, 5_098_000.0),
            (700_000.0, 5_098_000.0),
        ]],
    );

    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path())).unwrap();
    let result = clipper.clip_directory(&workdir, Resolution::R20);
    assert!(matches!(result, Err(S2Error::EmptyClipRegion { .. })));
}

#[test]
fn test_clip_reprojects_geographic_cutline() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    // Generous lon/lat box around the tile, reprojected internally to UTM
    let cutline = dir.path().join("cut_poly.geojson");
    write_wgs84_cutline(
        &cutline,
        &[(9.5, 45.5), (11.0, 45.5), (11.0, 46.5), (9.5, 46.5)],
    );

    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path())).unwrap();
    let outputs = clipper.clip_directory(&workdir, Resolution::R20).unwrap();

    let (pixels, _, size) = read_back(&outputs[0]);
    assert_eq!(size, (SIZE, SIZE));
    assert_eq!(pixels[0], 1000);
    assert_eq!(pixels[SIZE * SIZE - 1], 1000 + 99 * 100 + 99);
}

#[test]
fn test_clip_feature_selection_modes() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    let first: &[(f64, f64)] = &[
        (600_200.0, 5_099_000.0),
        (600_600.0, 5_099_000.0),
        (600_600.0, 5_099_800.0),
        (600_200.0, 5_099_800.0),
    ];
    let second: &[(f64, f64)] = &[
        (601_000.0, 5_098_000.0),
        (601_400.0, 5_098_000.0),
        (601_400.0, 5_098_800.0),
        (601_000.0, 5_098_800.0),
    ];

    let cutline = dir.path().join("cut_poly.geojson");
    write_utm_cutline(&cutline, &[first, second]);

    // Feature zero only: the second polygon is ignored
    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path())).unwrap();
    let outputs = clipper.clip_directory(&workdir, Resolution::R20).unwrap();
    let (_, _, size) = read_back(&outputs[0]);
    assert_eq!(size, (20, 40));

    // Union of both polygons: window spans their joint envelope, and the
    // gap between them is filled with nodata
    let params = ClipParams {
        selection: CutlineSelection::UnionAll,
        output_root: dir.path().join("clipped_union"),
        ..ClipParams::default()
    };
    let clipper = ClipProcessor::from_cutline(&cutline, params).unwrap();
    let outputs = clipper.clip_directory(&workdir, Resolution::R20).unwrap();
    let (pixels, gt, size) = read_back(&outputs[0]);
    assert_eq!(size, (60, 90));
    assert_relative_eq!(gt[0], 600_200.0, epsilon = 1e-6);
    assert_relative_eq!(gt[3], 5_099_800.0, epsilon = 1e-6);

    // Top-left of the window lies inside the first polygon
    assert_eq!(pixels[0], 1000 + 10 * 100 + 10);
    // A pixel between the polygons is outside both and carries the fill
    let gap_row = 30;
    let gap_col = 30;
    assert_eq!(pixels[gap_row * 60 + gap_col], 0);
}

#[test]
fn test_preview_grid_from_clipped_directory() {
    let dir = TempDir::new().unwrap();
    let workdir = setup_workdir(dir.path());

    let cutline = dir.path().join("cut_poly.geojson");
    write_utm_cutline(
        &cutline,
        &[&[
            (599_000.0, 5_097_000.0),
            (603_000.0, 5_097_000.0),
            (603_000.0, 5_101_000.0),
            (599_000.0, 5_101_000.0),
        ]],
    );

    let clipper = ClipProcessor::from_cutline(&cutline, clip_params(dir.path())).unwrap();
    let outputs = clipper.clip_directory(&workdir, Resolution::R20).unwrap();
    let clip_dir = outputs[0].parent().unwrap();

    let png = clip_dir.join("preview_20m.png");
    let written = PreviewRenderer::standard()
        .render(clip_dir, Resolution::R20, &png)
        .expect("preview failed");
    assert!(written.is_file());
}
