use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use bandsaw::core::{
    CatalogBuilder, ClipParams, ClipProcessor, CutlineSelection, PreviewRenderer,
};
use bandsaw::io::{read_product_info, ArchiveIndex, Extractor};
use bandsaw::types::Resolution;

/// Extract, clip and catalog Sentinel-2 band rasters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the zipped product archives
    #[arg(long, default_value = "zipfiles")]
    zipdir: PathBuf,

    /// Vector cutline (shapefile or GeoJSON) defining the region of interest
    #[arg(long)]
    cutline: PathBuf,

    /// Resolutions to process, in meters (10, 20 or 60; repeatable)
    #[arg(long = "resolution", default_values_t = [20u32])]
    resolutions: Vec<u32>,

    /// Root directory for the clipped output tree
    #[arg(long, default_value = "clipped_images")]
    output: PathBuf,

    /// Root directory for the raw working directories
    #[arg(long, default_value = ".")]
    work_root: PathBuf,

    /// Keep the raw working directories instead of removing them
    #[arg(long)]
    keep_raw: bool,

    /// Clip against the union of all cutline features instead of feature zero
    #[arg(long)]
    union_features: bool,

    /// Write a band-grid preview PNG into each clipped directory
    #[arg(long)]
    preview: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let resolutions = cli
        .resolutions
        .iter()
        .map(|&meters| Resolution::try_from(meters))
        .collect::<Result<Vec<_>, _>>()
        .context("invalid resolution requested")?;

    let index = ArchiveIndex::new(&cli.zipdir).context("failed to index archive directory")?;
    log::info!("{:?}", index.archives());

    let params = ClipParams {
        selection: if cli.union_features {
            CutlineSelection::UnionAll
        } else {
            CutlineSelection::FirstFeature
        },
        output_root: cli.output.clone(),
        ..ClipParams::default()
    };
    let clipper =
        ClipProcessor::from_cutline(&cli.cutline, params).context("failed to load cutline")?;

    let extractor = Extractor::with_work_root(index, &cli.work_root);

    // Per-archive failures are reported and the run continues with the
    // next archive; only startup errors above are fatal.
    let archives = extractor.index().archives().to_vec();
    for archive in &archives {
        for &resolution in &resolutions {
            if let Err(e) = process_archive(&extractor, &clipper, archive, resolution, &cli) {
                log::error!("{} at {}m: {}", archive, resolution, e);
            }
        }
    }

    let catalog = CatalogBuilder::with_extension("tif")
        .build(&cli.output)
        .context("failed to catalog the clipped tree")?;
    let bands: Vec<String> = catalog.bands.iter().map(|b| b.to_string()).collect();
    log::info!("{:?}", bands);
    log::info!("{:?}", catalog.dates);

    Ok(())
}

fn process_archive(
    extractor: &Extractor,
    clipper: &ClipProcessor,
    archive: &str,
    resolution: Resolution,
    cli: &Cli,
) -> anyhow::Result<()> {
    match read_product_info(extractor.index().archive_path(archive)) {
        Ok(info) => log::info!(
            "{}: {} {} acquired {}",
            archive,
            info.spacecraft,
            info.product_type,
            info.sensing_start
        ),
        Err(e) => log::warn!("no product metadata for {}: {}", archive, e),
    }

    let workdir = extractor.extract(archive, resolution)?;
    let outputs = clipper.clip_directory(&workdir, resolution)?;
    log::info!("clipped {} rasters from {}", outputs.len(), archive);

    if cli.preview {
        if let Some(clip_dir) = outputs.first().and_then(|p| p.parent()) {
            let png = clip_dir.join(format!("preview_{}m.png", resolution));
            PreviewRenderer::standard().render(clip_dir, resolution, &png)?;
        }
    }

    if !cli.keep_raw {
        fs::remove_dir_all(&workdir)
            .with_context(|| format!("failed to remove {}", workdir.display()))?;
        log::info!("removed raw working directory {}", workdir.display());
    }

    Ok(())
}
