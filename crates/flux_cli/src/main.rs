//! `flux` - render the built-in demo scene with the photon pipeline.
//!
//! Usage: `flux [CONFIG.json] [OUTPUT.png]` (see `flux --help`)
//!
//! Without a config file the default `PipelineConfig` is used. Pass
//! `--print-config` to dump the defaults as JSON for editing.

mod cli;
mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use flux_core::PipelineConfig;
use flux_renderer::PhotonPipeline;

use crate::cli::Args;

/// Light power that gives a mid-grey image at the default photon count
const DEMO_LIGHT_POWER: f32 = 250.0;

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    if args.print_config {
        println!("{}", PipelineConfig::default().to_json()?);
        return Ok(());
    }

    let config = args.load_config()?;
    let output = &args.output;

    log::info!(
        "Rendering {}x{} with {} workers and {} photons",
        config.image_width,
        config.image_height,
        config.worker_count,
        config.photon_count
    );

    let scene = demo::cornell_box(DEMO_LIGHT_POWER)?;
    let pipeline = PhotonPipeline::new(config, &scene)?;
    let (image, stats) = pipeline.run()?;

    image
        .save_png(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    log::info!(
        "Done: {} photons, {} hits, {} lit pixels (transport {:.2?}, write {:.2?})",
        stats.photons_emitted,
        stats.hits_recorded,
        stats.lit_pixels,
        stats.transport_time,
        stats.write_time
    );
    Ok(())
}
