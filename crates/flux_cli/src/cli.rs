//! Command line arguments for the `flux` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flux_core::PipelineConfig;

/// Render the built-in demo scene with the photon-mapping pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "flux", version, about)]
pub struct Args {
    /// Pipeline configuration as JSON (defaults are used when omitted)
    #[arg(value_name = "CONFIG.json")]
    pub config: Option<PathBuf>,

    /// Where to write the rendered image
    #[arg(value_name = "OUTPUT.png", default_value = "flux.png")]
    pub output: PathBuf,

    /// Print the default configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Load the configuration file, or fall back to the defaults.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(PipelineConfig::default()),
        }
    }
}
