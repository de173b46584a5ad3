use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

mod cache;
mod config;
mod geo;
mod model;
mod output;
mod pipeline;
mod provider;
mod render;

use cache::Cache;
use config::{render_output_path, RunConfig};
use pipeline::RunOptions;
use provider::{DataSource, DEFAULT_OVERPASS_URLS};
use render::RenderOptions;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Render a stylized city map from OpenStreetMap data",
    long_about = None
)]
struct Cli {
    /// Output image path; `{timestamp}` is replaced by the start time
    #[arg(short, long, default_value = "out/map.png")]
    output: String,

    /// Path to the JSON run configuration
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Read data from a local OSM PBF extract instead of Overpass
    #[arg(long)]
    pbf: Option<PathBuf>,

    /// Overpass endpoint, may be repeated; tried in order
    #[arg(long = "overpass-url")]
    overpass_urls: Vec<String>,

    /// Per-request Overpass timeout in seconds
    #[arg(long, default_value_t = 180)]
    timeout_secs: u64,

    /// Cache Overpass responses in this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output resolution
    #[arg(long, default_value_t = 600.0)]
    dpi: f64,

    /// Keep a transparent background instead of white
    #[arg(long)]
    transparent: bool,
}

impl Cli {
    fn data_source(&self) -> Result<DataSource> {
        if let Some(path) = &self.pbf {
            return Ok(DataSource::LocalFile(path.clone()));
        }

        let urls = if self.overpass_urls.is_empty() {
            DEFAULT_OVERPASS_URLS.iter().map(|url| url.to_string()).collect()
        } else {
            self.overpass_urls.clone()
        };

        let cache = match &self.cache_dir {
            Some(dir) => Some(Cache::new(dir).context("Failed to create cache")?),
            None => None,
        };

        Ok(DataSource::Overpass {
            urls,
            timeout: Duration::from_secs(self.timeout_secs),
            cache,
        })
    }
}

fn main() -> Result<()> {
    // Initialize logger, defaulting to info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if !(cli.dpi > 0.0) || !cli.dpi.is_finite() {
        anyhow::bail!("--dpi must be positive, got {}", cli.dpi);
    }

    let config = RunConfig::load(&cli.config)?;
    let provider = provider::open(cli.data_source()?)?;

    let options = RunOptions {
        output: render_output_path(&cli.output, Local::now()),
        render: RenderOptions {
            dpi: cli.dpi,
            ..RenderOptions::default()
        },
        transparent: cli.transparent,
    };

    let report = pipeline::run(&config, provider.as_ref(), &options)?;
    info!(
        "Done: {} layers, {} failed",
        report.outcomes.len(),
        report.failures().count()
    );

    Ok(())
}
