use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};

use depth_video::{
    config::Config,
    depth::SmoothingMode,
    generator::{GeneratorRegistry, Kind},
    pipeline::{RunReport, VideoPipeline},
};

#[derive(Parser)]
#[command(
    name = "depth-video",
    version,
    about = "Generate depth-map videos from regular videos",
    long_about = "Depth-Video decodes a video in batches, estimates depth for every frame, smooths it over time and writes one stitched video per requested output kind."
)]
struct Cli {
    /// Input video (mp4, webm, avi, mov, mkv, mts, gif) or still image
    input: PathBuf,

    /// Use this depth video instead of computing depth
    #[arg(short, long)]
    depth_video: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Temporal smoothing of computed depth (none, experimental)
    #[arg(short, long)]
    smoothing: Option<String>,

    /// Frames per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Stop after this many frames
    #[arg(short, long)]
    max_frames: Option<usize>,

    /// Bitrate of color outputs in kbit/s
    #[arg(long)]
    bitrate: Option<u32>,

    /// Output kinds to generate (depth, heatmap)
    #[arg(long, value_delimiter = ',')]
    outputs: Vec<String>,

    /// Generator to use
    #[arg(short, long)]
    generator: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command line flags win over the configuration file
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(mode) = &self.smoothing {
            config.smoothing.mode = SmoothingMode::from(mode.as_str());
        }
        if let Some(batch_size) = self.batch_size {
            config.video.batch_size = batch_size;
        }
        if self.max_frames.is_some() {
            config.video.max_frames = self.max_frames;
        }
        if self.bitrate.is_some() {
            config.encoding.colorvids_bitrate = self.bitrate;
        }
        if !self.outputs.is_empty() {
            config.generation.outputs = self.outputs.iter().map(|k| Kind::from(k.as_str())).collect();
        }
        if let Some(generator) = &self.generator {
            config.generation.generator = generator.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("Starting Depth-Video v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let registry = GeneratorRegistry::new();
    let generator = registry.create(&config.generation.generator).map_err(|e| {
        error!("{}", e.user_message());
        e
    })?;
    info!("Using {} generator", generator.name());

    let tools = config.encoding.tools();
    if !tools.check_available() {
        error!("ffmpeg was not found at {:?}; encoding will fail", tools.ffmpeg);
    }

    let mut pipeline = VideoPipeline::new(config, generator)?;
    let input = cli.input.clone();
    let depth_video = cli.depth_video.clone();

    // The pipeline blocks on ffmpeg for its whole run
    let report = tokio::task::spawn_blocking(move || pipeline.run(&input, depth_video.as_deref()))
        .await
        .context("pipeline task panicked")?;

    match report {
        Ok(RunReport::Rejected { message }) => {
            error!("{}", message);
            std::process::exit(2);
        }
        Ok(report) => {
            for output in report.outputs() {
                info!("{} video: {:?}", output.kind, output.path);
            }
            info!("{}", report.message());
            Ok(())
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}
