use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use watermark_studio::{
    analysis::BrightnessAnalyzer,
    config::Config,
    engine::ProcessingEngine,
    media::{MediaItem, MediaKind, MediaStatus, WorkingSet},
    raster::WatermarkImage,
    settings::{WatermarkKind, WatermarkSettings},
};

#[derive(Parser)]
#[command(
    name = "watermark-studio",
    version,
    about = "Overlay text and image watermarks onto images and videos",
    long_about = "Watermark Studio composites text or logo watermarks onto still images and re-encodes videos frame by frame with the watermark drawn on every frame."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Watermark options shared by every watermarking command
#[derive(Args)]
struct WatermarkArgs {
    /// Watermark settings as TOML
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Text to draw; overrides the settings file
    #[arg(short, long)]
    text: Option<String>,

    /// Logo image to draw instead of text
    #[arg(short, long)]
    watermark: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Watermark a still image (JPEG, PNG, WebP, GIF); the output is PNG
    Image {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },

    /// Watermark a video (MP4, WebM, MOV, MKV); the output is WebM
    Video {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },

    /// Watermark several files into a directory
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,
    },

    /// Report an image's brightness and the contrasting watermark tone
    Analyze {
        input: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "watermark-studio.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::from_level(log_level).into()))
        .init();

    info!("Starting Watermark Studio v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };
    config.validate()?;

    match cli.command {
        Command::Image { input, output, watermark } => {
            run_single(&config, &input, &output, &watermark, MediaKind::Image).await
        }
        Command::Video { input, output, watermark } => {
            run_single(&config, &input, &output, &watermark, MediaKind::Video).await
        }
        Command::Batch {
            inputs,
            output_dir,
            watermark,
        } => run_batch(&config, &inputs, &output_dir, &watermark).await,
        Command::Analyze { input } => run_analyze(&config, &input),
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!("Default configuration written to {:?}", path);
            Ok(())
        }
    }
}

/// Engine carrying the shared watermark described by the command line
fn build_engine(config: &Config, args: &WatermarkArgs) -> Result<(ProcessingEngine, Option<WatermarkSettings>)> {
    let mut settings = match &args.settings {
        Some(path) => {
            let content = std::fs::read_to_string(path).with_context(|| format!("reading settings {:?}", path))?;
            toml::from_str::<WatermarkSettings>(&content).with_context(|| format!("parsing settings {:?}", path))?
        }
        None => WatermarkSettings::default(),
    };
    if let Some(text) = &args.text {
        settings = settings.with_kind(WatermarkKind::Text).with_text(text.clone());
    }

    let watermark = match &args.watermark {
        Some(path) => {
            if args.settings.is_none() && settings.text_content().is_empty() {
                settings = settings.with_kind(WatermarkKind::Image);
            }
            Some(Arc::new(WatermarkImage::open(path)?))
        }
        None => None,
    };

    let mut engine = ProcessingEngine::from_config(config, None);
    engine.set_shared_watermark(settings.clone(), watermark);

    // Without a settings file, text on images takes the contrasting tone
    let auto_tone = (args.settings.is_none() && settings.kind() == WatermarkKind::Text).then_some(settings);
    Ok((engine, auto_tone))
}

/// Load one input, picking a contrasting text color for images when asked
fn load_item(engine: &ProcessingEngine, config: &Config, input: &Path, auto_tone: Option<&WatermarkSettings>) -> Result<MediaItem> {
    let mut item = engine.load_path(input)?;
    if let (Some(settings), MediaKind::Image) = (auto_tone, item.kind()) {
        match image::open(input) {
            Ok(decoded) => {
                let tone = BrightnessAnalyzer::with_sample_size(config.image.analysis_samples)
                    .analyze(&decoded)
                    .tone;
                item.set_custom_settings(Some(settings.with_color_mode(tone.into())));
            }
            Err(e) => warn!("Skipping brightness analysis of {:?}: {}", input, e),
        }
    }
    Ok(item)
}

async fn write_result(item: &MediaItem, target: &Path) -> Result<()> {
    let result = item
        .result()
        .ok_or_else(|| anyhow::anyhow!("{} has no result", item.file_name()))?;
    let output = result.clone().materialize(None).await?;
    tokio::fs::write(target, &output.data).await?;
    info!("{} -> {:?} ({})", item.file_name(), target, result.mime());
    Ok(())
}

async fn run_single(config: &Config, input: &Path, output: &Path, args: &WatermarkArgs, expected: MediaKind) -> Result<()> {
    let (engine, auto_tone) = build_engine(config, args)?;
    let mut item = load_item(&engine, config, input, auto_tone.as_ref())?;
    if item.kind() != expected {
        anyhow::bail!("{:?} is not a {:?} file", input, expected);
    }

    if let Err(e) = engine.process(&mut item).await {
        anyhow::bail!("{} [{}]", e.user_message(), e.code());
    }
    write_result(&item, output).await
}

async fn run_batch(config: &Config, inputs: &[PathBuf], output_dir: &Path, args: &WatermarkArgs) -> Result<()> {
    let (engine, auto_tone) = build_engine(config, args)?;

    let mut set = WorkingSet::new();
    for input in inputs {
        match load_item(&engine, config, input, auto_tone.as_ref()) {
            Ok(item) => {
                set.add(item);
            }
            Err(e) => warn!("Skipping {:?}: {}", input, e),
        }
    }

    if set.is_empty() {
        anyhow::bail!("No usable input files");
    }

    let completed = engine.process_all(&mut set).await;
    std::fs::create_dir_all(output_dir)?;

    let mut taken = HashSet::new();
    for item in set.iter() {
        match (item.status(), item.result()) {
            (MediaStatus::Completed, Some(result)) => {
                let name = unique_file_name(&result.file_name(), &mut taken);
                write_result(item, &output_dir.join(name)).await?;
            }
            _ => {
                if let Some(error) = item.error() {
                    warn!("{} failed [{}]: {}", item.file_name(), error.code, error.user_message);
                }
            }
        }
    }

    info!("Watermarked {}/{} files", completed, set.len());
    if completed < set.len() {
        anyhow::bail!("{} file(s) failed", set.len() - completed);
    }
    Ok(())
}

/// Claim `name` within one batch, numbering repeats as `stem-2.ext`, `stem-3.ext`, ...
fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    };
    let mut counter = 2;
    loop {
        let candidate = match extension {
            Some(extension) => format!("{}-{}.{}", stem, counter, extension),
            None => format!("{}-{}", stem, counter),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn run_analyze(config: &Config, input: &Path) -> Result<()> {
    let decoded = image::open(input).with_context(|| format!("decoding {:?}", input))?;
    let report = BrightnessAnalyzer::with_sample_size(config.image.analysis_samples).analyze(&decoded);
    println!("{}: brightness {:.1}, use a {:?} watermark", input.display(), report.average, report.tone);
    Ok(())
}
