use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use memegen::{config, Backdrop, FacePipeline, MemeError, MemePipeline};

#[derive(Parser)]
#[command(name = "memegen")]
#[command(
    version,
    about = "Turn a photo into a captioned meme from the emotion on its faces"
)]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a meme from a photo
    Generate {
        /// Input photo (any supported raster format)
        image: PathBuf,
        /// Where to write the PNG (defaults to output_dir/meme_<id>.png)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Draw on the emotion's meme template instead of the photo
        #[arg(short, long)]
        template: bool,
    },
    /// Detect faces and emotions only, print them as JSON
    Faces {
        /// Input photo
        image: PathBuf,
    },
    /// Open config file in editor
    Config {
        /// Write the default configuration first
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<MemeError>() {
                Some(meme) => {
                    error!("{}", meme);
                    if meme.is_client_error() {
                        info!("Try a photo with a clearly visible face");
                    }
                    meme.exit_code()
                }
                None => {
                    error!("{:#}", e);
                    1
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Generate {
            image,
            out,
            template,
        } => {
            let cfg = config::load_config(config_path)?;
            generate(&cfg, &image, out, template)
        }
        Commands::Faces { image } => {
            let cfg = config::load_config(config_path)?;
            faces(&cfg, &image)
        }
        Commands::Config { init } => open_config(config_path, init),
    }
}

fn generate(cfg: &config::Config, image: &Path, out: Option<PathBuf>, template: bool) -> Result<()> {
    let backdrop = if template {
        Backdrop::Template
    } else {
        Backdrop::Photo
    };
    let mut pipeline = MemePipeline::from_config(cfg)
        .context("Failed to initialize meme pipeline")?
        .with_backdrop(backdrop);

    let artifact = pipeline.run_file(image)?;

    let out = match out {
        Some(path) => path,
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            cfg.output_dir.join(format!("meme_{}.png", &id[..8]))
        }
    };
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))
            .map_err(MemeError::Output)?;
    }
    std::fs::write(&out, &artifact.image)
        .with_context(|| format!("writing {}", out.display()))
        .map_err(MemeError::Output)?;

    info!("Emotion: {}", artifact.emotion);
    info!("Top: {}", artifact.top);
    info!("Bottom: {}", artifact.bottom);
    info!("✓ Meme written to {}", out.display());
    Ok(())
}

fn faces(cfg: &config::Config, image: &Path) -> Result<()> {
    let img = image::open(image)
        .map_err(|e| MemeError::InvalidInput(format!("cannot read image {}: {}", image.display(), e)))?;

    let mut pipeline = FacePipeline::from_models(
        &cfg.detector_model,
        &cfg.emotion_model,
        cfg.emotion_labels.clone(),
        cfg.score_threshold,
        cfg.nms_threshold,
        cfg.emoji_map.clone(),
    )
    .context("Failed to initialize face pipeline")?;

    let records = pipeline.run(&img).map_err(MemeError::Detection)?;
    let ok = records.iter().filter(|r| !r.is_error()).count();

    println!("{}", serde_json::to_string_pretty(&records)?);
    info!("{} face(s) found, {} succeeded", records.len(), ok);
    Ok(())
}

fn open_config(path: Option<&Path>, init: bool) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);

    if init {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
        info!("Default config written to {}", config_path.display());
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
