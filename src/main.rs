use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::debug;

use flamebatch::batch::{load_inputs, render_batch};
use flamebatch::config::load_options;
use flamebatch::error_codes::find_coded_error;
use flamebatch::options::{FixDimension, ImageFormat, RenderOptions};

#[derive(Debug, Parser)]
#[command(name = "flamebatch", version)]
#[command(about = "Render flam3 flame files through flam3-render with a live progress bar")]
struct Cli {
    /// Quality scale.
    #[arg(long)]
    qs: Option<f64>,

    /// Size scale. Ignored when --width or --height is given.
    #[arg(long)]
    ss: Option<f64>,

    /// Make the background transparent if the image format supports it.
    #[arg(long)]
    transparency: bool,

    /// Pixel aspect ratio.
    #[arg(long = "pixel_aspect", visible_alias = "pixel-aspect", value_name = "ASPECT")]
    pixel_aspect: Option<f64>,

    /// Size of the renderer's internal buffers.
    #[arg(long, value_name = "BITS")]
    bits: Option<u32>,

    /// Bits per colour channel.
    #[arg(long, value_name = "BITS")]
    bpc: Option<u32>,

    /// Output image format (defaults to png).
    #[arg(long, value_enum)]
    format: Option<ImageFormat>,

    /// Output height in pixels.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,

    /// Output width in pixels.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Keep the source aspect ratio when both width and height are given.
    #[arg(long)]
    keepratio: bool,

    /// When resizing, fix the image width or height and crop or expand the other.
    #[arg(long, value_enum, value_name = "width|height")]
    fix: Option<FixDimension>,

    /// Configuration section to use as defaults.
    #[arg(long, value_name = "NAME")]
    config: Option<String>,

    /// File to load configuration from (defaults to ~/.flam3.ini).
    #[arg(long, value_name = "FILE")]
    configfile: Option<PathBuf>,

    /// Directory containing flam3-render, searched before PATH.
    #[arg(long, value_name = "DIR")]
    renderer_dir: Option<PathBuf>,

    /// Kill a render that takes longer than this many seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Flame files to render.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

impl Cli {
    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            qs: self.qs,
            ss: self.ss,
            pixel_aspect: self.pixel_aspect,
            format: self.format,
            bpc: self.bpc,
            bits: self.bits,
            transparency: self.transparency.then_some(true),
            width: self.width,
            height: self.height,
            fix: self.fix,
            keepratio: self.keepratio.then_some(true),
            renderer_dir: self.renderer_dir.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(&error),
    }
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("FLAMEBATCH_LOG"))
        .unwrap_or_else(|_| "warn".to_owned());
    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn run(cli: &Cli) -> Result<()> {
    debug!(
        git = option_env!("FLAMEBATCH_GIT_HASH").unwrap_or("unknown"),
        "flamebatch starting"
    );

    let options = load_options(
        cli.render_options(),
        cli.configfile.as_deref(),
        cli.config.as_deref(),
    )?
    .normalized();
    debug!(?options, "resolved render options");

    let files = load_inputs(&cli.files)?;
    let stdout = io::stdout();
    let rendered = render_batch(&files, &options, stdout.lock())?;
    debug!(count = rendered.len(), "batch complete");
    Ok(())
}

fn report(error: &anyhow::Error) -> ExitCode {
    match find_coded_error(error) {
        Some(coded) if coded.prints_usage() => {
            eprintln!("{coded}");
            eprintln!("{}", Cli::command().render_usage());
            ExitCode::from(2)
        }
        _ => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
