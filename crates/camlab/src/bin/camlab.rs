//! camlab CLI: image demos, marker generation and the calibration session.

use std::path::{Path, PathBuf};

use camlab::aruco::{dictionary, generate_marker_set, MarkerError};
use camlab::config::{ConfigError, SessionConfig};
use camlab::devices::{DeviceError, DirectorySink, FrameSink, ImageSequenceSource, NullSink, ScriptedKeys};
use camlab::imgproc::{
    dft_forward, dft_inverse, gaussian_kernel, gray_to_f32, load_color, load_gray, magnitude_spectrum,
    merge_channels, resize_square, save_image, split_channels, to_gray8, zero_channel, Channel, GaussianSpec,
    ImgprocError,
};
use camlab::session::{Session, SessionError, SessionMode};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::GrayImage;
use log::info;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Imgproc(#[from] ImgprocError),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "camlab")]
#[command(about = "Camera calibration, ArUco pose monitoring and image-processing demos")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Magnitude spectrum of an image, and its inverse transform.
    Dft(DftArgs),

    /// Render a normalized 2D Gaussian.
    Gaussian(GaussianArgs),

    /// Zero one colour channel pixel by pixel.
    Pixel(PixelArgs),

    /// Split an image into colour planes and merge them back with one zeroed.
    Channels(ChannelsArgs),

    /// Load an image and save its grayscale version.
    Convert(ConvertArgs),

    /// Write a set of ArUco marker images.
    Markers(MarkersArgs),

    /// Write the default session configuration as JSON.
    Config {
        #[arg(long)]
        out: PathBuf,
    },

    /// Capture chessboard views and calibrate, or monitor markers.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct DftArgs {
    #[arg(long)]
    input: PathBuf,

    /// Magnitude spectrum image.
    #[arg(long)]
    out: PathBuf,

    /// Reconstruction from the inverse transform.
    #[arg(long)]
    inverse: Option<PathBuf>,

    /// The input is resized to a square of this side first.
    #[arg(long, default_value = "500")]
    size: u32,
}

#[derive(Debug, Args)]
struct GaussianArgs {
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "256")]
    width: u32,

    #[arg(long, default_value = "256")]
    height: u32,

    /// Mean column; the centre when omitted.
    #[arg(long)]
    ux: Option<i32>,

    /// Mean row; the centre when omitted.
    #[arg(long)]
    uy: Option<i32>,

    #[arg(long, default_value = "10.0")]
    sigma_x: f32,

    #[arg(long, default_value = "10.0")]
    sigma_y: f32,

    #[arg(long, default_value = "1.0")]
    amplitude: f32,
}

#[derive(Debug, Args)]
struct PixelArgs {
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    out: PathBuf,

    /// r, g or b.
    #[arg(long, default_value = "red")]
    channel: Channel,
}

#[derive(Debug, Args)]
struct ChannelsArgs {
    #[arg(long)]
    input: PathBuf,

    /// Receives `red.png`, `green.png`, `blue.png` and `merged.png`.
    #[arg(long)]
    out_dir: PathBuf,

    /// Channel replaced by zeros before merging.
    #[arg(long, default_value = "red")]
    zero: Channel,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct MarkersArgs {
    #[arg(long)]
    out_dir: PathBuf,

    #[arg(long, default_value = "DICT_4X4_50")]
    dictionary: String,

    #[arg(long, default_value = "50")]
    count: u32,

    /// Marker image side in pixels.
    #[arg(long, default_value = "500")]
    size: u32,

    #[arg(long, default_value = "4x4Marker_")]
    prefix: String,

    #[arg(long, default_value = "jpg")]
    ext: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Calibrate,
    Monitor,
}

impl From<ModeArg> for SessionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Calibrate => SessionMode::Calibrate,
            ModeArg::Monitor => SessionMode::Monitor,
        }
    }
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Monitor)]
    mode: ModeArg,

    /// Session configuration (JSON); defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of frames replayed as the camera.
    #[arg(long)]
    frames: PathBuf,

    /// Directory for annotated frames; discarded when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Key script, one entry per frame: `.` no key, `\e` Escape.
    #[arg(long, default_value = "")]
    keys: String,

    /// Calibration file, overriding the configuration.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Sleep the key-poll timeout on frames without a key.
    #[arg(long)]
    realtime: bool,
}

fn init_logging(verbose: u8) {
    #[cfg(feature = "tracing")]
    let result = {
        let _ = verbose;
        camlab::core::init_tracing(false).map_err(|e| e.to_string())
    };
    #[cfg(not(feature = "tracing"))]
    let result = camlab::core::init_with_level(camlab::core::level_from_verbosity(verbose))
        .map_err(|e| e.to_string());

    if let Err(e) = result {
        eprintln!("warning: logging not initialized: {e}");
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Dft(args) => run_dft(&args),
        Commands::Gaussian(args) => run_gaussian(&args),
        Commands::Pixel(args) => run_pixel(&args),
        Commands::Channels(args) => run_channels(&args),
        Commands::Convert(args) => run_convert(&args),
        Commands::Markers(args) => run_markers(&args),
        Commands::Config { out } => run_config(&out),
        Commands::Session(args) => run_session(&args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn create_dir(path: &Path) -> CliResult<()> {
    std::fs::create_dir_all(path).map_err(|source| CliError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn run_dft(args: &DftArgs) -> CliResult<()> {
    let gray = resize_square(&load_gray(&args.input)?, args.size);
    let spectrum = dft_forward(&gray_to_f32(&gray));
    save_image(&to_gray8(&magnitude_spectrum(&spectrum)), &args.out)?;
    info!("spectrum written to {}", args.out.display());

    if let Some(path) = &args.inverse {
        save_image(&to_gray8(&dft_inverse(&spectrum)), path)?;
        info!("inverse written to {}", path.display());
    }
    Ok(())
}

fn run_gaussian(args: &GaussianArgs) -> CliResult<()> {
    let mut spec = GaussianSpec::centered(args.width, args.height, args.sigma_x, args.sigma_y);
    spec.ux = args.ux.unwrap_or(spec.ux);
    spec.uy = args.uy.unwrap_or(spec.uy);
    spec.amplitude = args.amplitude;
    save_image(&to_gray8(&gaussian_kernel(&spec)), &args.out)?;
    info!("gaussian {}x{} written to {}", spec.width, spec.height, args.out.display());
    Ok(())
}

fn run_pixel(args: &PixelArgs) -> CliResult<()> {
    let mut img = load_color(&args.input)?;
    zero_channel(&mut img, args.channel);
    save_image(&img, &args.out)?;
    Ok(())
}

fn run_channels(args: &ChannelsArgs) -> CliResult<()> {
    let img = load_color(&args.input)?;
    create_dir(&args.out_dir)?;
    let mut planes = split_channels(&img);
    for (plane, name) in planes.iter().zip(["red", "green", "blue"]) {
        save_image(plane, args.out_dir.join(format!("{name}.png")))?;
    }
    let (w, h) = img.dimensions();
    planes[args.zero.index()] = GrayImage::new(w, h);
    save_image(&merge_channels(&planes)?, args.out_dir.join("merged.png"))?;
    Ok(())
}

fn run_convert(args: &ConvertArgs) -> CliResult<()> {
    let gray = load_gray(&args.input)?;
    save_image(&gray, &args.out)?;
    Ok(())
}

fn run_markers(args: &MarkersArgs) -> CliResult<()> {
    let dict = dictionary(&args.dictionary)?;
    create_dir(&args.out_dir)?;
    generate_marker_set(&dict, args.count, args.size, &args.out_dir, &args.prefix, &args.ext)?;
    Ok(())
}

fn run_config(out: &Path) -> CliResult<()> {
    SessionConfig::default().write_json(out)?;
    info!("default configuration written to {}", out.display());
    Ok(())
}

fn run_session(args: &SessionArgs) -> CliResult<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_json(path)?,
        None => SessionConfig::default(),
    };
    if let Some(path) = &args.calibration {
        config.calibration_path = path.clone();
    }

    let source = ImageSequenceSource::new(&args.frames);
    let keys = ScriptedKeys::new(&args.keys).paced(args.realtime);
    let sink: Box<dyn FrameSink> = match &args.out {
        Some(dir) => Box::new(DirectorySink::new(dir)?),
        None => Box::new(NullSink),
    };

    let report = Session::new(config, source, sink, keys)?.run(args.mode.into())?;
    println!(
        "frames={} saved={} calibrations={} finish_ignored={} markers={}",
        report.frames_processed,
        report.frames_saved,
        report.calibrations_run,
        report.finish_ignored,
        report.markers_seen
    );
    Ok(())
}
