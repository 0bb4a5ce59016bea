use clap::{Args, Parser, Subcommand};
use image_toolbox::config::{self, ToolboxConfig};
use image_toolbox::filters::Filter;
use image_toolbox::holder::{Pipeline, ScreenState, Services, StateHolder};
use image_toolbox::imaging::rust_backend::is_supported_input;
use image_toolbox::imaging::{ImageFormat, Orientation, Position, Quality, ResizeMode};
use image_toolbox::output;
use image_toolbox::screens::checksum::ChecksumScreen;
use image_toolbox::screens::stitching::StitchingScreen;
use image_toolbox::screens::svg::{SvgParams, SvgPreset, SvgScreen};
use image_toolbox::screens::zip::ZipScreen;
use image_toolbox::screens::{ConversionParams, EditParams, HashAlgorithm};
use image_toolbox::screens::{conversion, single_edit, watermarking};
use image_toolbox::stitch::StitchParams;
use image_toolbox::types::{BatchProgress, InputRef};
use image_toolbox::watermark::{Placement, WatermarkKind, WatermarkParams};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "image-toolbox")]
#[command(about = "Batch image tools: watermark, convert, edit, stitch, zip, checksum")]
#[command(long_about = "\
Batch image tools: watermark, convert, edit, stitch, zip, checksum

Every command takes files and/or directories. Directories are walked
recursively; for image commands only supported image files are picked up.
Each input is processed on its own: a file that fails is reported and the
rest of the batch carries on.

Output names follow {prefix}{input stem}{suffix}[_NNN].{ext} as set in the
[saving] section of toolbox.toml.

Run 'image-toolbox gen-config' to generate a documented toolbox.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./toolbox.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Save into this directory instead of the configured one
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Write a JSON report of the run to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by commands that encode images.
#[derive(Args, Clone)]
struct EncodeArgs {
    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output format (jpeg, png, webp, avif, qoi, bmp, tiff)
    #[arg(long)]
    format: Option<ImageFormat>,

    /// Lossy encoding quality (1-100)
    #[arg(long)]
    quality: Option<u32>,

    /// Copy EXIF metadata from JPEG sources into JPEG outputs
    #[arg(long)]
    keep_metadata: bool,

    /// Parameters as a TOML file (flags below override it)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Publish to the share outbox instead of saving
    #[arg(long)]
    share: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Stamp every input with an image or colour block
    Watermark {
        #[command(flatten)]
        encode: EncodeArgs,
        /// Stamp image (default: a white block)
        #[arg(long)]
        image: Option<PathBuf>,
        /// Anchor position, e.g. bottom-right
        #[arg(long, value_parser = parse_serde::<Position>)]
        position: Option<Position>,
        /// Repeat the watermark across the whole image
        #[arg(long, conflicts_with = "position")]
        tiled: bool,
        /// Watermark width as a fraction of the shorter edge
        #[arg(long)]
        scale: Option<f32>,
        /// Opacity, 0.0-1.0
        #[arg(long)]
        alpha: Option<f32>,
    },
    /// Re-encode every input, optionally resizing
    Convert {
        #[command(flatten)]
        encode: EncodeArgs,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// exact, fit or fill
        #[arg(long, value_parser = parse_serde::<ResizeMode>)]
        mode: Option<ResizeMode>,
    },
    /// Apply a filter chain to every input
    Edit {
        #[command(flatten)]
        encode: EncodeArgs,
        /// Filter as kind or kind=value, e.g. blur=2.5 (repeatable, applied in order)
        #[arg(long = "filter")]
        filters: Vec<Filter>,
    },
    /// Join all inputs into one image
    Stitch {
        /// Input files or directories, in stitch order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        format: Option<ImageFormat>,
        #[arg(long)]
        quality: Option<u32>,
        /// Stack vertically instead of side by side
        #[arg(long)]
        vertical: bool,
        /// Gap between images in pixels
        #[arg(long, default_value_t = 0)]
        spacing: u32,
    },
    /// Trace every input into an SVG file
    Svg {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Tracer preset: bw, poster or photo
        #[arg(long, value_parser = parse_serde::<SvgPreset>)]
        preset: Option<SvgPreset>,
        /// Reduce inputs to this longer edge before tracing
        #[arg(long)]
        max_edge: Option<u32>,
        /// Parameters as a TOML file (flags above override it)
        #[arg(long)]
        params: Option<PathBuf>,
        /// Publish to the share outbox instead of saving
        #[arg(long)]
        share: bool,
    },
    /// Pack all inputs into a zip archive
    Zip {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print checksums of all inputs
    Checksum {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// sha224, sha256, sha384 or sha512
        #[arg(long, default_value = "sha256")]
        algorithm: HashAlgorithm,
        /// Digest to compare every input against
        #[arg(long)]
        expected: Option<String>,
    },
    /// Print a stock toolbox.toml with all options documented
    GenConfig,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(Path::new("."))?,
    };
    if let Some(dir) = &cli.output {
        config.saving.directory = dir.clone();
    }
    init_thread_pool(&config.processing);

    let report = match cli.command {
        Command::Watermark {
            encode,
            image,
            position,
            tiled,
            scale,
            alpha,
        } => {
            let mut params: WatermarkParams = load_params(encode.params.as_deref())?;
            if let Some(path) = image {
                params.kind = WatermarkKind::Image { path };
            }
            if let Some(position) = position {
                params.placement = Placement::Anchored(position);
            }
            if tiled {
                params.placement = Placement::Tiled;
            }
            if let Some(scale) = scale {
                params.scale = scale;
            }
            if let Some(alpha) = alpha {
                params.alpha = alpha;
            }
            let config = apply_encode_args(config, &encode);
            let screen = watermarking::screen(Services::from_config(&config), &config);
            run_item_screen(&screen, &encode, params)?
        }
        Command::Convert {
            encode,
            width,
            height,
            mode,
        } => {
            let mut params: ConversionParams = load_params(encode.params.as_deref())?;
            params.width = width.or(params.width);
            params.height = height.or(params.height);
            if let Some(mode) = mode {
                params.mode = mode;
            }
            let config = apply_encode_args(config, &encode);
            let screen = conversion::screen(Services::from_config(&config), &config);
            run_item_screen(&screen, &encode, params)?
        }
        Command::Edit { encode, filters } => {
            let mut params: EditParams = load_params(encode.params.as_deref())?;
            params.filters.extend(filters);
            let config = apply_encode_args(config, &encode);
            let screen = single_edit::screen(Services::from_config(&config), &config);
            run_item_screen(&screen, &encode, params)?
        }
        Command::Stitch {
            inputs,
            format,
            quality,
            vertical,
            spacing,
        } => {
            if let Some(format) = format {
                config.output.format = format;
            }
            if let Some(quality) = quality {
                config.output.quality = Quality::new(quality);
            }
            let inputs = expand_inputs(&inputs, true);
            let screen = StitchingScreen::new(Services::from_config(&config), &config);
            screen.set_inputs(inputs.clone());
            screen.set_params(StitchParams {
                orientation: if vertical {
                    Orientation::Vertical
                } else {
                    Orientation::Horizontal
                },
                spacing,
                ..StitchParams::default()
            })?;
            spawn_progress_printer("stitching", screen.subscribe(), |s| s.activity.progress);
            let (tx, rx) = mpsc::channel();
            if !screen.run_batch(None, move |r| {
                let _ = tx.send(r);
            }) {
                return Err("no image inputs found".into());
            }
            let result = rx.recv()?;
            screen.wait();
            output::print_stitch_report(&inputs, &result);
            output::save_report_json("stitching", &inputs, &result)
        }
        Command::Svg {
            inputs,
            preset,
            max_edge,
            params,
            share,
        } => {
            let mut svg_params: SvgParams = load_params(params.as_deref())?;
            if let Some(preset) = preset {
                svg_params.preset = preset;
            }
            if max_edge.is_some() {
                svg_params.max_edge = max_edge;
            }
            let inputs = expand_inputs(&inputs, true);
            let screen = SvgScreen::new(Services::from_config(&config));
            screen.set_inputs(inputs.clone());
            screen.set_params(svg_params)?;
            spawn_progress_printer("svg", screen.subscribe(), |s| s.activity.progress);

            if share {
                let (tx, rx) = mpsc::channel();
                if !screen.share(move |shared| {
                    let _ = tx.send(shared);
                }) {
                    return Err("no image inputs found".into());
                }
                let shared = rx.recv()?;
                screen.wait();
                for line in output::format_shared(&shared) {
                    println!("{}", line);
                }
                serde_json::json!({ "screen": "svg", "shared": shared })
            } else {
                let (tx, rx) = mpsc::channel();
                if !screen.run_batch(None, move |r| {
                    let _ = tx.send(r);
                }) {
                    return Err("no image inputs found".into());
                }
                let report = rx.recv()?;
                screen.wait();
                output::print_save_report(&inputs, &report);
                output::save_report_json("svg", &inputs, &report)
            }
        }
        Command::Zip { inputs } => {
            let inputs = expand_inputs(&inputs, false);
            let screen = ZipScreen::new(Services::from_config(&config), &config);
            screen.set_inputs(inputs.clone());
            spawn_progress_printer("zip", screen.subscribe(), |s| s.activity.progress);
            let (tx, rx) = mpsc::channel();
            if !screen.run_batch(None, move |r| {
                let _ = tx.send(r);
            }) {
                return Err("no inputs found".into());
            }
            let result = rx.recv()?;
            screen.wait();
            output::print_archive_report(&inputs, &result);
            output::archive_report_json(&inputs, &result)
        }
        Command::Checksum {
            inputs,
            algorithm,
            expected,
        } => {
            let inputs = expand_inputs(&inputs, false);
            let screen = ChecksumScreen::new();
            screen.set_inputs(inputs.clone());
            screen.set_algorithm(algorithm);
            screen.set_expected(expected.as_deref());
            let (tx, rx) = mpsc::channel();
            if !screen.run_batch(move |r| {
                let _ = tx.send(r);
            }) {
                return Err("no inputs found".into());
            }
            let result = rx.recv()?;
            screen.wait();
            output::print_checksum_report(&inputs, algorithm, &result);
            output::checksum_report_json(&inputs, algorithm, &result)
        }
        Command::GenConfig => return Ok(()),
    };

    if let Some(path) = cli.report {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}

/// Run a per-item screen to completion: save (or share) every input,
/// print per-item lines, and return the JSON report.
fn run_item_screen<P: Pipeline>(
    screen: &StateHolder<P>,
    args: &EncodeArgs,
    params: P::Params,
) -> CliResult<serde_json::Value> {
    let inputs = expand_inputs(&args.inputs, true);
    screen.set_inputs(inputs.clone());
    screen.set_params(params)?;
    spawn_progress_printer(P::NAME, screen.subscribe(), ScreenState::progress);

    if args.share {
        let (tx, rx) = mpsc::channel();
        if !screen.share(move |shared| {
            let _ = tx.send(shared);
        }) {
            return Err("no image inputs found".into());
        }
        let shared = rx.recv()?;
        screen.wait();
        for line in output::format_shared(&shared) {
            println!("{}", line);
        }
        return Ok(serde_json::json!({ "screen": P::NAME, "shared": shared }));
    }

    let (tx, rx) = mpsc::channel();
    if !screen.run_batch(None, move |r| {
        let _ = tx.send(r);
    }) {
        return Err("no image inputs found".into());
    }
    let report = rx.recv()?;
    screen.wait();
    output::print_save_report(&inputs, &report);
    Ok(output::save_report_json(P::NAME, &inputs, &report))
}

fn apply_encode_args(mut config: ToolboxConfig, args: &EncodeArgs) -> ToolboxConfig {
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(quality) = args.quality {
        config.output.quality = Quality::new(quality);
    }
    if args.keep_metadata {
        config.output.keep_metadata = true;
    }
    config
}

/// Read screen parameters from a TOML file, or defaults without one.
fn load_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> CliResult<T> {
    match path {
        Some(path) => Ok(toml::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(T::default()),
    }
}

/// Parse a CLI value through the type's serde representation.
fn parse_serde<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

/// Expand directories into their files (sorted, recursive). With
/// `images_only`, files from directories are limited to supported image
/// types; explicitly named files are always kept.
fn expand_inputs(paths: &[PathBuf], images_only: bool) -> Vec<InputRef> {
    let mut inputs = Vec::new();
    for path in paths {
        if !path.is_dir() {
            inputs.push(InputRef::new(path.clone()));
            continue;
        }
        let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| !images_only || is_supported_input(p))
            .collect();
        found.sort();
        inputs.extend(found.into_iter().map(InputRef::new));
    }
    inputs
}

/// Print progress lines to stderr as a screen's state changes. The thread
/// lives until the process exits.
fn spawn_progress_printer<S: Send + 'static>(
    name: &'static str,
    rx: Receiver<S>,
    progress: fn(&S) -> BatchProgress,
) {
    std::thread::spawn(move || {
        let mut last = None;
        for state in rx {
            let line = output::format_progress(name, &progress(&state));
            if line.is_some() && line != last {
                if let Some(text) = &line {
                    eprintln!("{}", text);
                }
                last = line;
            }
        }
    });
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("image_toolbox=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
