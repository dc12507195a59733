//! RV-C Bridge CLI Application
//!
//! This is the command-line front end for the rvc-codec library. It adds:
//! - TOML configuration (spec file, topics, CAN addressing)
//! - Line adapters standing in for the CAN socket and the broker client
//! - Parallel batch decoding of capture files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rvc_codec::{Codec, Publication};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod bridge;
mod config;
mod publish;

use bridge::Bridge;
use config::AppConfig;
use publish::{LinePublisher, Publisher};

/// RV-C Bridge - translate between RV-C CAN traffic and pub/sub records
#[derive(Parser, Debug)]
#[command(name = "rvc-bridge")]
#[command(about = "Decode RV-C CAN traffic into records and encode commands into frames", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the specification document (default: bundled)
    #[arg(short, long, value_name = "FILE", global = true)]
    spec: Option<PathBuf>,

    /// Path to configuration file (bridge.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode one payload and print the record
    Decode {
        /// DGN as 5 hex digits (e.g. 1FEDA)
        dgn: String,
        /// Payload as hex (zero-padded to 8 bytes)
        data: String,
    },

    /// Encode named values into a frame in cansend syntax
    Encode {
        /// Display name (e.g. DC_DIMMER_COMMAND_2) or DGN
        name: String,
        /// Field values as a JSON object
        #[arg(default_value = "{}")]
        fields: String,
    },

    /// Read capture lines and publish decoded and composite records
    Run {
        /// Capture file (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output file for publications (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Read `<NAME> <json>` command lines and print frames
    Command {
        /// Command file (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Decode several capture files in parallel and summarize them
    Batch {
        /// Capture files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show statistics about the loaded specification
    Info,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("RV-C Bridge v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using codec library v{}", rvc_codec::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let codec = Arc::new(load_codec(&args, &app_config)?);

    match &args.command {
        Commands::Decode { dgn, data } => decode_mode(&codec, &app_config, dgn, data),
        Commands::Encode { name, fields } => {
            let bridge = Bridge::new(codec, app_config.bridge_config(), app_config.can.clone());
            let frame = bridge.process_command(&format!("{} {}", name, fields))?;
            println!("{}", frame.to_cansend());
            Ok(())
        }
        Commands::Run { input, output } => run_mode(codec, &app_config, input.as_deref(), output.as_deref()),
        Commands::Command { input } => command_mode(codec, &app_config, input.as_deref()),
        Commands::Batch { files } => batch_mode(&codec, files),
        Commands::Info => {
            let stats = codec.stats();
            println!("Specification:");
            println!("  Decoders:  {}", stats.num_definitions);
            println!("  Fields:    {}", stats.num_fields);
            println!("  Ranges:    {}", stats.num_ranges);
            println!("  Pending:   {}", stats.num_pending);
            println!("  Overrides: {}", codec.overrides().len());
            Ok(())
        }
    }
}

/// Load the specification named on the command line, in the config, or bundled
fn load_codec(args: &Args, app_config: &AppConfig) -> Result<Codec> {
    let spec_path = args.spec.as_ref().or(app_config.spec.file.as_ref());

    let codec = match spec_path {
        Some(path) => Codec::from_spec_file(path)
            .with_context(|| format!("Failed to load specification: {:?}", path))?,
        None => Codec::bundled().context("Bundled specification is invalid")?,
    };

    let stats = codec.stats();
    log::info!(
        "Specification loaded: {} decoders, {} fields",
        stats.num_definitions,
        stats.num_fields
    );
    Ok(codec.with_fahrenheit(app_config.spec.fahrenheit))
}

/// Decode a single payload and print it as a publication line
fn decode_mode(codec: &Codec, app_config: &AppConfig, dgn: &str, data: &str) -> Result<()> {
    let record = codec
        .decode_hex(dgn, data)
        .with_context(|| format!("Cannot decode {} {}", dgn, data))?;
    let topic = app_config.bridge_config().record_topic(&record);

    let mut publisher = LinePublisher::new(io::stdout().lock());
    publisher.publish(&Publication::new(topic, record, false))
}

/// Stream capture lines through the bridge
fn run_mode(
    codec: Arc<Codec>,
    app_config: &AppConfig,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let bridge = Bridge::new(codec, app_config.bridge_config(), app_config.can.clone());
    let reader = open_input(input)?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut publisher = LinePublisher::new(writer);

    let stats = bridge.run(reader, &mut publisher)?;
    if stats.errors > 0 {
        log::warn!("{} capture lines could not be parsed", stats.errors);
    }
    Ok(())
}

/// Encode command lines into frames, one cansend line each
fn command_mode(codec: Arc<Codec>, app_config: &AppConfig, input: Option<&Path>) -> Result<()> {
    let bridge = Bridge::new(codec, app_config.bridge_config(), app_config.can.clone());
    let reader = open_input(input)?;
    let mut stdout = io::stdout().lock();

    for line in reader.lines() {
        let line = line.context("Failed to read command input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match bridge.process_command(trimmed) {
            Ok(frame) => writeln!(stdout, "{}", frame.to_cansend())?,
            Err(e) => log::warn!("Dropping command {:?}: {:#}", trimmed, e),
        }
    }
    Ok(())
}

/// Per-file counters from batch decoding
#[derive(Debug, Default)]
struct FileSummary {
    frames: usize,
    unknown: usize,
    errors: usize,
}

/// Decode capture files in parallel with one shared codec
fn batch_mode(codec: &Codec, files: &[PathBuf]) -> Result<()> {
    let summaries: Vec<(PathBuf, Result<FileSummary>)> = files
        .par_iter()
        .map(|path| (path.clone(), summarize_file(codec, path)))
        .collect();

    let mut failed = 0;
    for (path, summary) in summaries {
        match summary {
            Ok(summary) => println!(
                "{}: {} frames, {} unknown DGNs, {} bad lines",
                path.display(),
                summary.frames,
                summary.unknown,
                summary.errors
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {:#}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files could not be decoded", failed, files.len());
    }
    Ok(())
}

fn summarize_file(codec: &Codec, path: &Path) -> Result<FileSummary> {
    let mut summary = FileSummary::default();
    for decoded in codec.decode_file(path)? {
        match decoded {
            Ok(decoded) => {
                summary.frames += 1;
                if codec.table().resolve(decoded.frame.id.dgn).is_none() {
                    summary.unknown += 1;
                }
            }
            Err(rvc_codec::CodecError::IoError(e)) => return Err(e.into()),
            Err(e) => {
                log::debug!("{}: {}", path.display(), e);
                summary.errors += 1;
            }
        }
    }
    Ok(summary)
}

fn open_input(input: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open input: {:?}", path))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
