//! tangram CLI: replay recorded frames through a session and import labels.

use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tangram::convert::write_json;
use tangram::run::{labels_to_frame, run_files};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tangram")]
#[command(about = "Convert tangram piece detections and validate them against a target layout")]
#[command(version)]
struct Cli {
    /// Log at debug level. With the `tracing` feature use `RUST_LOG` instead.
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit JSON log lines (requires the `tracing` feature).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded frame sequence through a puzzle session.
    Run(RunArgs),

    /// Convert a YOLO polygon label file into a sensor frame.
    Labels(LabelsArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Session config (params, targets, calibration file).
    #[arg(long)]
    config: PathBuf,

    /// JSON array of sensor frames.
    #[arg(long)]
    frames: PathBuf,

    /// Where to write the session report (JSON).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct LabelsArgs {
    /// Label file, one `class_id x1 y1 x2 y2 ...` polygon per line.
    #[arg(long)]
    labels: PathBuf,

    /// Image width in pixels.
    #[arg(long)]
    width: u32,

    /// Image height in pixels.
    #[arg(long)]
    height: u32,

    /// Frame timestamp in seconds.
    #[arg(long, default_value_t = 0.0)]
    timestamp: f64,

    /// Where to write the frame (JSON); printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    tangram::core::init_tracing(cli.json_logs);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    tangram::core::init_with_level(level)?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Run(args) => run_session(&args),
        Commands::Labels(args) => run_labels(&args),
    }
}

fn run_session(args: &RunArgs) -> CliResult<()> {
    info!("loading config {}", args.config.display());
    let report = run_files(&args.config, &args.frames)?;

    if let Some(out) = &args.out {
        report.write_json(out)?;
        info!("report written to {}", out.display());
    }
    println!(
        "complete={} validated={}/{}",
        report.complete, report.validated, report.targets
    );
    Ok(())
}

fn run_labels(args: &LabelsArgs) -> CliResult<()> {
    let frame = labels_to_frame(&args.labels, args.width, args.height, args.timestamp)?;
    info!(
        "{} objects read from {}",
        frame.objects.len(),
        args.labels.display()
    );
    match &args.out {
        Some(out) => {
            write_json(&frame, out)?;
            info!("frame written to {}", out.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&frame)?),
    }
    Ok(())
}
