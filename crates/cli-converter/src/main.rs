use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use converter::{FfmpegTranscoder, MediaInfoProbe, Runner, Settings};
use log::{debug, info, LevelFilter};

/// Convert a media library to H.264/AAC in MP4
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media directory to scan
    root: Option<PathBuf>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log what would be done without running ffmpeg or touching files
    #[arg(long)]
    dry_run: bool,
}

/// Set up env_logger, writing to the report file when one is configured
fn init_logging(cfg: &Settings, verbose: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info });
    // RUST_LOG still wins when set
    builder.parse_default_env();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            Local::now().format("%m/%d/%Y %I:%M:%S %p"),
            record.level(),
            record.args()
        )
    });

    if let Some(report) = &cfg.report_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report)
            .with_context(|| format!("Failed to open report file: {}", report.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

async fn run(args: Args) -> Result<bool> {
    // Load configuration
    let mut cfg = Settings::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.dry_run {
        cfg.dry_run = true;
    }

    init_logging(&cfg, args.verbose)?;

    info!("Starting Batch Conversion");

    let root = match args.root {
        Some(root) if root.exists() => root,
        _ => {
            debug!("Directory not specified");
            return Ok(true);
        }
    };

    debug!("Temp dir: {}", cfg.tmp_dir.display());
    debug!("Keep original: {} (archive: {})", cfg.keep_original, cfg.archive_dir.display());
    debug!("Dry run: {}", cfg.dry_run);

    let probe = MediaInfoProbe::new(&cfg);
    let transcoder = FfmpegTranscoder::new(&cfg);
    let summary = Runner::new(&cfg, &probe, &transcoder).run(&root).await?;

    Ok(summary.is_clean())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
