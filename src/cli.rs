//! Command-line interface for trackscan.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::{self, Config, STARTER_CONFIG};
use crate::orchestrator::{self, ScanOptions};
use crate::report::{self, Format};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TRACKSCAN_LOG";

/// Catalogue analytics tracking calls in a source tree.
///
/// Finds every call that fires an analytics event (Segment, Mixpanel,
/// Amplitude, PostHog, Snowplow, ... or your own wrappers) in JavaScript,
/// TypeScript, Python, Ruby and Go, and reports each event's properties and
/// call sites.
#[derive(Parser)]
#[command(name = "trackscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a file or directory for tracking calls
    Scan(ScanArgs),
    /// Write a starter trackscan.yaml
    Init(InitArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Path to scan (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover in the scan root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Custom tracking function signature, e.g. "track(userId, EVENT_NAME, PROPERTIES)"
    #[arg(long = "custom-function", value_name = "SIG")]
    pub custom_functions: Vec<String>,

    /// Glob of files or directories to skip
    #[arg(long, value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
    pub format: Format,

    /// Maximum files analyzed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Show a progress bar on stderr
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "trackscan.yaml")]
    pub output: PathBuf,
}

/// Install the stderr log subscriber. `TRACKSCAN_LOG` wins over `-v`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(args: &ScanArgs, scan_dir: &Path) -> anyhow::Result<Config> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => Config::discover(scan_dir),
    };
    let config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "using config");
            Config::parse_file(&path)?
        }
        None => Config::default(),
    };
    let config = config.merge_cli(&args.custom_functions, &args.ignore, args.concurrency);
    config::validate(&config)?;
    Ok(config)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    let abs_path = match args.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };
    let scan_dir = if abs_path.is_file() {
        abs_path.parent().unwrap_or(&abs_path).to_path_buf()
    } else {
        abs_path.clone()
    };

    let config = match load_config(args, &scan_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let progress = args.progress.then(progress_bar);
    let options = ScanOptions {
        custom_functions: config.custom_functions,
        ignore: config.ignore,
        concurrency: config.concurrency,
        progress: progress.clone(),
    };

    let outcome = orchestrator::scan_blocking(&abs_path, &options);
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    let outcome = outcome?;

    match args.format {
        Format::Json => println!("{}", report::render_json(&outcome.events)?),
        Format::Yaml => print!("{}", report::render_yaml(&outcome.events)?),
        Format::Pretty => {
            report::write_pretty(&args.path.to_string_lossy(), &outcome);
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, STARTER_CONFIG) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Add your tracking wrappers under custom_functions");
    println!("  2. Run: trackscan scan . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}
