//! calgen CLI - Command-line interface for calorimeter calibration.
//!
//! Runs the charge-injection measurements over JSON-lines event files and
//! writes the resulting tables as CSV.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use calgen_algorithms::{run_crosstalk, run_intnonlin, RunConfig, RunStatistics};
use calgen_core::{EventSource, SourceError, TestPlan, Timing};
use calgen_io::{load_test_plan, CalibFileWriter, EventFileReader};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    CalgenIo(#[from] calgen_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] calgen_core::Error),
}

/// Offline calibration generator for charge-injection runs.
#[derive(Parser)]
#[command(name = "calgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (per-window debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the measurement subcommands.
#[derive(Args)]
struct RunArgs {
    /// Input event file (JSON lines)
    input: PathBuf,

    /// Test plan JSON file (defaults to the standard charge-injection scan)
    #[arg(short, long)]
    plan: Option<PathBuf>,

    /// Hits expected per tower in every event (defaults per measurement)
    #[arg(long)]
    hits_per_tower: Option<usize>,

    /// Per-event warnings to print before suppressing
    #[arg(long, default_value = "10")]
    warning_budget: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure integral nonlinearity and write raw and smoothed curves
    Intnonlin {
        #[command(flatten)]
        run: RunArgs,

        /// Output prefix; writes <prefix>.raw.csv and <prefix>.spline.csv
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Measure neighbour crosstalk
    Crosstalk {
        #[command(flatten)]
        run: RunArgs,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show information about an event file
    Info {
        /// Input event file
        input: PathBuf,

        /// Test plan to check the file against
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },
}

impl RunArgs {
    fn load_plan(&self) -> Result<TestPlan> {
        Ok(match &self.plan {
            Some(path) => load_test_plan(path)?,
            None => TestPlan::cidac_defaults(),
        })
    }

    fn run_config(&self) -> RunConfig {
        let config = RunConfig::default().with_warning_budget(self.warning_budget);
        match self.hits_per_tower {
            Some(hits) => config.with_hits_per_tower(hits),
            None => config,
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn print_plan(plan: &TestPlan) {
    let timing = match &plan.timing {
        Timing::Uniform => "uniform".to_string(),
        Timing::Grouped(groups) => format!("grouped ({} groups)", groups.len()),
    };
    println!(
        "Plan: {} settings x {} pulses, {}, {} timing",
        plan.settings_count(),
        plan.pulses_per_setting,
        if plan.broadcast {
            "broadcast".to_string()
        } else {
            format!("{} channels", plan.channel_count)
        },
        timing
    );
    println!("Expected events: {}", plan.expected_events());
}

fn print_statistics(stats: &RunStatistics) {
    println!("Events read: {}", stats.events_read);
    println!("Good events: {}", stats.good_events);
    println!(
        "Skipped: {} unreadable, {} setting mismatch, {} malformed layout, {} beyond plan",
        stats.source_errors, stats.setting_mismatches, stats.structural_skips, stats.beyond_plan
    );
    println!(
        "Windows: {} completed, {} points, {} empty",
        stats.windows_completed, stats.points_recorded, stats.empty_windows
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Intnonlin { run, output } => {
            let plan = run.load_plan()?;
            print_plan(&plan);

            let start = Instant::now();
            let mut reader = EventFileReader::open(&run.input)?;
            let out = run_intnonlin(&mut reader, &plan, &run.run_config())?;
            let elapsed = start.elapsed();

            let raw_path = with_suffix(&output, ".raw.csv");
            CalibFileWriter::create(&raw_path)?.write_raw_csv(&out.raw)?;
            let spline_path = with_suffix(&output, ".spline.csv");
            CalibFileWriter::create(&spline_path)?.write_spline_csv(&out.splines)?;

            print_statistics(&out.statistics);
            println!(
                "Channels: {} measured, {} smoothed, {} failed",
                out.raw.populated_channels(),
                out.splines.len(),
                out.smoothing_failures.len()
            );
            println!("Wrote {} and {}", raw_path.display(), spline_path.display());
            println!("Processed in {:.2}s", elapsed.as_secs_f64());
        }

        Commands::Crosstalk { run, output } => {
            let plan = run.load_plan()?;
            print_plan(&plan);

            let start = Instant::now();
            let mut reader = EventFileReader::open(&run.input)?;
            let out = run_crosstalk(&mut reader, &plan, &run.run_config())?;
            let elapsed = start.elapsed();

            CalibFileWriter::create(&output)?.write_crosstalk_csv(&out.table)?;

            print_statistics(&out.statistics);
            println!("Channel pairs: {}", out.table.len());
            println!("Wrote {}", output.display());
            println!("Processed in {:.2}s", elapsed.as_secs_f64());
        }

        Commands::Info { input, plan } => {
            let mut reader = EventFileReader::open(&input)?;
            let count = reader.event_count();

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                reader.file_size(),
                reader.file_size() as f64 / 1_000_000.0
            );
            println!("Records: {}", count);

            let (mut hits, mut missing, mut malformed, mut tagged) = (0usize, 0usize, 0usize, 0);
            for ordinal in 0..count {
                match reader.event(ordinal) {
                    Ok(event) => {
                        hits += event.hits.len();
                        if event.config.is_some() {
                            tagged += 1;
                        }
                    }
                    Err(SourceError::Missing(_)) => missing += 1,
                    Err(err) => {
                        log::debug!("{err}");
                        malformed += 1;
                    }
                }
            }
            println!("Hits: {}", hits);
            println!("Events with pulser config: {}", tagged);
            println!("Missing: {}, malformed: {}", missing, malformed);

            if let Some(path) = plan {
                let plan = load_test_plan(path)?;
                print_plan(&plan);
                match calgen_core::validate_event_count(plan.expected_events(), count) {
                    Ok(()) => println!("Event count within tolerance"),
                    Err(err) => println!("{}", err),
                }
            }
        }
    }

    Ok(())
}
