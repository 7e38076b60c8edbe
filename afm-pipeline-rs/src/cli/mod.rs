//! Command-line interface for the AFM analysis pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::AnalysisConfig;

#[derive(Parser)]
#[command(name = "afm-pipeline")]
#[command(about = "Batch analysis of AFM force-indentation curves", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit every force file under a directory and write the summary CSV
    Analyze {
        /// Directory to walk for force files
        directory: PathBuf,
        /// Summary CSV path (defaults to <directory>/<summary_file_name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Curve analysed in each file
        #[arg(long)]
        curve_index: Option<usize>,
        /// Skip per-curve and per-folder plots
        #[arg(long)]
        no_plots: bool,
    },

    /// Print the metadata of a force file
    Inspect {
        /// JPK force, force map or QI file
        file: PathBuf,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Output YAML path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar counting processed files
fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match AnalysisConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                AnalysisConfig::default()
            }
        },
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Commands::Analyze { directory, output, curve_index, no_plots } => {
            cmd_analyze(&directory, output, curve_index, no_plots, config);
        }
        Commands::Inspect { file } => {
            cmd_inspect(&file);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path, &config);
        }
    }
}

fn cmd_analyze(
    directory: &PathBuf,
    output: Option<PathBuf>,
    curve_index: Option<usize>,
    no_plots: bool,
    mut config: AnalysisConfig,
) {
    use crate::core::writers::{self, SummaryRow};
    use crate::processors::batch;

    let start = Instant::now();

    if let Some(index) = curve_index {
        config.processing.curve_index = index;
    }
    if no_plots {
        config.output.curve_plots = false;
        config.output.folder_plots = false;
    }
    let summary_path = output.unwrap_or_else(|| directory.join(&config.output.summary_file_name));

    println!("Analyzing force curves...");
    println!("Input directory: {}", directory.display());
    println!("Summary CSV: {}", summary_path.display());
    println!("Contact model: {:?}", config.fit.contact_model);
    println!("Curve index: {}", config.processing.curve_index);

    let progress = create_progress_bar("Fitting curves");

    let report = match batch::run_batch(directory, &config, Some(&progress)) {
        Ok(report) => {
            progress.finish_and_clear();
            report
        }
        Err(e) => {
            progress.finish_and_clear();
            error!("Analysis failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let rows: Vec<SummaryRow> = report.analyses.iter().map(|a| a.summary_row()).collect();
    if let Err(e) = writers::write_summary_csv(&summary_path, &rows) {
        error!("Failed to write summary: {}", e);
        std::process::exit(1);
    }

    for (path, reason) in &report.failures {
        println!("Skipped {}: {}", path.display(), reason);
    }

    print_summary(
        "Analysis Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Summary CSV", summary_path.display().to_string()),
            ("Folders", report.folders.to_string()),
            ("Curves analyzed", report.analyses.len().to_string()),
            ("Failures", report.failures.len().to_string()),
            ("Plots", (!no_plots).to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_inspect(file: &PathBuf) {
    use crate::core::loaders;

    let start = Instant::now();
    let spinner = create_spinner("Reading file headers...");

    let archive = match loaders::load_file(file) {
        Ok(archive) => archive,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load {}: {}", file.display(), e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    let meta = archive.metadata();
    print_summary(
        "File Metadata",
        &[
            ("File", meta.file_name.clone()),
            ("Type", meta.file_type.as_str().to_string()),
            ("Closed loop", meta.closed_loop.to_string()),
            ("Height channel", meta.height_channel_key.clone()),
            ("Defl. sens. [m/V]", format!("{:.4e}", meta.defl_sens_m_by_v())),
            ("Spring const [N/m]", format!("{:.4}", meta.spring_const_n_by_m)),
            ("Curves", meta.curve_count.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_init_config(path: &PathBuf, config: &AnalysisConfig) {
    match config.to_yaml(path) {
        Ok(()) => {
            print_summary(
                "Configuration Written",
                &[
                    ("Path", path.display().to_string()),
                    ("Contact model", format!("{:?}", config.fit.contact_model)),
                    ("Summary file", config.output.summary_file_name.clone()),
                ],
            );
        }
        Err(e) => {
            error!("Failed to write config to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
