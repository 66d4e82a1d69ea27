// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image Sorter: local object-detection photo organizer
//!
//! Command-line front end: picks the folder, runs the sorting loop off the
//! main task and reports one status line per image.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use image_sorter::batch::{run_batch, BatchEvent, RunSummary};
use image_sorter::config::AppConfig;
use image_sorter::detector::{Detector, YoloDetector};
use image_sorter::model::ensure_model;
use image_sorter::scanner::scan_folder;
use image_sorter::Sorter;

/// Image Sorter CLI - sort images into folders by detected objects
#[derive(Parser, Debug)]
#[command(name = "image-sorter")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Sort a folder of images by the objects they contain", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify every image in a folder and move it into a category folder
    Sort {
        /// Folder containing the images
        dir: PathBuf,

        /// Root folder for category subfolders (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum detection confidence (0.0-1.0, overrides config)
        #[arg(long)]
        min_confidence: Option<f32>,

        /// ONNX model file (overrides config)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Do not download the model when it is missing
        #[arg(long)]
        no_fetch: bool,
    },

    /// List the images a sort run would process
    Scan {
        /// Folder to scan
        dir: PathBuf,
    },

    /// Detection model management
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ModelCommands {
    /// Download the model if it is not present
    Fetch,

    /// Show where the model lives and whether it loads
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    match cli.command {
        Commands::Sort { dir, output, min_confidence, model, no_fetch } => {
            let mut config = config;
            if let Some(output) = output {
                config.base_folder = output;
            }
            if let Some(min_confidence) = min_confidence {
                config.min_confidence = min_confidence;
            }
            if let Some(model) = model {
                config.model.path = model;
            }
            config.validate()?;
            run_sort(config, dir, !no_fetch, &cli.format).await
        }
        Commands::Scan { dir } => run_scan(&dir, &cli.format),
        Commands::Model { action } => run_model_command(config, action).await,
        Commands::Config { action } => run_config_command(config, action, &cli.config),
    }
}

/// Load the detector, logging instead of failing so the run can still report
async fn load_detector(config: &AppConfig, fetch: bool) -> Option<Box<dyn Detector>> {
    if fetch {
        if let Err(e) = ensure_model(&config.model).await {
            warn!("Could not fetch model: {}", e);
        }
    }

    let model_config = config.model.clone();
    let loaded = tokio::task::spawn_blocking(move || YoloDetector::load(&model_config)).await;

    match loaded {
        Ok(Ok(detector)) => Some(Box::new(detector) as Box<dyn Detector>),
        Ok(Err(e)) => {
            warn!("Error loading detection model: {}", e);
            None
        }
        Err(e) => {
            warn!("Model loading task failed: {}", e);
            None
        }
    }
}

/// Run the scan-and-sort loop over one folder
async fn run_sort(config: AppConfig, dir: PathBuf, fetch: bool, format: &str) -> anyhow::Result<()> {
    let files = scan_folder(&dir).with_context(|| format!("Failed to read folder {:?}", dir))?;

    if files.is_empty() {
        if format == "text" {
            println!("No images found in {}", dir.display());
        }
        return Ok(());
    }

    info!("Sorting {} images from {:?}", files.len(), dir);

    let detector = load_detector(&config, fetch).await;
    let sorter = Sorter::new(detector, &config);
    if !sorter.has_detector() {
        warn!("No detection model loaded; images will be left in place");
    }
    info!("Output folder: {:?}", sorter.base_folder());

    // Graceful stop between images
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current image...");
            cancel_on_signal.store(true, Ordering::Relaxed);
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = tokio::task::spawn_blocking(move || {
        run_batch(&sorter, &files, &cancel, |event| {
            let _ = tx.send(event);
        })
    });

    let mut results = Vec::new();
    while let Some(event) = rx.recv().await {
        match format {
            "json" => {
                if let BatchEvent::Progress(progress) = event {
                    results.push(progress);
                }
            }
            "jsonl" => println!("{}", serde_json::to_string(&event)?),
            _ => {
                if let BatchEvent::Progress(progress) = &event {
                    println!("{}", progress.status_line());
                }
            }
        }
    }

    let summary = worker.await.context("Sorting task failed")?;

    match format {
        "json" => {
            let output = serde_json::json!({
                "results": results,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "jsonl" => {}
        _ => print_summary(&summary),
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.cancelled {
        println!("Sorting cancelled after {} of {} images.", summary.processed(), summary.total);
    } else if summary.failed == summary.total {
        println!("Sorting failed for every image.");
    } else {
        println!("Sorting complete.");
    }
    println!(
        "  Sorted: {}  Uncategorized: {}  Failed: {}",
        summary.sorted, summary.uncategorized, summary.failed
    );
}

/// List the candidate images in a folder
fn run_scan(dir: &Path, format: &str) -> anyhow::Result<()> {
    let files = scan_folder(dir).with_context(|| format!("Failed to read folder {:?}", dir))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&files)?),
        "jsonl" => {
            for file in &files {
                println!("{}", serde_json::to_string(file)?);
            }
        }
        _ => {
            if files.is_empty() {
                println!("No images found in {}", dir.display());
            } else {
                for file in &files {
                    println!("{}", file.display());
                }
                println!("\n{} images", files.len());
            }
        }
    }

    Ok(())
}

/// Run model commands
async fn run_model_command(config: AppConfig, action: ModelCommands) -> anyhow::Result<()> {
    match action {
        ModelCommands::Fetch => {
            let path = ensure_model(&config.model).await?;
            println!("Model ready at {}", path.display());
        }
        ModelCommands::Status => {
            println!("Model: {}", config.model.path.display());
            match std::fs::metadata(&config.model.path) {
                Ok(meta) => println!("  Size: {} bytes", meta.len()),
                Err(_) => println!("  Not downloaded"),
            }
            println!("  Source: {}", config.model.url.as_deref().unwrap_or("-"));
            println!("  Input size: {}px", config.model.input_size);

            if config.model.path.is_file() {
                let model_config = config.model.clone();
                match tokio::task::spawn_blocking(move || YoloDetector::load(&model_config)).await? {
                    Ok(detector) => println!("  Loads: yes ({} classes)", detector.labels().len()),
                    Err(e) => println!("  Loads: no - {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Base folder: {}", config.base_folder.display());
            println!("  Min confidence: {}", config.min_confidence);
            println!("  Model: {}", config.model.path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_sort_command() {
        let cli = Cli::try_parse_from([
            "image-sorter", "sort", "/tmp/photos", "--output", "out", "--min-confidence", "0.6"
        ]).unwrap();

        match cli.command {
            Commands::Sort { dir, output, min_confidence, no_fetch, .. } => {
                assert_eq!(dir, PathBuf::from("/tmp/photos"));
                assert_eq!(output, Some(PathBuf::from("out")));
                assert_eq!(min_confidence, Some(0.6));
                assert!(!no_fetch);
            }
            _ => panic!("Expected Sort command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "image-sorter", "scan", "/tmp/photos", "--format", "jsonl", "-v"
        ]).unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.format, "jsonl");
        assert!(matches!(cli.command, Commands::Scan { .. }));
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["image-sorter", "scan", ".", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["image-sorter"]).is_err());
    }

    #[test]
    fn test_cli_model_fetch() {
        let cli = Cli::try_parse_from(["image-sorter", "model", "fetch"]).unwrap();
        assert!(matches!(cli.command, Commands::Model { action: ModelCommands::Fetch }));
    }
}
