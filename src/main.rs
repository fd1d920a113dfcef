//! Kosei - LLM-backed subtitle correction
//!
//! Command line entry point: loads configuration, wires the correction
//! workflow and dispatches subcommands.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use kosei::cli::{Args, Commands};
use kosei::config::Config;
use kosei::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Correct {
            input,
            output,
            reference,
            model,
        } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            let workflow = Workflow::new(config)?;
            workflow
                .correct_file(&input, output, reference.as_deref())
                .await?;
        }
        Commands::Batch {
            input_dir,
            output_dir,
            reference,
            model,
        } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            let workflow = Workflow::new(config)?;
            workflow
                .correct_directory(&input_dir, output_dir.as_deref(), reference.as_deref())
                .await?;
        }
        Commands::Convert { input, output } => {
            let workflow = Workflow::new(config)?;
            workflow.convert(&input, &output).await?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let kosei_dir = std::env::current_dir()?.join(".kosei");
    let log_dir = kosei_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "kosei.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("kosei.log").display()
    );

    Ok(())
}
