//! pashto-dub - Automated Pashto dubbing workflow
//!
//! Entry point: parses arguments, sets up logging, loads the configuration
//! and dispatches to the workflow.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pashto_dub::cli::{Args, Commands, PipelineOverrides};
use pashto_dub::config::Config;
use pashto_dub::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;
    info!("Starting pashto-dub");

    let mut config = load_config(&args)?;

    // Ctrl-C cancels the running job between or during stages
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Commands::Extract { input, output } => {
            let workflow = Workflow::new(config)?;
            workflow.extract_audio(&input, &output, &cancel).await?;
            println!("Audio extracted to {}", output.display());
        }
        Commands::Gate { video, audio } => {
            let workflow = Workflow::new(config)?;
            let decision = workflow.evaluate_gate(&video, &audio, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Process { input, overrides } => {
            let workflow = prepare(&mut config, &overrides, !args.no_progress, &cancel).await?;
            let report = workflow.process_single_file(&input, &cancel).await?;
            if let Some(video) = &report.artifacts.video {
                println!("Final video: {}", video.display());
            }
            println!("Job folder: {}", report.output_dir.display());
            workflow.shutdown();
        }
        Commands::Batch { input_dir, overrides } => {
            let workflow = prepare(&mut config, &overrides, !args.no_progress, &cancel).await?;
            let summary = workflow.process_directory(&input_dir, &cancel).await?;
            println!(
                "Batch finished: {} succeeded, {} failed",
                summary.succeeded.len(),
                summary.failed.len()
            );
            for (path, reason) in &summary.failed {
                println!("  FAILED {}: {}", path.display(), reason);
            }
            workflow.shutdown();
        }
    }

    Ok(())
}

async fn prepare(
    config: &mut Config,
    overrides: &PipelineOverrides,
    show_progress: bool,
    cancel: &CancellationToken,
) -> Result<Workflow> {
    overrides.apply(config)?;
    let workflow = Workflow::new(config.clone())?.with_progress(show_progress);
    workflow.init(cancel).await?;
    Ok(workflow)
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".pashto-dub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "pashto-dub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("pashto-dub.log").display()
    );
    Ok(())
}
