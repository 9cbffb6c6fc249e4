//! CLI entry point for pixtof.
//!
//! Runs headless acquisitions against the mock detector and streams the
//! pipeline outputs to the terminal. The display and real-hardware layers
//! plug in at the same interfaces (`PipelineEvent`, `EventSource`) used
//! here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixtof::acquisition::{AcquisitionEngine, PipelineEvent, RunParameters};
use pixtof::config::Settings;
use pixtof::data::storage;
use pixtof::driver::mock::MockTimepix;
use pixtof::pipeline::Pipeline;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixtof")]
#[command(about = "Headless Timepix3 time-of-flight acquisition", long_about = None)]
struct Cli {
    /// Configuration name under config/ (defaults to config/default.toml).
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one acquisition against the mock detector.
    Run {
        /// Run duration in seconds (overrides configuration).
        #[arg(long)]
        duration: Option<f64>,

        /// Driver iterations (overrides configuration).
        #[arg(long)]
        iterations: Option<u32>,

        /// Persist raw event arrays for this run.
        #[arg(long)]
        save: bool,

        /// Seed for the mock detector.
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(name) => Settings::new(Some(name))
            .with_context(|| format!("loading configuration '{name}'"))?,
        None => Settings::new(None).unwrap_or_else(|err| {
            eprintln!("no configuration loaded ({err}); using built-in defaults");
            Settings::default()
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::Run {
            duration,
            iterations,
            save,
            seed,
        } => run_acquisition(settings, duration, iterations, save, seed).await,
        Commands::CheckConfig => {
            settings.validate()?;
            println!("configuration ok");
            Ok(())
        }
    }
}

async fn run_acquisition(
    settings: Settings,
    duration: Option<f64>,
    iterations: Option<u32>,
    save: bool,
    seed: u64,
) -> Result<()> {
    let params = RunParameters {
        run_duration: Duration::from_secs_f64(
            duration.unwrap_or(settings.acquisition.run_duration_s),
        ),
        iterations: iterations.unwrap_or(settings.acquisition.iterations),
    };

    let storage_writer = if save || settings.storage.enabled {
        let mut writer = storage::create_writer(&settings.storage)?;
        writer.init(&settings.storage)?;
        Some(writer)
    } else {
        None
    };

    let (tx, mut rx) = mpsc::channel(settings.acquisition.channel_capacity);
    let mut engine = AcquisitionEngine::new();
    engine.start(
        Box::new(MockTimepix::new(seed)),
        Pipeline::new(settings.pipeline.clone()),
        storage_writer,
        params,
        tx,
    )?;

    let mut last_spectrum: Vec<(u64, u64)> = Vec::new();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(PipelineEvent::Progress { status, .. }) => info!("{status}"),
                    Some(PipelineEvent::Frame { image, centroid }) => match centroid {
                        Some(c) => info!(
                            row = c.row,
                            col = c.col,
                            peak = image.display_max(Some(c), 15),
                            "fiducial located"
                        ),
                        None => warn!("no fiducial this buffer; frame intensity {}", image.total()),
                    },
                    Some(PipelineEvent::Spectrum { bins }) => {
                        last_spectrum = bins;
                    }
                    Some(PipelineEvent::Fault { message }) => {
                        anyhow::bail!("acquisition fault: {message}");
                    }
                    Some(PipelineEvent::Finished { buffers }) => {
                        info!(buffers, "run finished");
                        break;
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received; stopping after in-flight buffer");
                engine.stop();
            }
        }
    }
    engine.wait();

    if last_spectrum.is_empty() {
        println!("no spectrum accumulated");
    } else {
        let total: u64 = last_spectrum.iter().map(|&(_, c)| c).sum();
        println!(
            "spectrum: {} bins, {} counts, range [{}, {}] ns",
            last_spectrum.len(),
            total,
            last_spectrum.first().map_or(0, |&(t, _)| t),
            last_spectrum.last().map_or(0, |&(t, _)| t),
        );
        let mut top: Vec<(u64, u64)> = last_spectrum.clone();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        for (t, c) in top.into_iter().take(5) {
            println!("  {t:>8} ns  {c} counts");
        }
    }
    Ok(())
}
