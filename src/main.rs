//! CLI entry point for sensor-link
//!
//! Provides:
//! - `simulate`: run a controller and a synthetic responder over an
//!   in-memory link, printing each sample and batch report
//! - `filter`: apply the moving-average filter to a list of values in one pass
//!
//! # Usage
//!
//! ```bash
//! sensor-link simulate --iterations 25
//! sensor-link simulate --config config/sensor_link.toml --json
//! sensor-link filter --window 3 6 6 6 12
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_link::config::LinkConfig;
use sensor_link::filter::FilterWindow;
use sensor_link::history::History;
use sensor_link::logging;
use sensor_link::session::Session;
use sensor_link::sink::LinkEvent;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "sensor-link")]
#[command(about = "Request/response sensor link with moving-average filtering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a controller against a simulated responder
    Simulate {
        /// Configuration file (defaults to config/sensor_link.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many samples; runs until Ctrl-C if omitted
        #[arg(long)]
        iterations: Option<u64>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Filter a series of values with the moving average
    Filter {
        /// Window width
        #[arg(long, default_value_t = sensor_link::filter::DEFAULT_WIDTH)]
        window: usize,

        /// Values to filter, in order
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            iterations,
            json,
        } => simulate(config, iterations, json).await,
        Commands::Filter { window, values } => filter(window, values),
    }
}

async fn simulate(config_path: Option<PathBuf>, iterations: Option<u64>, json: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => LinkConfig::load_from(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LinkConfig::load().context("Failed to load config")?,
    };
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let session = Session::spawn(&config)?;
    let mut events = session.subscribe();
    let stop = session.shutdown_signal();
    let mut samples = 0u64;

    let interrupt = session.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            interrupt.trigger();
        }
    });

    loop {
        if iterations.is_some_and(|limit| samples >= limit) {
            break;
        }

        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event, LinkEvent::Sample(_)) {
                        samples += 1;
                    }
                    print_event(&event, json)?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = stop.wait() => break,
        }
    }

    let summary = session.stop().await?;
    println!();
    println!("sensor id: {}", summary.sensor_id);
    println!("samples:   {}", summary.samples);
    match summary.stats {
        Some(stats) => println!("max/min:   {:.3} / {:.3}", stats.max, stats.min),
        None => println!("max/min:   n/a"),
    }
    Ok(())
}

fn print_event(event: &LinkEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        LinkEvent::Sample(sample) => {
            let flag = if sample.over_limit { "  (over limit)" } else { "" };
            println!(
                "#{:<5} raw {:>4}  filtered {:>8.3}{}",
                sample.index, sample.raw, sample.filtered, flag
            );
        }
        LinkEvent::Report(report) => {
            println!(
                "-- after {} samples: max {:.3}, min {:.3}",
                report.samples, report.stats.max, report.stats.min
            );
        }
    }
    Ok(())
}

fn filter(width: usize, mut values: Vec<f64>) -> Result<()> {
    let mut window = FilterWindow::new(width)?;
    window.filter_in_place(&mut values);

    let mut history = History::new();
    for value in &values {
        println!("{value:.3}");
        history.push(*value);
    }

    let stats = history.stats()?;
    println!("max {:.3}, min {:.3}", stats.max, stats.min);
    Ok(())
}
