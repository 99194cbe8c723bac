//! CLI Entry Point for rowing_daq
//!
//! Provides command-line access to the acquisition pipeline:
//! - `demo`: run the synthetic source through a recorded session
//! - `simulate`: replay the demo signal as wire frames through the mock link
//! - `decode`: decode one hex-encoded rowing data frame
//! - `connect`: attempt a live connection
//! - `workouts`: list the built-in workouts
//!
//! # Usage
//!
//! ```bash
//! rowing_daq demo --seconds 30 --workout workout-2k
//! rowing_daq decode 0400 30 0a00 e80300
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rowing_daq::config::{Config, DEFAULT_CONFIG_PATH};
use rowing_daq::format;
use rowing_daq::hardware::demo::DemoGenerator;
use rowing_daq::hardware::mock::{MockRower, UnavailableTransport};
use rowing_daq::hardware::RowerTransport;
use rowing_daq::logging;
use rowing_daq::metrics::workout::find_standard;
use rowing_daq::metrics::{standard_workouts, DerivedMetrics, PowerModel};
use rowing_daq::protocol::decode;
use rowing_daq::{Monitor, MonitorUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rowing_daq")]
#[command(about = "Rowing ergometer telemetry: decode, record and derive", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo source through a recorded session
    Demo {
        /// How long to row, in demo seconds
        #[arg(long, default_value = "30")]
        seconds: u64,

        /// Workout id (see `workouts`)
        #[arg(long)]
        workout: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay the demo signal as wire frames through the mock transport
    Simulate {
        /// Number of frames to send
        #[arg(long, default_value = "10")]
        frames: u32,
    },

    /// Decode one rowing data frame given as hex
    Decode {
        /// Hex bytes; whitespace is ignored
        #[arg(required = true, num_args = 1..)]
        hex: Vec<String>,
    },

    /// Attempt a live connection to the rowing machine
    Connect,

    /// List built-in workouts
    Workouts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    logging::init_from_config(&config)?;
    tracing::debug!(application = %config.application.name, "Configuration loaded");

    match cli.command {
        Commands::Demo {
            seconds,
            workout,
            json,
        } => run_demo(&config, seconds, workout.as_deref(), json).await,
        Commands::Simulate { frames } => run_simulation(&config, frames).await,
        Commands::Decode { hex } => decode_hex(&hex.concat()),
        Commands::Connect => run_connect(&config).await,
        Commands::Workouts => list_workouts(),
    }
}

async fn run_demo(config: &Config, seconds: u64, workout: Option<&str>, json: bool) -> Result<()> {
    let mut monitor = Monitor::new(Arc::new(UnavailableTransport), config);
    if let Some(id) = workout {
        let workout = find_standard(id).ok_or_else(|| anyhow!("Unknown workout '{id}'"))?;
        monitor.set_workout(Some(workout));
    }

    monitor.start_demo().await;
    monitor.start_session();

    // One metrics update per demo tick.
    let ticks = seconds.saturating_mul(1000) / config.demo.period_ms;
    let mut received = 0;
    while received < ticks {
        match monitor.next_update().await {
            Some(MonitorUpdate::Metrics { .. }) => {
                received += 1;
                if !json {
                    print_live(&monitor.derived());
                }
            }
            Some(MonitorUpdate::State(state)) => tracing::info!(%state, "State changed"),
            None => break,
        }
    }

    monitor.stop_session();
    monitor.stop_demo().await;

    match monitor.summary() {
        Some(summary) if json => println!("{}", summary.to_json()?),
        Some(summary) => {
            println!();
            println!("Session {}", summary.id);
            println!("  Distance     {}", format::distance(summary.distance));
            println!("  Time         {}", format::duration(summary.elapsed_time));
            println!("  Avg pace     {}", format::pace(summary.average_pace));
            println!("  Avg power    {}", format::watts(summary.average_power));
            println!("  Avg rate     {} spm", format::number(summary.average_stroke_rate, 1));
            println!("  Strokes      {}", format::number(summary.stroke_count, 0));
            println!("  Samples      {}", summary.samples.len());
        }
        None => println!("Nothing was recorded."),
    }
    Ok(())
}

async fn run_simulation(config: &Config, frames: u32) -> Result<()> {
    let rower = MockRower::new();
    let mut monitor = Monitor::new(Arc::new(rower.clone()), config);
    monitor.connect().await?;

    match monitor.next_update().await {
        Some(MonitorUpdate::State(state)) if state.is_live() => println!("{state}"),
        _ => bail!(monitor.last_error().unwrap_or("connection failed").to_string()),
    }
    monitor.start_session();

    let mut generator = DemoGenerator::new(
        Duration::from_millis(config.demo.period_ms),
        PowerModel::new(config.power.watts_constant),
    );
    for _ in 0..frames {
        rower.emit_fields(&generator.next_fields());
        if let Some(MonitorUpdate::Metrics { .. }) = monitor.next_update().await {
            print_live(&monitor.derived());
        }
    }

    monitor.disconnect().await;
    Ok(())
}

fn decode_hex(hex: &str) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let fields = decode(&bytes);
    if fields.is_truncated() {
        eprintln!("warning: frame shorter than its flags announce");
    }
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

async fn run_connect(config: &Config) -> Result<()> {
    let transport = UnavailableTransport;
    let mut monitor = Monitor::new(Arc::new(transport), config);
    tracing::info!(transport = transport.name(), "Attempting live connection");

    if let Err(err) = monitor.connect().await {
        println!("{}", monitor.last_error().unwrap_or_default());
        return Err(err.into());
    }
    // Only reachable with a transport that is actually available.
    if let Some(MonitorUpdate::State(state)) = monitor.next_update().await {
        println!("{state}");
    }
    Ok(())
}

fn list_workouts() -> Result<()> {
    for workout in standard_workouts() {
        let target = match (workout.target_distance(), workout.target_time()) {
            (Some(distance), _) => format::distance(Some(distance)),
            (None, Some(time)) => format::duration(Some(time)),
            (None, None) => format::UNKNOWN.to_string(),
        };
        println!("{:<16} {:<28} {}", workout.id, workout.name, target);
    }
    Ok(())
}

fn print_live(derived: &DerivedMetrics) {
    println!(
        "{:>8}  {:>9}  {:>14}  {:>6}  to go {}",
        format::duration(derived.elapsed_time),
        format::distance(derived.session_distance),
        format::pace(derived.instantaneous_pace),
        format::watts(derived.instantaneous_power),
        format::distance(derived.distance_to_go),
    );
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if !digits.is_ascii() {
        bail!("Hex input must only contain ASCII hex digits");
    }
    if digits.len() % 2 != 0 {
        bail!("Hex input must have an even number of digits");
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair)?;
            u8::from_str_radix(pair, 16).with_context(|| format!("Invalid hex byte '{pair}'"))
        })
        .collect()
}
