//! Contact Planner CLI
//!
//! Loads a TLE catalog, a station file and an optional kernel config, runs
//! one availability-kernel query and prints the result as JSON on stdout.
//!
//! Usage:
//!   contact-planner --tle data/constellation.tle \
//!                   --stations data/stations.json \
//!                   available --node sat_0 --station gatech_atlanta --required-s 300

use anyhow::{Context, Result};
use availability_kernel::{AvailabilityKernel, KernelConfig, Sgp4Geometry};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use ground_stations::StationRegistry;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "contact-planner",
    about = "Plan ground contacts and aggregation rounds for a LEO constellation"
)]
struct Args {
    /// Path to TLE catalog (name, line 1, line 2 per node)
    #[arg(short, long)]
    tle: PathBuf,

    /// Path to stations JSON file (built-in network if omitted)
    #[arg(short, long)]
    stations: Option<PathBuf>,

    /// Path to kernel config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Contact windows for one node and station
    Windows {
        #[arg(long)]
        node: String,
        #[arg(long)]
        station: String,
        /// Window search start (RFC 3339, default now)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
        #[arg(long)]
        min_elevation: Option<f64>,
    },
    /// Straggler check: can the node finish a task before loss of signal?
    Available {
        #[arg(long)]
        node: String,
        #[arg(long)]
        station: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        required_s: i64,
    },
    /// Nodes above the elevation threshold at one instant
    Visible {
        #[arg(long)]
        station: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        min_elevation: Option<f64>,
    },
    /// Inter-node communication graph at one instant
    Graph {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        max_range_km: Option<f64>,
    },
    /// Instants with enough visible nodes to aggregate
    Schedule {
        #[arg(long)]
        station: String,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
        #[arg(long)]
        min_visible: Option<usize>,
        #[arg(long)]
        step_s: Option<i64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let kernel = build_kernel(&args)?;
    let output = run(&kernel, args.command, Utc::now())?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &output)?;
    writeln!(handle)?;

    Ok(())
}

fn build_kernel(args: &Args) -> Result<AvailabilityKernel<Sgp4Geometry>> {
    let config = match &args.config {
        Some(path) => KernelConfig::from_json_file(path)?,
        None => KernelConfig::default(),
    };

    let catalog = orbital_mechanics::load_catalog(&args.tle)?;
    let stations = match &args.stations {
        Some(path) => StationRegistry::load_json(path)?,
        None => StationRegistry::with_default_network(),
    };

    info!(
        "Loaded {} nodes and {} stations",
        catalog.len(),
        stations.len()
    );

    AvailabilityKernel::from_catalog(catalog, stations, config)
        .context("failed to initialise availability kernel")
}

fn run(
    kernel: &AvailabilityKernel<Sgp4Geometry>,
    command: Command,
    now: DateTime<Utc>,
) -> Result<serde_json::Value> {
    let config = kernel.config();

    let value = match command {
        Command::Windows {
            node,
            station,
            start,
            hours,
            min_elevation,
        } => {
            let start = start.unwrap_or(now);
            let end = start
                .checked_add_signed(hours_flag(hours)?)
                .context("--hours runs past the supported time range")?;
            let windows = kernel.get_availability_window(
                &node,
                &station,
                start,
                end,
                min_elevation.unwrap_or(config.min_elevation_deg),
            )?;
            serde_json::to_value(windows)?
        }
        Command::Available {
            node,
            station,
            at,
            required_s,
        } => {
            let decision = kernel.is_client_available(
                &node,
                &station,
                at.unwrap_or(now),
                seconds_flag("--required-s", required_s)?,
            )?;
            serde_json::to_value(decision)?
        }
        Command::Visible {
            station,
            at,
            min_elevation,
        } => {
            let time = at.unwrap_or(now);
            let nodes = kernel.get_visible_nodes(
                &station,
                time,
                min_elevation.unwrap_or(config.min_elevation_deg),
            )?;
            json!({ "time": time, "station_id": station, "node_ids": nodes })
        }
        Command::Graph { at, max_range_km } => {
            let graph = kernel.get_communication_graph(
                at.unwrap_or(now),
                max_range_km.unwrap_or(config.max_range_km),
            )?;
            let components = graph.connected_components();
            json!({ "graph": graph, "components": components })
        }
        Command::Schedule {
            station,
            start,
            hours,
            min_visible,
            step_s,
        } => {
            let step = match step_s {
                Some(s) => seconds_flag("--step-s", s)?,
                None => config.schedule_step(),
            };
            let opportunities = kernel.schedule_aggregation_window(
                &station,
                start.unwrap_or(now),
                hours_flag(hours)?,
                min_visible.unwrap_or(config.min_visible_nodes),
                step,
            )?;
            serde_json::to_value(opportunities)?
        }
    };

    Ok(value)
}

fn hours_flag(hours: i64) -> Result<Duration> {
    Duration::try_hours(hours).with_context(|| format!("--hours {} is out of range", hours))
}

fn seconds_flag(flag: &str, seconds: i64) -> Result<Duration> {
    Duration::try_seconds(seconds).with_context(|| format!("{} {} is out of range", flag, seconds))
}
