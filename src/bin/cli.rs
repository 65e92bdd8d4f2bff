//! fleetwatch CLI
//!
//! Local execution entry point for the leg and fault monitors.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use fleetwatch::{
    config::load_all,
    error::Result,
    models::LegRow,
    pipeline::{self, FeedSelection, StatusMonitor, leg_status::{LegStatusData, LegStatusMonitor}},
    services::{AnomalyDetector, Fetcher, FileFetcher, FlightLifecycleTracker},
    utils::{
        log,
        time::{Clock, SystemClock},
    },
};
use tokio::sync::watch;

/// fleetwatch - flight leg and fault monitor
#[derive(Parser, Debug)]
#[command(name = "fleetwatch", version, about = "Flight leg and fault monitor")]
struct Cli {
    /// Path to the config file; other files resolve relative to it
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll feeds until the end of the daily window or Ctrl-C
    Run {
        /// Which feeds to poll
        #[arg(long, value_enum, default_value_t = FeedArg::All)]
        feed: FeedArg,
    },

    /// Validate config, schedule and filter rules
    Validate,

    /// Render fleet status from a leg feed file
    Status {
        /// Day to read (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Classify one observed leg against the schedule
    Detect {
        flight_number: String,
        departure_airport: String,
        arrival_airport: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FeedArg {
    Leg,
    Fault,
    All,
}

impl From<FeedArg> for FeedSelection {
    fn from(arg: FeedArg) -> Self {
        match arg {
            FeedArg::Leg => FeedSelection::Leg,
            FeedArg::Fault => FeedSelection::Fault,
            FeedArg::All => FeedSelection::All,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = load_all(&cli.config)?;
    ::log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run { feed } => {
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ::log::info!("Ctrl-C received, stopping after the current tick");
                    let _ = tx.send(true);
                }
            });

            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let stats = pipeline::run_monitor(&runtime, feed.into(), clock, rx).await?;
            for (name, stats) in stats {
                ::log::info!(
                    "{}: {} fetches, {:.1}% success, {} reconnects",
                    name,
                    stats.fetch_count,
                    stats.success_rate(),
                    stats.reconnect_count
                );
            }
        }

        Command::Validate => {
            let filter = runtime.filter.stats();
            log::summary(
                "Validation passed",
                &[
                    ("Aircraft", runtime.config.fleet.aircraft.join(", ")),
                    ("Flights", runtime.schedule.flights.len().to_string()),
                    ("Chains", runtime.schedule.chains.len().to_string()),
                    ("Single rules", filter.single_rules.to_string()),
                    (
                        "Group rules",
                        format!("{} ({} effective)", filter.group_rules, filter.effective_group_rules),
                    ),
                ],
            );
        }

        Command::Status { date } => {
            let clock = SystemClock;
            let date = date.unwrap_or_else(|| clock.today());
            let fetcher = FileFetcher::<LegRow>::new("leg", &runtime.paths.feed_dir);
            let mut handle = fetcher.connect().await?;
            fetcher.login(&mut handle).await?;
            let rows = fetcher
                .fetch(&mut handle, date, &runtime.config.fleet.aircraft)
                .await?
                .unwrap_or_default();

            let mut tracker = FlightLifecycleTracker::new(
                Arc::clone(&runtime.schedule),
                runtime.config.fleet.aircraft.clone(),
                date,
            );
            let now = clock.now();
            tracker.update(&rows, now);

            let monitor =
                LegStatusMonitor::new(Arc::clone(&runtime.schedule), runtime.config.display.clone());
            let data = LegStatusData::from_tracker(&tracker);
            log::block(&monitor.subject(&data), &monitor.generate_content(&data));

            let decision = tracker.poll_decision(now);
            ::log::info!("Next poll: {} ({})", decision.priority, decision.reason);
        }

        Command::Detect {
            flight_number,
            departure_airport,
            arrival_airport,
        } => {
            let detector = AnomalyDetector::new(Arc::clone(&runtime.schedule));
            match detector.detect(&flight_number, &departure_airport, &arrival_airport) {
                Some(anomaly) => {
                    ::log::warn!(
                        "{}: {} (planned {}, observed {}, airport {})",
                        anomaly.kind.as_str(),
                        anomaly.kind.describe(),
                        anomaly.original_route,
                        anomaly.actual_route,
                        anomaly.anomaly_airport
                    );
                }
                None => ::log::info!("{} matches the schedule", flight_number),
            }
        }
    }

    Ok(())
}
