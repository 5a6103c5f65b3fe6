use std::io;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(feature = "audio")]
use crate::core::alerts::audio::AudioAlertSink;
use crate::core::{
    alerts::{AlertSettings, AlertSink, FanoutSink, LogAlertSink},
    config::{ConfigManager, Settings},
    error::{StoreError, TrackingError},
    map_view::{format_distance, LogMapView},
    model::{Coordinate, Destination},
    source::{feed::LineFeedSource, simulated::SimulatedSource, PositionSource},
    stops::{DestinationStore, JsonDestinationStore},
    tracking::{FixOutcome, StaleReporter, StartRequest, StatusUpdate, TrackingController, TrackingState},
};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Parser)]
#[command(name = "stop-watcher", version, about = "Wakes you up before your transit stop")]
struct Cli {
    /// Directory holding settings.json and saved stops
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the distance to the destination and alert on arrival
    Track(TrackArgs),
    /// Show or change the active destination
    Destination {
        #[command(subcommand)]
        action: DestinationAction,
    },
    /// List recent stops, or make one the active destination
    Recent {
        /// Index from the listing
        #[arg(long)]
        select: Option<usize>,
    },
    /// Show or set the alert radius in meters
    Radius { meters: Option<u32> },
}

#[derive(Args)]
struct TrackArgs {
    /// Destination name; defaults to the coordinates
    #[arg(long, requires = "lat")]
    name: Option<String>,
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,
    /// Alert radius in meters for this run
    #[arg(long)]
    radius: Option<u32>,
    /// Drive a simulated journey instead of reading `lat,lon[,accuracy]` lines from stdin
    #[arg(long)]
    simulate: bool,
}

#[derive(Subcommand)]
enum DestinationAction {
    Set {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    Show,
}

pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn execute(cli: Cli) -> Result<(), AppError> {
    let config_dir = cli.config_dir.unwrap_or_else(ConfigManager::default_dir);
    let config = ConfigManager::new(config_dir.clone());
    let mut settings = config.load();
    let mut store = JsonDestinationStore::open(config_dir)?;

    match cli.command {
        Command::Track(args) => track(args, &settings, &mut store),
        Command::Destination { action } => match action {
            DestinationAction::Set { name, lat, lon } => {
                let destination = Destination::new(name, parse_coordinate(lat, lon)?);
                store.set_destination(destination.clone())?;
                println!("Destination set: {} ({})", destination.name, destination.coordinate);
                Ok(())
            }
            DestinationAction::Show => {
                match store.destination() {
                    Some(d) => println!("{} ({})", d.name, d.coordinate),
                    None => println!("No destination set"),
                }
                Ok(())
            }
        },
        Command::Recent { select: Some(index) } => match store.select_recent(index)? {
            Some(d) => {
                println!("Destination set: {} ({})", d.name, d.coordinate);
                Ok(())
            }
            None => Err(AppError::Invalid(format!("no recent stop #{index}"))),
        },
        Command::Recent { select: None } => {
            if store.recent_stops().is_empty() {
                println!("No recent stops");
            }
            for (index, stop) in store.recent_stops().iter().enumerate() {
                println!(
                    "{:>2}  {:<30} {}  {}",
                    index,
                    stop.destination.short_name(),
                    stop.destination.coordinate,
                    stop.saved_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Command::Radius { meters: None } => {
            println!("Alert radius: {} m", settings.alert_radius_m);
            Ok(())
        }
        Command::Radius { meters: Some(0) } => Err(AppError::Invalid("alert radius must be positive".to_string())),
        Command::Radius { meters: Some(meters) } => {
            settings.alert_radius_m = meters;
            config.save(&settings)?;
            println!("Alert radius: {} m", meters);
            Ok(())
        }
    }
}

fn parse_coordinate(lat: f64, lon: f64) -> Result<Coordinate, AppError> {
    let coordinate = Coordinate::new(lat, lon);
    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(AppError::Invalid(format!("coordinate {lat}, {lon} is out of range")))
    }
}

fn track(args: TrackArgs, settings: &Settings, store: &mut JsonDestinationStore) -> Result<(), AppError> {
    let destination = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => {
            let coordinate = parse_coordinate(lat, lon)?;
            let name = args.name.unwrap_or_else(|| coordinate.to_string());
            let destination = Destination::new(name, coordinate);
            store.set_destination(destination.clone())?;
            Some(destination)
        }
        _ => store.destination().cloned(),
    };
    let Some(destination) = destination else {
        return Err(AppError::Invalid(
            "no destination selected; pass --lat/--lon or run `destination set`".to_string(),
        ));
    };
    let radius_m = args.radius.unwrap_or(settings.alert_radius_m);

    run_detached(watch(destination, radius_m, args.simulate, settings))
}

/// Run `future` to completion on a fresh runtime, then shut down without waiting on blocking work.
///
/// Stdin reads sit on a blocking thread that cannot be cancelled.
fn run_detached<F>(future: F) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(future);
    runtime.shutdown_background();
    result
}

fn build_alert_sink(settings: &AlertSettings) -> Box<dyn AlertSink> {
    #[allow(unused_mut)]
    let log_sink: Box<dyn AlertSink> = Box::new(LogAlertSink::new(settings.clone()));
    let mut fanout = FanoutSink::new(vec![log_sink]);
    #[cfg(feature = "audio")]
    fanout.push(Box::new(AudioAlertSink::new(settings.sound)));
    Box::new(fanout)
}

async fn watch(
    destination: Destination,
    radius_m: u32,
    simulate: bool,
    settings: &Settings,
) -> Result<(), AppError> {
    let (mut controller, mut rx) = TrackingController::new(build_alert_sink(&settings.alerts), Box::new(LogMapView));

    controller.toggle(|| {
        let source: Box<dyn PositionSource> = if simulate {
            Box::new(SimulatedSource::new(&destination, &settings.simulation))
        } else {
            Box::new(LineFeedSource::new(
                "stdin",
                BufReader::new(tokio::io::stdin()),
                settings.live_feed.clone(),
            ))
        };
        StartRequest {
            destination: Some(destination.clone()),
            alert_radius_m: f64::from(radius_m),
            source,
        }
    })?;
    if simulate {
        println!("Simulating journey... press Enter to acknowledge an alert, Ctrl-C to stop");
    } else {
        println!("Reading fixes from stdin as `lat,lon[,accuracy]`... Ctrl-C to stop");
    }

    // In simulation stdin is free for acknowledging alerts
    let mut ack_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ack_open = simulate;

    let stale_after = Duration::from_millis(settings.live_feed.stale_after_ms);
    let mut staleness = tokio::time::interval(Duration::from_secs(1));
    let mut stale_reporter = StaleReporter::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                match controller.handle(message) {
                    StatusUpdate::Fix(FixOutcome::AlertTriggered { distance_m }) => {
                        println!("YOUR STOP IS ARRIVING! {} to go", format_distance(distance_m));
                    }
                    StatusUpdate::SourceError { error, .. } => {
                        println!("GPS Error: {}", error);
                    }
                    StatusUpdate::Fix(_) | StatusUpdate::Ignored(_) => {}
                }
            }
            line = ack_lines.next_line(), if ack_open => {
                match line {
                    Ok(Some(_)) => {
                        if controller.acknowledge_alert() {
                            println!("Alert acknowledged. Ctrl-C turns the alarm off.");
                        }
                    }
                    _ => ack_open = false,
                }
            }
            _ = staleness.tick() => {
                if stale_reporter.observe(controller.is_stale(Instant::now(), stale_after)) {
                    warn!("No position fix for over {}s, distance may be out of date", stale_after.as_secs());
                }
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Listening for Ctrl-C failed: {}", e);
                }
                break;
            }
        }
    }

    let was = controller.state();
    controller.stop();
    if was == TrackingState::Alerting {
        info!("Alarm turned off. Have a good one!");
    }
    Ok(())
}
