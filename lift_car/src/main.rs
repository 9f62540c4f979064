//! # lift_car
//!
//! One simulated elevator car. Creates the car's shared state segment,
//! runs the physical state machine on the main thread and the controller
//! link on a background thread, and tears both down on SIGINT.
//!
//! The shared segment is the car's local control surface: `lift_internal`
//! attaches to it by car name while this process runs. The controller
//! connection is optional: the car simulates correctly while
//! disconnected and keeps retrying in the background.

use clap::Parser;
use lift_car::{CarEngine, ControllerLink};
use lift_common::config::{CarConfig, CarConfigFile};
use lift_common::floor::FloorLabel;
use lift_shm::CarStateSegment;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Simulated elevator car
#[derive(Parser, Debug)]
#[command(name = "lift_car")]
#[command(version)]
#[command(about = "Simulated elevator car with shared-state controls and a dispatch link")]
struct Args {
    /// Car name; also names the shared-memory segment.
    name: String,

    /// Lowest floor served (e.g. B2).
    lowest: FloorLabel,

    /// Highest floor served (e.g. 10).
    highest: FloorLabel,

    /// Base delay in milliseconds for travel and door operations.
    delay_ms: u64,

    /// Optional TOML file overriding timing fields and the controller
    /// address.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Controller address (host:port); overrides any file setting.
    #[arg(long, value_name = "ADDR")]
    controller: Option<String>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CarConfig::new(args.name.clone(), args.lowest, args.highest, args.delay_ms)?;
    if let Some(path) = &args.config {
        config.apply_file(&CarConfigFile::load(path)?);
    }
    if let Some(addr) = &args.controller {
        config.controller_addr = addr.clone();
    }

    // Fatal if this fails: without the shared segment there is no car.
    let segment = Arc::new(CarStateSegment::create(&config)?);
    info!(
        car = %config.name,
        lowest = %config.lowest,
        highest = %config.highest,
        "car ready"
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let link = ControllerLink::new(Arc::clone(&segment), config.clone(), Arc::clone(&running));
    let link_thread = thread::spawn(move || link.run());

    CarEngine::new(Arc::clone(&segment), &config, Arc::clone(&running)).run();

    if link_thread.join().is_err() {
        error!("controller link thread panicked");
    }

    // Dropping the owning segment handle unlinks the shared memory.
    drop(segment);
    info!(car = %config.name, "shutdown complete");
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}
