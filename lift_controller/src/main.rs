//! # lift_controller
//!
//! Runs the mock dispatch controller on a TCP port. See the library
//! crate for what it does and, more importantly, does not do.

use clap::Parser;
use lift_controller::Controller;
use lift_common::consts::DEFAULT_CONTROLLER_PORT;
use std::net::TcpListener;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

/// Mock dispatch controller
#[derive(Parser, Debug)]
#[command(name = "lift_controller")]
#[command(version)]
#[command(about = "Mock dispatch controller for the lift system")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_CONTROLLER_PORT)]
    port: u16,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

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

    let listener = match TcpListener::bind(("0.0.0.0", args.port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("FATAL: cannot listen on port {}: {e}", args.port);
            process::exit(1);
        }
    };

    Controller::new().serve(listener);
}
