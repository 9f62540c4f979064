//! # lift_call
//!
//! A call terminal: asks the controller to dispatch a car from a source
//! floor to a destination floor and prints the outcome. Short-lived:
//! one request, one response, exit.

use clap::Parser;
use lift_common::consts::DEFAULT_CONTROLLER_ADDR;
use lift_common::floor::FloorLabel;
use lift_common::protocol::{Message, recv_message, send_message};
use std::net::TcpStream;
use std::process::ExitCode;
use std::time::Duration;

/// Call terminal for the lift system
#[derive(Parser, Debug)]
#[command(name = "lift_call")]
#[command(version)]
#[command(about = "Request a car between two floors")]
struct Args {
    /// Floor the passenger is calling from (e.g. 3 or B1).
    source: String,

    /// Floor the passenger wants to reach.
    destination: String,

    /// Controller address (host:port).
    #[arg(long, value_name = "ADDR", default_value = DEFAULT_CONTROLLER_ADDR)]
    controller: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (source, destination) = match (
        args.source.parse::<FloorLabel>(),
        args.destination.parse::<FloorLabel>(),
    ) {
        (Ok(source), Ok(destination)) => (source, destination),
        _ => {
            eprintln!("Invalid floor(s) specified.");
            return ExitCode::FAILURE;
        }
    };
    if source == destination {
        eprintln!("You are already on that floor!");
        return ExitCode::FAILURE;
    }

    let mut stream = match TcpStream::connect(&args.controller) {
        Ok(stream) => stream,
        Err(_) => {
            eprintln!("Unable to connect to elevator system.");
            return ExitCode::FAILURE;
        }
    };
    // Don't let a wedged controller hang the terminal forever.
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));

    let call = Message::Call {
        source,
        destination,
    };
    if send_message(&mut stream, &call.encode()).is_err() {
        eprintln!("Unable to connect to elevator system.");
        return ExitCode::FAILURE;
    }

    let reply = match recv_message(&mut stream) {
        Ok(line) => line,
        Err(_) => {
            eprintln!("Unable to connect to elevator system.");
            return ExitCode::FAILURE;
        }
    };

    match Message::parse(&reply) {
        Ok(Message::Dispatched { name }) => {
            println!("Car {name} is arriving.");
            ExitCode::SUCCESS
        }
        Ok(Message::Unavailable) => {
            println!("Sorry, no car is available to take this request.");
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Received unexpected response from controller: {reply}");
            ExitCode::FAILURE
        }
    }
}
