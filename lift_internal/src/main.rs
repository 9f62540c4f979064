//! # lift_internal
//!
//! One-shot manual control: attach to a running car's shared state by
//! name, perform a single operation under the lock, and exit. Rejections
//! are printed for the operator; they are this tool's interface, so they
//! go to stderr rather than a log.

use clap::Parser;
use lift_common::floor::Direction;
use lift_shm::{CarStateSegment, ControlError};
use std::process::ExitCode;

const OPERATIONS: &str = "open, close, stop, service_on, service_off, up, down";

/// Manual controls for a running car
#[derive(Parser, Debug)]
#[command(name = "lift_internal")]
#[command(version)]
#[command(about = "Send a manual control operation to a running car")]
struct Args {
    /// Car name.
    car: String,

    /// One of: open, close, stop, service_on, service_off, up, down.
    operation: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // An unrecognized command word is a usage error, reported before any
    // attempt to touch the car.
    let operation = args.operation.as_str();
    if !matches!(
        operation,
        "open" | "close" | "stop" | "service_on" | "service_off" | "up" | "down"
    ) {
        eprintln!("Invalid operation {operation:?}. Valid operations: {OPERATIONS}.");
        return ExitCode::FAILURE;
    }

    let segment = match CarStateSegment::attach(&args.car) {
        Ok(segment) => segment,
        Err(_) => {
            eprintln!("Unable to access car {}.", args.car);
            return ExitCode::FAILURE;
        }
    };

    let result = match operation {
        "open" => {
            segment.press_open();
            Ok(())
        }
        "close" => {
            segment.press_close();
            Ok(())
        }
        "stop" => {
            segment.press_stop();
            Ok(())
        }
        "service_on" => {
            segment.set_service_mode(true);
            Ok(())
        }
        "service_off" => {
            segment.set_service_mode(false);
            Ok(())
        }
        "up" => segment.request_move(Direction::Up).map(|_| ()),
        "down" => segment.request_move(Direction::Down).map(|_| ()),
        _ => unreachable!("operation validated above"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e {
                ControlError::InvalidMode => {
                    eprintln!("Operation only allowed in individual service mode.");
                }
                ControlError::DoorsOpen => {
                    eprintln!("Operation not allowed while doors are open.");
                }
                ControlError::AlreadyMoving => {
                    eprintln!("Operation not allowed while the car is moving.");
                }
                ControlError::FloorOutOfRange => {
                    eprintln!("Cannot move {operation} from the current floor.");
                }
            }
            ExitCode::FAILURE
        }
    }
}
