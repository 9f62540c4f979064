//! The controller link.
//!
//! A background loop that keeps one TCP connection to the dispatch
//! controller alive while the car is eligible for dispatch, translating
//! between the shared record and the wire protocol. Connection failures
//! of any kind (refused, reset, mid-frame EOF) demote to a
//! disconnect-and-retry with backoff; they never terminate the process,
//! and the state machine keeps running regardless of network status.
//!
//! The socket is owned exclusively by this thread. Shared-state reads are
//! short lock acquisitions; no socket I/O ever happens under the lock.

use lift_common::config::CarConfig;
use lift_common::protocol::{Message, send_message, try_recv_message};
use lift_shm::segment::CarStateSegment;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The network loop for one car.
pub struct ControllerLink {
    segment: Arc<CarStateSegment>,
    config: CarConfig,
    running: Arc<AtomicBool>,
}

impl ControllerLink {
    pub fn new(segment: Arc<CarStateSegment>, config: CarConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            segment,
            config,
            running,
        }
    }

    /// Run until the shared running flag is cleared; closes the socket on
    /// the way out.
    pub fn run(&self) {
        let mut conn: Option<TcpStream> = None;
        let mut next_report = Instant::now();

        while self.active() {
            let (service, emergency) = self
                .segment
                .with_lock(|state| (state.individual_service_mode(), state.emergency_mode()));

            // In either manual mode the car leaves dispatch service: announce
            // once, drop the connection, and stay away until both flags clear.
            if service || emergency {
                if let Some(mut stream) = conn.take() {
                    let announcement = if service {
                        Message::IndividualService
                    } else {
                        Message::Emergency
                    };
                    if let Err(e) = send_message(&mut stream, &announcement.encode()) {
                        warn!(error = %e, "failed to announce mode change");
                    }
                    let _ = stream.shutdown(Shutdown::Both);
                    info!(car = %self.config.name, "left dispatch service");
                }
                self.pause();
                continue;
            }

            if conn.is_none() {
                match self.connect() {
                    Some(stream) => {
                        next_report = Instant::now();
                        conn = Some(stream);
                    }
                    None => {
                        self.pause();
                        continue;
                    }
                }
            }
            let Some(stream) = conn.as_mut() else {
                continue;
            };

            if Instant::now() >= next_report {
                let status = self.segment.with_lock(|state| Message::Status {
                    door: state.door_status(),
                    current: state.current_floor(),
                    destination: state.destination_floor(),
                });
                if let Err(e) = send_message(stream, &status.encode()) {
                    warn!(error = %e, "status report failed; dropping connection");
                    conn = None;
                    self.pause();
                    continue;
                }
                next_report = Instant::now() + self.config.report_interval;
            }

            match try_recv_message(stream) {
                Ok(Some(line)) => self.handle_inbound(&line),
                // Read timeout with no pending frame: fall through to the
                // next report.
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "controller connection lost");
                    conn = None;
                    self.pause();
                }
            }
        }

        if let Some(stream) = conn {
            let _ = stream.shutdown(Shutdown::Both);
        }
        info!(car = %self.config.name, "controller link stopped");
    }

    fn active(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn pause(&self) {
        if self.active() {
            std::thread::sleep(self.config.reconnect_backoff);
        }
    }

    /// One connection attempt: TCP connect, read timeout, registration.
    /// Failures are logged and absorbed; the caller retries after backoff.
    fn connect(&self) -> Option<TcpStream> {
        let mut stream = match TcpStream::connect(&self.config.controller_addr) {
            Ok(stream) => stream,
            Err(e) => {
                debug!(addr = %self.config.controller_addr, error = %e, "controller not reachable");
                return None;
            }
        };

        // The read timeout paces the receive loop between status reports.
        if let Err(e) = stream.set_read_timeout(Some(self.config.report_interval)) {
            warn!(error = %e, "failed to set read timeout");
            return None;
        }

        let registration = Message::Car {
            name: self.config.name.clone(),
            lowest: self.config.lowest,
            highest: self.config.highest,
        };
        if let Err(e) = send_message(&mut stream, &registration.encode()) {
            warn!(error = %e, "car registration failed");
            return None;
        }

        info!(addr = %self.config.controller_addr, car = %self.config.name, "connected to controller");
        Some(stream)
    }

    /// Apply one inbound message. Malformed content is discarded without
    /// touching the connection; only the transport decides disconnects.
    fn handle_inbound(&self, line: &str) {
        match Message::parse(line) {
            Ok(Message::Floor(floor)) => {
                let mut guard = self.segment.lock();
                // The mode may have flipped since the eligibility check;
                // the controller must not steer a car in a manual mode.
                if guard.individual_service_mode() || guard.emergency_mode() {
                    return;
                }
                guard.set_destination_floor(floor);
                guard.broadcast();
                info!(car = %self.config.name, %floor, "destination assigned by controller");
            }
            Ok(_) => {
                warn!(message = %line, "unexpected message from controller");
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed controller message");
            }
        }
    }
}
