//! Mock dispatch controller.
//!
//! A live wire-protocol peer for development and integration tests, not a
//! scheduler. Cars register with `CAR` and stream `STATUS`; call
//! terminals send one `CALL` and get `CAR <name>` or `UNAVAILABLE` back.
//! Car selection is deliberately naive (the first registered car whose
//! floor range covers both call floors), and a dispatched car receives
//! the pickup floor immediately and the passenger's destination once its
//! status stream shows it standing at the pickup.

use lift_common::door::DoorStatus;
use lift_common::floor::FloorLabel;
use lift_common::protocol::{Message, recv_message, send_message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// A pending call: the car has been sent to `pickup`; once it stands
/// there, it gets `destination`.
struct PendingCall {
    pickup: FloorLabel,
    destination: FloorLabel,
}

/// A car currently registered for dispatch.
struct RegisteredCar {
    lowest: FloorLabel,
    highest: FloorLabel,
    /// Write handle for `FLOOR` assignments (a clone of the session
    /// stream; the session thread keeps the read side).
    stream: TcpStream,
    pending: Option<PendingCall>,
}

/// The controller's in-memory car registry.
pub struct Controller {
    cars: Mutex<HashMap<String, RegisteredCar>>,
}

impl Controller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cars: Mutex::new(HashMap::new()),
        })
    }

    /// Accept loop: one thread per connection. Blocks forever.
    pub fn serve(self: &Arc<Self>, listener: TcpListener) {
        info!(addr = ?listener.local_addr().ok(), "controller listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let controller = Arc::clone(self);
                    thread::spawn(move || controller.handle_client(stream));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }

    /// The first frame decides what kind of peer connected.
    fn handle_client(&self, mut stream: TcpStream) {
        let line = match recv_message(&mut stream) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "client vanished before identifying itself");
                return;
            }
        };
        match Message::parse(&line) {
            Ok(Message::Car {
                name,
                lowest,
                highest,
            }) => self.run_car_session(name, lowest, highest, stream),
            Ok(Message::Call {
                source,
                destination,
            }) => self.answer_call(stream, source, destination),
            Ok(_) | Err(_) => {
                warn!(message = %line, "unexpected opening message");
            }
        }
    }

    /// Consume a car's status stream until it leaves dispatch service.
    fn run_car_session(
        &self,
        name: String,
        lowest: FloorLabel,
        highest: FloorLabel,
        stream: TcpStream,
    ) {
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                warn!(car = %name, error = %e, "could not clone car stream");
                return;
            }
        };
        self.cars.lock().insert(
            name.clone(),
            RegisteredCar {
                lowest,
                highest,
                stream: writer,
                pending: None,
            },
        );
        info!(car = %name, %lowest, %highest, "car registered");

        let mut reader = stream;
        loop {
            let line = match recv_message(&mut reader) {
                Ok(line) => line,
                Err(_) => break,
            };
            match Message::parse(&line) {
                Ok(Message::Status { door, current, .. }) => {
                    self.on_status(&name, door, current);
                }
                Ok(Message::IndividualService) | Ok(Message::Emergency) => {
                    info!(car = %name, message = %line, "car left dispatch service");
                    break;
                }
                Ok(_) | Err(_) => {
                    warn!(car = %name, message = %line, "unexpected message from car");
                }
            }
        }

        self.cars.lock().remove(&name);
        info!(car = %name, "car unregistered");
    }

    /// Forward the passenger's destination once the dispatched car stands
    /// at the pickup floor. `Closed` counts as standing: a car assigned
    /// its own current floor never cycles its doors.
    fn on_status(&self, name: &str, door: DoorStatus, current: FloorLabel) {
        let mut cars = self.cars.lock();
        let Some(car) = cars.get_mut(name) else {
            return;
        };
        let (pickup, destination) = match &car.pending {
            Some(pending) => (pending.pickup, pending.destination),
            None => return,
        };
        if current == pickup && matches!(door, DoorStatus::Open | DoorStatus::Closed) {
            if let Err(e) = send_message(&mut car.stream, &Message::Floor(destination).encode()) {
                warn!(car = %name, error = %e, "failed to send destination");
            }
            car.pending = None;
        }
    }

    /// Pick the first registered car covering both floors, or report
    /// `UNAVAILABLE`.
    fn answer_call(&self, mut stream: TcpStream, source: FloorLabel, destination: FloorLabel) {
        let lower = source.min(destination);
        let upper = source.max(destination);

        let reply = {
            let mut cars = self.cars.lock();
            let eligible = cars
                .iter_mut()
                .find(|(_, car)| car.lowest <= lower && upper <= car.highest);
            match eligible {
                Some((name, car)) => {
                    if let Err(e) =
                        send_message(&mut car.stream, &Message::Floor(source).encode())
                    {
                        warn!(car = %name, error = %e, "failed to send pickup floor");
                    }
                    car.pending = Some(PendingCall {
                        pickup: source,
                        destination,
                    });
                    info!(car = %name, %source, %destination, "call dispatched");
                    Message::Dispatched { name: name.clone() }
                }
                None => {
                    info!(%source, %destination, "no eligible car");
                    Message::Unavailable
                }
            }
        };

        if let Err(e) = send_message(&mut stream, &reply.encode()) {
            warn!(error = %e, "failed to answer call terminal");
        }
    }
}
