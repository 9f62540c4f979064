//! Wire protocol shared by cars, call terminals and the controller.
//!
//! Framing is symmetric in both directions: a 4-byte unsigned length
//! prefix in network byte order followed by that many bytes of UTF-8
//! payload, a single space-separated command line with no terminator.
//!
//! Transport faults (EOF, short frames, oversized frames) are
//! [`ProtocolError`]s the caller treats as a disconnect; an intact frame
//! whose *content* is unrecognized parses to [`ProtocolError::Malformed`]
//! and is discarded without tearing the connection down.

use crate::consts::MAX_FRAME_LEN;
use crate::door::DoorStatus;
use crate::floor::FloorLabel;
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;

/// Errors raised by framing and message parsing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Transport-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection at a frame boundary.
    #[error("peer closed the connection")]
    ConnectionClosed,

    /// Length prefix above [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(u32),

    /// Frame decoded but the command line is not part of the vocabulary.
    #[error("malformed message: {0:?}")]
    Malformed(String),
}

/// Number of consecutive read timeouts tolerated in the middle of a frame
/// before the connection is declared lost. A peer that sent a length
/// prefix delivers the payload promptly; one that stalls mid-frame is
/// gone.
const MID_FRAME_TIMEOUT_LIMIT: u32 = 10;

/// Send one length-prefixed message.
pub fn send_message<W: Write>(writer: &mut W, payload: &str) -> Result<(), ProtocolError> {
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Receive one message, blocking until a full frame arrives.
///
/// EOF before the length prefix maps to [`ProtocolError::ConnectionClosed`];
/// EOF inside a frame is a transport error.
pub fn recv_message<R: Read>(reader: &mut R) -> Result<String, ProtocolError> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_buf) {
        return Err(if e.kind() == ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        });
    }
    read_payload(reader, u32::from_be_bytes(len_buf))
}

/// Receive one message from a stream with a read timeout configured.
///
/// Returns `Ok(None)` when the timeout elapses before any byte of a new
/// frame arrives, which is the caller's cue to do periodic work and
/// poll again. Once a frame has started, short timeouts keep the read
/// going; a peer that stalls mid-frame for [`MID_FRAME_TIMEOUT_LIMIT`]
/// consecutive timeouts is treated as disconnected.
pub fn try_recv_message<R: Read>(reader: &mut R) -> Result<Option<String>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0usize;
    let mut stalls = 0u32;

    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) => return Err(ProtocolError::ConnectionClosed),
            Ok(n) => {
                filled += n;
                stalls = 0;
            }
            Err(e) if is_timeout(&e) => {
                if filled == 0 {
                    return Ok(None);
                }
                stalls += 1;
                if stalls >= MID_FRAME_TIMEOUT_LIMIT {
                    return Err(ProtocolError::Io(e));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }

    read_payload(reader, u32::from_be_bytes(len_buf)).map(Some)
}

fn read_payload<R: Read>(reader: &mut R, len: u32) -> Result<String, ProtocolError> {
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len as usize];
    let mut filled = 0usize;
    let mut stalls = 0u32;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ProtocolError::Io(ErrorKind::UnexpectedEof.into()));
            }
            Ok(n) => {
                filled += n;
                stalls = 0;
            }
            Err(e) if is_timeout(&e) => {
                stalls += 1;
                if stalls >= MID_FRAME_TIMEOUT_LIMIT {
                    return Err(ProtocolError::Io(e));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    String::from_utf8(buf).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

// ─── Message vocabulary ─────────────────────────────────────────────

/// Every message in the protocol, in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// car → controller: registration with the served floor range.
    Car {
        name: String,
        lowest: FloorLabel,
        highest: FloorLabel,
    },
    /// car → controller: periodic state report.
    Status {
        door: DoorStatus,
        current: FloorLabel,
        destination: FloorLabel,
    },
    /// car → controller: leaving dispatch service for manual control.
    IndividualService,
    /// car → controller: leaving dispatch service on a safety trigger.
    Emergency,
    /// controller → car: destination assignment.
    Floor(FloorLabel),
    /// call terminal → controller: request a car between two floors.
    Call {
        source: FloorLabel,
        destination: FloorLabel,
    },
    /// controller → call terminal: a car has been dispatched.
    Dispatched { name: String },
    /// controller → call terminal: no registered car can serve the call.
    Unavailable,
}

impl Message {
    /// Render the command line sent inside a frame.
    pub fn encode(&self) -> String {
        match self {
            Message::Car {
                name,
                lowest,
                highest,
            } => format!("CAR {name} {lowest} {highest}"),
            Message::Status {
                door,
                current,
                destination,
            } => format!("STATUS {door} {current} {destination}"),
            Message::IndividualService => "INDIVIDUAL SERVICE".to_string(),
            Message::Emergency => "EMERGENCY".to_string(),
            Message::Floor(floor) => format!("FLOOR {floor}"),
            Message::Call {
                source,
                destination,
            } => format!("CALL {source} {destination}"),
            Message::Dispatched { name } => format!("CAR {name}"),
            Message::Unavailable => "UNAVAILABLE".to_string(),
        }
    }

    /// Parse a received command line.
    pub fn parse(line: &str) -> Result<Message, ProtocolError> {
        let malformed = || ProtocolError::Malformed(line.to_string());

        // Messages whose verb contains a space match on the whole line.
        match line {
            "INDIVIDUAL SERVICE" => return Ok(Message::IndividualService),
            "EMERGENCY" => return Ok(Message::Emergency),
            "UNAVAILABLE" => return Ok(Message::Unavailable),
            _ => {}
        }

        let fields: Vec<&str> = line.split(' ').collect();
        match fields.as_slice() {
            ["CAR", name, lowest, highest] => {
                if name.is_empty() {
                    return Err(malformed());
                }
                Ok(Message::Car {
                    name: name.to_string(),
                    lowest: lowest.parse().map_err(|_| malformed())?,
                    highest: highest.parse().map_err(|_| malformed())?,
                })
            }
            ["CAR", name] if !name.is_empty() => Ok(Message::Dispatched {
                name: name.to_string(),
            }),
            ["STATUS", door, current, destination] => Ok(Message::Status {
                door: DoorStatus::parse(door).ok_or_else(malformed)?,
                current: current.parse().map_err(|_| malformed())?,
                destination: destination.parse().map_err(|_| malformed())?,
            }),
            ["FLOOR", floor] => Ok(Message::Floor(floor.parse().map_err(|_| malformed())?)),
            ["CALL", source, destination] => Ok(Message::Call {
                source: source.parse().map_err(|_| malformed())?,
                destination: destination.parse().map_err(|_| malformed())?,
            }),
            _ => Err(malformed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn floor(s: &str) -> FloorLabel {
        s.parse().unwrap()
    }

    #[test]
    fn frame_round_trip() {
        let mut buf = Vec::new();
        send_message(&mut buf, "STATUS Closed 1 5").unwrap();
        assert_eq!(&buf[..4], &17u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        assert_eq!(recv_message(&mut cursor).unwrap(), "STATUS Closed 1 5");
    }

    #[test]
    fn empty_stream_is_connection_closed() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(
            recv_message(&mut cursor),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(recv_message(&mut cursor), Err(ProtocolError::Io(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_allocation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            recv_message(&mut cursor),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    /// A reader that yields `WouldBlock` forever, like an idle socket with
    /// a read timeout.
    struct IdleReader;
    impl Read for IdleReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(ErrorKind::WouldBlock.into())
        }
    }

    #[test]
    fn try_recv_reports_idle_as_none() {
        let mut reader = IdleReader;
        assert!(matches!(try_recv_message(&mut reader), Ok(None)));
    }

    /// A reader that delivers a prefix of a frame, then stalls.
    struct StallingReader {
        data: Vec<u8>,
        pos: usize,
    }
    impl Read for StallingReader {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = out.len().min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn try_recv_gives_up_on_a_mid_frame_stall() {
        let mut framed = Vec::new();
        send_message(&mut framed, "FLOOR 5").unwrap();
        framed.truncate(6); // length prefix + 2 payload bytes
        let mut reader = StallingReader {
            data: framed,
            pos: 0,
        };
        assert!(matches!(
            try_recv_message(&mut reader),
            Err(ProtocolError::Io(_))
        ));
    }

    #[test]
    fn try_recv_reads_a_complete_frame() {
        let mut framed = Vec::new();
        send_message(&mut framed, "FLOOR B2").unwrap();
        let mut reader = StallingReader {
            data: framed,
            pos: 0,
        };
        assert_eq!(try_recv_message(&mut reader).unwrap().as_deref(), Some("FLOOR B2"));
    }

    #[test]
    fn encode_parse_round_trip() {
        let messages = [
            Message::Car {
                name: "A".to_string(),
                lowest: floor("B2"),
                highest: floor("10"),
            },
            Message::Status {
                door: DoorStatus::Between,
                current: floor("3"),
                destination: floor("7"),
            },
            Message::IndividualService,
            Message::Emergency,
            Message::Floor(floor("B2")),
            Message::Call {
                source: floor("3"),
                destination: floor("7"),
            },
            Message::Dispatched {
                name: "A".to_string(),
            },
            Message::Unavailable,
        ];
        for msg in messages {
            assert_eq!(Message::parse(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn wire_forms_match_the_protocol() {
        assert_eq!(
            Message::Car {
                name: "A".to_string(),
                lowest: floor("1"),
                highest: floor("10"),
            }
            .encode(),
            "CAR A 1 10"
        );
        assert_eq!(
            Message::Status {
                door: DoorStatus::Closed,
                current: floor("B1"),
                destination: floor("5"),
            }
            .encode(),
            "STATUS Closed B1 5"
        );
        assert_eq!(Message::Floor(floor("B2")).encode(), "FLOOR B2");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for bad in [
            "",
            "FLOOR",
            "FLOOR 0",
            "FLOOR five",
            "FLOOR 5 6",
            "STATUS Closed 1",
            "STATUS Ajar 1 2",
            "CAR",
            "CALL 3",
            "NOPE 1 2",
            "INDIVIDUAL",
            "floor 5",
        ] {
            assert!(
                matches!(Message::parse(bad), Err(ProtocolError::Malformed(_))),
                "line {bad:?} should be malformed"
            );
        }
    }
}
