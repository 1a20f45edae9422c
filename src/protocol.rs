//! Line-oriented integer protocol shared by the controller and the responder.
//!
//! Protocol Overview:
//! - Format: one ASCII decimal integer per line
//! - Terminator: CRLF (`\r\n`) on write; LF or CRLF accepted on read
//! - Requests: `0` Start, `1` Stop, `2` SendId, `3` SendValue
//! - Replies: the responder identity or a measurement, both decimal integers
//! - `-1` is the "no data" sentinel and is never sent on the wire by either role

use crate::error::{LinkError, LinkResult};

/// Line terminator appended to every outgoing message.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Value substituted for a reply that timed out or failed to decode.
pub const NO_DATA: i64 = -1;

/// Request codes exchanged over the channel.
///
/// `None` is the sentinel for "nothing was received within the read window";
/// it has the wire value `-1` but is produced locally, not by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// No data received within the read window.
    None,
    /// Start acquisition.
    Start,
    /// Stop the responder and close its side of the channel.
    Stop,
    /// Ask the responder for its identity.
    SendId,
    /// Ask the responder for its latest measurement.
    SendValue,
}

impl Command {
    /// Numeric wire code for this command.
    pub fn code(self) -> i64 {
        match self {
            Command::None => NO_DATA,
            Command::Start => 0,
            Command::Stop => 1,
            Command::SendId => 2,
            Command::SendValue => 3,
        }
    }

    /// Map a wire code back to a command.
    ///
    /// # Errors
    /// Returns `LinkError::UnrecognizedCommand` for any code outside the
    /// closed set `-1..=3`.
    pub fn from_code(code: i64) -> LinkResult<Self> {
        match code {
            NO_DATA => Ok(Command::None),
            0 => Ok(Command::Start),
            1 => Ok(Command::Stop),
            2 => Ok(Command::SendId),
            3 => Ok(Command::SendValue),
            other => Err(LinkError::UnrecognizedCommand(other)),
        }
    }

    /// Decode a received line into a command.
    ///
    /// A timed-out read (`None`) becomes `Command::None`.
    pub fn parse_line(line: Option<&str>) -> LinkResult<Self> {
        match line {
            None => Ok(Command::None),
            Some(text) => Self::from_code(decode_int(text)?),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::None => "NONE",
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::SendId => "SEND_ID",
            Command::SendValue => "SEND_VALUE",
        };
        write!(f, "{name}({})", self.code())
    }
}

/// Frame a payload as one protocol line, terminator included.
pub fn encode_line(payload: impl std::fmt::Display) -> String {
    format!("{payload}{LINE_TERMINATOR}")
}

/// Parse one received line as a decimal integer.
///
/// Surrounding whitespace (including the CR/LF terminator) is ignored.
/// Invalid UTF-8 has already been replaced by the channel, so anything
/// non-numeric ends up here as `LinkError::Decode`.
pub fn decode_int(line: &str) -> LinkResult<i64> {
    let trimmed = line.trim();
    trimmed.parse::<i64>().map_err(|_| LinkError::Decode {
        line: trimmed.to_string(),
    })
}

/// Decode a reply, swallowing timeouts and malformed lines into `NO_DATA`.
pub fn decode_or_sentinel(line: Option<&str>) -> i64 {
    match line.map(decode_int) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Discarding malformed reply");
            NO_DATA
        }
        None => NO_DATA,
    }
}
