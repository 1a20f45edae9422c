//! Custom error types for the sensor link.
//!
//! This module defines the primary error type, `LinkError`, used across the crate.
//! Using the `thiserror` crate, it gives every failure in the polling protocol a
//! named variant so callers can tell construction-time mistakes apart from noise
//! on the wire.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidIdentity`** / **`InvalidWindow`**: construction-time errors. They are
//!   fatal to the instance being built and are raised before any channel resource
//!   is touched.
//! - **`EmptyHistory`**: max/min requested before any filtered value was recorded.
//! - **`Decode`** / **`UnrecognizedCommand`**: malformed or unknown lines received
//!   from the peer. Both roles swallow these into the "no data" sentinel so that
//!   protocol liveness survives a noisy link.
//! - **`ChannelNotOpen`** / **`ChannelClosed`** / **`Io`**: transport failures.
//!   [`LinkError::is_disconnect`] picks out the ones that mean the peer is gone.
//! - **`Config`** / **`Configuration`**: file parsing and semantic validation errors.
//!
//! Read timeouts are not errors at all: `LineChannel::read_line` reports them as
//! `Ok(None)`.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Every failure the sensor link can report.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid sensor identity {0}: expected 0..=99")]
    InvalidIdentity(i64),

    #[error("Invalid filter window width {0}: must be at least 1")]
    InvalidWindow(usize),

    #[error("Filtered history is empty")]
    EmptyHistory,

    #[error("Failed to decode line {line:?} as an integer")]
    Decode { line: String },

    #[error("Unrecognized command code {0}")]
    UnrecognizedCommand(i64),

    #[error("Channel is not open")]
    ChannelNotOpen,

    #[error("Channel closed by peer")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for LinkError {
    fn from(err: figment::Error) -> Self {
        LinkError::Config(Box::new(err))
    }
}

impl LinkError {
    /// Whether this error means the peer has gone away.
    ///
    /// A responder treats these like `Stop`; a controller reads them as `-1`.
    pub fn is_disconnect(&self) -> bool {
        match self {
            LinkError::ChannelClosed => true,
            LinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
