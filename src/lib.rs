//! # Sensor Link Core Library
//!
//! A controller polls a responder over a line-oriented byte channel, smooths
//! the replies with a fixed-window moving average, and periodically reports
//! max/min over everything filtered so far. The transport is abstracted
//! behind [`channel::LineChannel`]; an in-memory duplex pipe stands in for
//! the physical link in simulation and tests.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: `Command` codes and CRLF-framed decimal integer lines.
//! - **`channel`**: the `LineChannel` trait and `StreamChannel`, which runs it
//!   over any `AsyncRead + AsyncWrite` stream.
//! - **`filter`**: `FilterWindow`, the zero-seeded moving average.
//! - **`history`**: filtered-value history and `BatchStats`.
//! - **`responder`**: sensor-side state machine, `Identity`, measurement sources.
//! - **`controller`**: polling loop, batch reports, value-limit check.
//! - **`sink`**: fire-and-forget output for persistence and display consumers.
//! - **`shutdown`**: cooperative stop signal for both loops.
//! - **`session`**: runs both roles as tasks over an in-memory link.
//! - **`config`**: TOML + environment configuration via `figment`.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: the `LinkError` enum.

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod history;
pub mod logging;
pub mod protocol;
pub mod responder;
pub mod session;
pub mod shutdown;
pub mod sink;

pub use channel::{in_memory_pair, LineChannel, StreamChannel};
pub use config::LinkConfig;
pub use controller::{Controller, ControllerSummary};
pub use error::{LinkError, LinkResult};
pub use filter::FilterWindow;
pub use history::{BatchStats, History};
pub use protocol::Command;
pub use responder::{Identity, MeasurementSource, Responder, ResponderState, SyntheticSignal};
pub use session::Session;
pub use shutdown::Shutdown;
pub use sink::{BroadcastSink, LinkEvent, SampleEvent, SampleSink};
