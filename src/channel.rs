//! Duplex line channel abstraction.
//!
//! The roles never touch a transport directly; they talk through
//! [`LineChannel`], which offers exactly what the protocol needs:
//! open/close, write one line, and read one line with a timeout.
//!
//! # Types
//!
//! - [`SerialPortIO`]: trait alias combining `AsyncRead + AsyncWrite` for byte streams
//! - [`DynSerial`]: type-erased boxed byte stream
//! - [`StreamChannel`]: `LineChannel` over any `DynSerial`
//!
//! Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can back a
//! channel. This includes:
//! - `tokio::io::DuplexStream` (simulation and testing, see [`in_memory_pair`])
//! - a serial port stream or TCP socket supplied by the caller
//!
//! # Example
//!
//! ```rust,ignore
//! use sensor_link::channel::{in_memory_pair, LineChannel};
//! use std::time::Duration;
//!
//! let (mut controller_side, mut responder_side) = in_memory_pair(64);
//! controller_side.open().await?;
//! responder_side.open().await?;
//!
//! controller_side.write_line("2").await?;
//! let line = responder_side.read_line(Duration::from_millis(300)).await?;
//! assert_eq!(line.as_deref(), Some("2"));
//! ```

use crate::error::{LinkError, LinkResult};
use crate::protocol::encode_line;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

/// Trait alias for async byte-stream I/O.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed byte stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// A point-to-point, line-framed, half-duplex-in-practice channel.
///
/// # Contract
/// - `write_line` appends the CRLF terminator; callers pass the bare payload.
/// - `read_line` returns `Ok(None)` when nothing arrived within `timeout`;
///   it never blocks past the timeout.
/// - Both I/O methods fail with `LinkError::ChannelNotOpen` before `open`
///   or after `close`.
#[async_trait]
pub trait LineChannel: Send {
    /// Open this side of the channel.
    async fn open(&mut self) -> LinkResult<()>;

    /// Close this side of the channel. The peer observes end-of-stream.
    async fn close(&mut self) -> LinkResult<()>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Send one line.
    async fn write_line(&mut self, payload: &str) -> LinkResult<()>;

    /// Receive one line with its terminator stripped, or `None` on timeout.
    ///
    /// # Errors
    /// `LinkError::ChannelClosed` once the peer has closed and no buffered
    /// data remains.
    async fn read_line(&mut self, timeout: Duration) -> LinkResult<Option<String>>;

    /// Drop any complete or partial lines that are already buffered.
    ///
    /// Returns the number of bytes discarded.
    async fn discard_pending(&mut self) -> LinkResult<usize> {
        Ok(0)
    }
}

/// [`LineChannel`] over an async byte stream.
///
/// Partial lines that straddle a read timeout are kept and completed by the
/// next `read_line` call.
pub struct StreamChannel {
    name: String,
    stream: BufReader<DynSerial>,
    pending: Vec<u8>,
    open: bool,
}

impl StreamChannel {
    /// Wrap a byte stream. The channel starts closed.
    pub fn new(name: impl Into<String>, stream: DynSerial) -> Self {
        Self {
            name: name.into(),
            stream: BufReader::new(stream),
            pending: Vec::new(),
            open: false,
        }
    }

    fn ensure_open(&self) -> LinkResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(LinkError::ChannelNotOpen)
        }
    }

    fn take_line(&mut self) -> String {
        let raw = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

#[async_trait]
impl LineChannel for StreamChannel {
    async fn open(&mut self) -> LinkResult<()> {
        self.open = true;
        tracing::debug!(channel = %self.name, "Channel opened");
        Ok(())
    }

    async fn close(&mut self) -> LinkResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.stream.get_mut().shutdown().await?;
        tracing::debug!(channel = %self.name, "Channel closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn write_line(&mut self, payload: &str) -> LinkResult<()> {
        self.ensure_open()?;
        let frame = encode_line(payload);
        let writer = self.stream.get_mut();
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        tracing::trace!(channel = %self.name, payload, "Wrote line");
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> LinkResult<Option<String>> {
        self.ensure_open()?;
        // Skipped blank lines must not extend the read window
        let deadline = Instant::now() + timeout;
        loop {
            let read = tokio::time::timeout_at(
                deadline,
                self.stream.read_until(b'\n', &mut self.pending),
            )
            .await;

            match read {
                Err(_) => {
                    tracing::trace!(channel = %self.name, "Read window elapsed");
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(0)) => {
                    if self.pending.is_empty() {
                        return Err(LinkError::ChannelClosed);
                    }
                    return Ok(Some(self.take_line()));
                }
                Ok(Ok(_)) => {
                    let line = self.take_line();
                    // Blank keep-alive lines carry no payload
                    if line.trim().is_empty() {
                        continue;
                    }
                    tracing::trace!(channel = %self.name, line = %line, "Read line");
                    return Ok(Some(line));
                }
            }
        }
    }

    async fn discard_pending(&mut self) -> LinkResult<usize> {
        self.ensure_open()?;
        let mut discarded = self.pending.len();
        self.pending.clear();

        // A zero timeout still polls the read once, so this only consumes
        // bytes that are already available.
        loop {
            match tokio::time::timeout(
                Duration::ZERO,
                self.stream.read_until(b'\n', &mut self.pending),
            )
            .await
            {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => {
                    discarded += n;
                    self.pending.clear();
                }
                Ok(Err(e)) => {
                    tracing::warn!(channel = %self.name, error = %e, "I/O error while draining");
                    break;
                }
            }
        }
        self.pending.clear();

        if discarded > 0 {
            tracing::debug!(channel = %self.name, discarded, "Discarded stale bytes");
        }
        Ok(discarded)
    }
}

/// Create two connected channels backed by an in-memory duplex pipe.
///
/// `capacity` is the number of bytes each direction buffers before writes
/// wait for the reader.
pub fn in_memory_pair(capacity: usize) -> (StreamChannel, StreamChannel) {
    let (a, b) = tokio::io::duplex(capacity);
    (
        StreamChannel::new("controller", Box::new(a)),
        StreamChannel::new("responder", Box::new(b)),
    )
}
