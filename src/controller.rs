//! Controller (polling side) of the link.
//!
//! Session start: open channel, send `SendId`, read the identity (`-1` if
//! nothing usable came back). Then, per iteration:
//!
//! 1. every `report_every`-th iteration, report max/min over the history
//! 2. send `SendValue`
//! 3. read one reply; timeouts and malformed lines become `-1`
//! 4. push the value through the moving-average filter and record the output
//! 5. sleep
//!
//! Requests are strictly one at a time: a second request is never written
//! before the previous reply was read or timed out. Bytes still buffered
//! from a late reply are discarded before each request.

use crate::channel::LineChannel;
use crate::config::ControllerConfig;
use crate::error::{LinkError, LinkResult};
use crate::filter::FilterWindow;
use crate::history::{BatchStats, History};
use crate::protocol::{decode_or_sentinel, Command, NO_DATA};
use crate::responder::Identity;
use crate::shutdown::Shutdown;
use crate::sink::{BatchReport, SampleEvent, SampleSink};
use chrono::Utc;
use std::time::Duration;

/// Polls a responder, filters its replies, and reports aggregates.
pub struct Controller<C> {
    channel: C,
    window: FilterWindow,
    history: History,
    sinks: Vec<Box<dyn SampleSink>>,
    report_every: u32,
    batch_counter: u32,
    next_index: u64,
    interval: Duration,
    read_timeout: Duration,
    value_limit: Option<i64>,
    sensor_id: Option<i64>,
}

/// End-of-session summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSummary {
    /// Identity reported by the responder, `-1` if it never answered.
    pub sensor_id: i64,
    /// Samples polled.
    pub samples: u64,
    /// Max/min over the retained history, if any samples were taken.
    pub stats: Option<BatchStats>,
}

impl<C: LineChannel> Controller<C> {
    /// Build a controller around `channel`.
    ///
    /// # Errors
    /// `LinkError::InvalidWindow` for a zero window width,
    /// `LinkError::Configuration` for a zero report cadence.
    pub fn new(config: &ControllerConfig, channel: C) -> LinkResult<Self> {
        let window = FilterWindow::new(config.window)?;
        if config.report_every == 0 {
            return Err(LinkError::Configuration(
                "report_every must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            channel,
            window,
            history: History::with_retention(config.history_retention),
            sinks: Vec::new(),
            report_every: config.report_every,
            batch_counter: 0,
            next_index: 0,
            interval: config.interval(),
            read_timeout: config.read_timeout(),
            value_limit: config.value_limit,
            sensor_id: None,
        })
    }

    /// Attach an output sink.
    pub fn with_sink(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Filtered-value history so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Identity read at session start, if `start` has run.
    pub fn sensor_id(&self) -> Option<i64> {
        self.sensor_id
    }

    /// Number of samples polled so far.
    pub fn samples(&self) -> u64 {
        self.next_index
    }

    /// Open the channel and ask the responder for its identity.
    ///
    /// Never fails because of a missing or malformed reply; that yields `-1`.
    pub async fn start(&mut self) -> LinkResult<i64> {
        self.channel.open().await?;
        tracing::info!("Controller started");

        let id = self.request(Command::SendId).await?;

        if id == NO_DATA {
            tracing::warn!("Responder did not report an identity");
        } else if !Identity::is_valid(id) {
            tracing::warn!(sensor_id = id, "Responder reported an out-of-range identity");
        } else {
            tracing::info!(sensor_id = id, "Received responder identity");
        }

        self.sensor_id = Some(id);
        Ok(id)
    }

    /// One polling iteration (steps 1-4; no sleep).
    pub async fn poll_once(&mut self) -> LinkResult<SampleEvent> {
        if self.batch_counter + 1 >= self.report_every {
            if let Err(e) = self.report_batch() {
                tracing::warn!(error = %e, "Skipping batch report");
            }
            self.batch_counter = 0;
        } else {
            self.batch_counter += 1;
        }

        let raw = self.request(Command::SendValue).await?;

        let over_limit = self.check_limit(raw);
        let filtered = self.window.push(raw as f64);
        self.history.push(filtered);

        let event = SampleEvent {
            index: self.next_index,
            raw,
            filtered,
            over_limit,
            timestamp: Utc::now(),
        };
        self.next_index += 1;

        tracing::debug!(index = event.index, raw, filtered, "Polled sample");
        for sink in &mut self.sinks {
            sink.record_sample(&event);
        }
        Ok(event)
    }

    /// Report max/min over the whole retained history.
    ///
    /// # Errors
    /// `LinkError::EmptyHistory` before the first sample.
    pub fn report_batch(&mut self) -> LinkResult<BatchReport> {
        let stats = self.history.stats()?;
        let report = BatchReport {
            samples: self.next_index,
            stats,
            timestamp: Utc::now(),
        };

        tracing::info!(
            samples = report.samples,
            max = stats.max,
            min = stats.min,
            "Batch report"
        );
        for sink in &mut self.sinks {
            sink.record_report(&report);
        }
        Ok(report)
    }

    /// Poll until `shutdown` is triggered, then stop the responder.
    ///
    /// Calls [`Controller::start`] first if it has not run yet.
    pub async fn run(&mut self, shutdown: &Shutdown) -> LinkResult<ControllerSummary> {
        if self.sensor_id.is_none() {
            self.start().await?;
        }

        while !shutdown.is_triggered() {
            self.poll_once().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        self.shutdown().await?;
        Ok(self.summary())
    }

    /// Tell the responder to stop and close this side of the channel.
    ///
    /// A responder that has already gone away is not an error.
    pub async fn shutdown(&mut self) -> LinkResult<()> {
        if !self.channel.is_open() {
            return Ok(());
        }
        if let Err(e) = self.send(Command::Stop).await {
            tracing::debug!(error = %e, "Responder unreachable while stopping");
        }
        self.channel.close().await?;
        tracing::info!(samples = self.next_index, "Controller stopped");
        Ok(())
    }

    /// Snapshot of the session so far.
    pub fn summary(&self) -> ControllerSummary {
        ControllerSummary {
            sensor_id: self.sensor_id.unwrap_or(NO_DATA),
            samples: self.next_index,
            stats: self.history.stats().ok(),
        }
    }

    /// Send `command` and read its reply. Only a closed channel is an error;
    /// a peer that has gone away reads as `-1`.
    async fn request(&mut self, command: Command) -> LinkResult<i64> {
        match self.send(command).await {
            Ok(()) => self.receive().await,
            Err(LinkError::ChannelNotOpen) => Err(LinkError::ChannelNotOpen),
            Err(e) => {
                tracing::warn!(%command, error = %e, "Request failed");
                Ok(NO_DATA)
            }
        }
    }

    async fn send(&mut self, command: Command) -> LinkResult<()> {
        self.channel.discard_pending().await?;
        self.channel.write_line(&command.code().to_string()).await?;
        tracing::trace!(%command, "Sent request");
        Ok(())
    }

    /// Read one reply, swallowing everything but misuse into the sentinel.
    async fn receive(&mut self) -> LinkResult<i64> {
        match self.channel.read_line(self.read_timeout).await {
            Ok(line) => {
                if line.is_none() {
                    tracing::debug!("No reply within read window");
                }
                Ok(decode_or_sentinel(line.as_deref()))
            }
            Err(LinkError::ChannelNotOpen) => Err(LinkError::ChannelNotOpen),
            Err(e) => {
                tracing::warn!(error = %e, "Reply read failed");
                Ok(NO_DATA)
            }
        }
    }

    fn check_limit(&self, raw: i64) -> bool {
        match self.value_limit {
            Some(limit) if raw >= limit => {
                tracing::warn!(raw, limit, offset = limit - raw, "Reading at or above limit");
                true
            }
            _ => false,
        }
    }
}
