//! Responder (sensor side) of the polling link.
//!
//! The responder holds an identity, produces one synthetic measurement per
//! iteration, and answers the controller's requests:
//!
//! | Received     | Action                                   |
//! |--------------|------------------------------------------|
//! | `Stop`       | close channel, go to `Stopped`, exit     |
//! | `SendId`     | reply with the identity                  |
//! | `SendValue`  | reply with this iteration's measurement  |
//! | timeout      | nothing                                  |
//! | anything else| nothing (logged at debug)                |
//!
//! Each iteration ends with a fixed sleep; there is no scheduler beyond that.

use crate::channel::LineChannel;
use crate::config::ResponderConfig;
use crate::error::{LinkError, LinkResult};
use crate::protocol::Command;
use crate::shutdown::Shutdown;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::instrument;

// =============================================================================
// Identity
// =============================================================================

/// Validated responder identity in `0..=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(u8);

impl Identity {
    /// Largest accepted identity.
    pub const MAX: i64 = 99;

    /// Validate and wrap an identity.
    ///
    /// # Errors
    /// `LinkError::InvalidIdentity` when `id` is outside `0..=99`.
    pub fn new(id: i64) -> LinkResult<Self> {
        if Self::is_valid(id) {
            Ok(Self(id as u8))
        } else {
            Err(LinkError::InvalidIdentity(id))
        }
    }

    /// Whether `id` would be accepted by [`Identity::new`].
    pub fn is_valid(id: i64) -> bool {
        (0..=Self::MAX).contains(&id)
    }

    /// Numeric identity.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Measurement sources
// =============================================================================

/// Produces one integer measurement per responder iteration.
pub trait MeasurementSource: Send {
    /// Next measurement.
    fn next_sample(&mut self) -> i64;
}

/// `round(sin(t) * 10 + uniform(0, 5))` for `t = 1, 2, 3, ...`
pub struct SyntheticSignal {
    step: u64,
    rng: ChaCha8Rng,
}

impl SyntheticSignal {
    /// Sine amplitude.
    pub const AMPLITUDE: f64 = 10.0;
    /// Upper bound of the uniform noise term.
    pub const NOISE_MAX: f64 = 5.0;

    /// Signal with noise drawn from OS entropy.
    pub fn new() -> Self {
        Self {
            step: 0,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Reproducible signal.
    pub fn seeded(seed: u64) -> Self {
        Self {
            step: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seeded if `seed` is given, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::seeded)
    }

    /// Number of samples produced so far.
    pub fn step(&self) -> u64 {
        self.step
    }
}

impl Default for SyntheticSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSource for SyntheticSignal {
    fn next_sample(&mut self) -> i64 {
        self.step += 1;
        let signal = (self.step as f64).sin() * Self::AMPLITUDE;
        let noise = self.rng.gen_range(0.0..Self::NOISE_MAX);
        (signal + noise).round() as i64
    }
}

/// Replays a fixed list of measurements, repeating the last one when exhausted.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    values: VecDeque<i64>,
    last: i64,
}

impl ReplaySource {
    /// Replay `values` in order. An empty list produces zeros.
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
            last: 0,
        }
    }
}

impl MeasurementSource for ReplaySource {
    fn next_sample(&mut self) -> i64 {
        if let Some(v) = self.values.pop_front() {
            self.last = v;
        }
        self.last
    }
}

// =============================================================================
// Responder
// =============================================================================

/// Lifecycle of a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    /// Channel closed; not answering.
    Stopped,
    /// Channel open; answering requests.
    Running,
}

/// What one responder iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderStep {
    /// Replied to `SendId` or `SendValue`.
    Replied(Command),
    /// Nothing arrived within the read window, or the line was unreadable.
    Idle,
    /// A code with no responder action was received and dropped.
    Ignored(i64),
    /// `Stop` received or the peer went away; the responder is now stopped.
    Stopped,
}

/// Sensor-side state machine answering controller requests.
pub struct Responder<C, S> {
    identity: Identity,
    channel: C,
    source: S,
    state: ResponderState,
    interval: Duration,
    read_timeout: Duration,
}

impl<C: LineChannel, S: MeasurementSource> Responder<C, S> {
    /// Build a stopped responder.
    ///
    /// The identity is validated before the channel is used in any way.
    ///
    /// # Errors
    /// `LinkError::InvalidIdentity` when `config.identity` is outside `0..=99`.
    pub fn new(config: &ResponderConfig, channel: C, source: S) -> LinkResult<Self> {
        let identity = Identity::new(config.identity)?;
        tracing::info!(%identity, "Responder initialised");
        Ok(Self {
            identity,
            channel,
            source,
            state: ResponderState::Stopped,
            interval: config.interval(),
            read_timeout: config.read_timeout(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResponderState {
        self.state
    }

    /// Configured identity.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Open the channel and move to `Running`.
    pub async fn start(&mut self) -> LinkResult<()> {
        self.channel.open().await?;
        self.state = ResponderState::Running;
        tracing::info!(identity = %self.identity, "Responder started");
        Ok(())
    }

    /// Close the channel and move to `Stopped`.
    pub async fn stop(&mut self) -> LinkResult<()> {
        self.state = ResponderState::Stopped;
        match self.channel.close().await {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => {
                tracing::debug!(identity = %self.identity, error = %e, "Channel already torn down");
            }
            Err(e) => return Err(e),
        }
        tracing::info!(identity = %self.identity, "Responder stopped");
        Ok(())
    }

    /// One iteration: sample, wait for a command, dispatch it.
    ///
    /// Does not sleep; [`Responder::run`] adds the inter-iteration delay.
    pub async fn step(&mut self) -> LinkResult<ResponderStep> {
        let sample = self.source.next_sample();

        let line = match self.channel.read_line(self.read_timeout).await {
            Ok(line) => line,
            Err(e) if e.is_disconnect() => return self.peer_gone(&e).await,
            Err(e) => return Err(e),
        };

        match Command::parse_line(line.as_deref()) {
            Ok(command) => self.dispatch(command, sample).await,
            Err(LinkError::UnrecognizedCommand(code)) => {
                tracing::debug!(identity = %self.identity, code, "Ignoring unrecognized command");
                Ok(ResponderStep::Ignored(code))
            }
            Err(e @ LinkError::Decode { .. }) => {
                tracing::warn!(identity = %self.identity, error = %e, "Unreadable command line");
                Ok(ResponderStep::Idle)
            }
            Err(e) => Err(e),
        }
    }

    /// Act on one decoded command, using `sample` as this iteration's value.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn dispatch(&mut self, command: Command, sample: i64) -> LinkResult<ResponderStep> {
        match command {
            Command::Stop => {
                self.stop().await?;
                Ok(ResponderStep::Stopped)
            }
            Command::SendId => {
                let payload = self.identity.to_string();
                self.reply(command, &payload).await
            }
            Command::SendValue => self.reply(command, &sample.to_string()).await,
            Command::None => {
                tracing::trace!("No command received");
                Ok(ResponderStep::Idle)
            }
            Command::Start => {
                tracing::debug!("Start has no effect while answering requests");
                Ok(ResponderStep::Ignored(command.code()))
            }
        }
    }

    async fn reply(&mut self, command: Command, payload: &str) -> LinkResult<ResponderStep> {
        match self.channel.write_line(payload).await {
            Ok(()) => {
                tracing::debug!(identity = %self.identity, %command, payload, "Sent reply");
                Ok(ResponderStep::Replied(command))
            }
            Err(e) if e.is_disconnect() => self.peer_gone(&e).await,
            Err(e) => Err(e),
        }
    }

    /// The controller went away; behave as if it had sent `Stop`.
    async fn peer_gone(&mut self, cause: &LinkError) -> LinkResult<ResponderStep> {
        tracing::info!(identity = %self.identity, error = %cause, "Controller closed the channel");
        self.stop().await?;
        Ok(ResponderStep::Stopped)
    }

    /// Answer requests until `Stop`, a vanished peer, or `shutdown`.
    ///
    /// Starts the responder if it is not already running. Errors other than
    /// a disconnect end the loop and are returned.
    pub async fn run(&mut self, shutdown: &Shutdown) -> LinkResult<()> {
        if self.state == ResponderState::Stopped {
            self.start().await?;
        }

        loop {
            if shutdown.is_triggered() {
                self.stop().await?;
                break;
            }

            if self.step().await? == ResponderStep::Stopped {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {
                    self.stop().await?;
                    break;
                }
            }
        }

        tracing::info!(identity = %self.identity, "Responder loop exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{in_memory_pair, StreamChannel};

    const WINDOW: Duration = Duration::from_millis(50);

    fn config(identity: i64) -> ResponderConfig {
        ResponderConfig {
            identity,
            interval_ms: 5,
            read_timeout_ms: 50,
            seed: Some(1),
        }
    }

    async fn started(
        identity: i64,
        values: Vec<i64>,
    ) -> (StreamChannel, Responder<StreamChannel, ReplaySource>) {
        let (mut host, device) = in_memory_pair(64);
        host.open().await.unwrap();
        let mut responder =
            Responder::new(&config(identity), device, ReplaySource::new(values)).unwrap();
        responder.start().await.unwrap();
        (host, responder)
    }

    #[test]
    fn identity_bounds() {
        assert!(Identity::new(0).is_ok());
        assert_eq!(Identity::new(99).unwrap().value(), 99);
        assert!(matches!(Identity::new(100), Err(LinkError::InvalidIdentity(100))));
        assert!(matches!(Identity::new(-1), Err(LinkError::InvalidIdentity(-1))));
        assert!(!Identity::is_valid(1000));
    }

    #[test]
    fn invalid_identity_fails_before_channel_use() {
        let (_host, device) = in_memory_pair(8);
        let result = Responder::new(&config(150), device, ReplaySource::new([]));
        assert!(matches!(result, Err(LinkError::InvalidIdentity(150))));
    }

    #[test]
    fn synthetic_signal_is_bounded_and_reproducible() {
        let mut a = SyntheticSignal::seeded(11);
        let mut b = SyntheticSignal::seeded(11);
        for _ in 0..200 {
            let x = a.next_sample();
            assert_eq!(x, b.next_sample());
            assert!((-10..=15).contains(&x), "sample {} out of range", x);
        }
        assert_eq!(a.step(), 200);
    }

    #[test]
    fn synthetic_signal_tracks_sine() {
        let mut signal = SyntheticSignal::seeded(3);
        for t in 1..=50u64 {
            let sample = signal.next_sample() as f64;
            let base = (t as f64).sin() * SyntheticSignal::AMPLITUDE;
            assert!(sample >= (base - 0.5).floor() && sample <= (base + 5.5).ceil());
        }
    }

    #[test]
    fn replay_source_repeats_last_value() {
        let mut source = ReplaySource::new([4, 8]);
        assert_eq!(source.next_sample(), 4);
        assert_eq!(source.next_sample(), 8);
        assert_eq!(source.next_sample(), 8);
    }

    #[tokio::test]
    async fn replies_with_identity() {
        let (mut host, mut responder) = started(42, vec![0]).await;
        host.write_line("2").await.unwrap();

        let step = responder.step().await.unwrap();
        assert_eq!(step, ResponderStep::Replied(Command::SendId));
        assert_eq!(host.read_line(WINDOW).await.unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn replies_with_current_measurement() {
        let (mut host, mut responder) = started(1, vec![37, 12]).await;
        host.write_line("3").await.unwrap();

        responder.step().await.unwrap();
        assert_eq!(host.read_line(WINDOW).await.unwrap().as_deref(), Some("37"));
    }

    #[tokio::test]
    async fn timeout_is_idle() {
        let (mut host, mut responder) = started(1, vec![5]).await;
        assert_eq!(responder.step().await.unwrap(), ResponderStep::Idle);
        assert_eq!(host.read_line(WINDOW).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_codes_are_ignored_without_reply() {
        let (mut host, mut responder) = started(1, vec![5]).await;
        host.write_line("9").await.unwrap();
        assert_eq!(responder.step().await.unwrap(), ResponderStep::Ignored(9));

        host.write_line("0").await.unwrap();
        assert_eq!(responder.step().await.unwrap(), ResponderStep::Ignored(0));

        host.write_line("garbage").await.unwrap();
        assert_eq!(responder.step().await.unwrap(), ResponderStep::Idle);

        assert_eq!(host.read_line(WINDOW).await.unwrap(), None);
        assert_eq!(responder.state(), ResponderState::Running);
    }

    #[tokio::test]
    async fn stop_closes_the_channel() {
        let (mut host, mut responder) = started(1, vec![5]).await;
        host.write_line("1").await.unwrap();

        assert_eq!(responder.step().await.unwrap(), ResponderStep::Stopped);
        assert_eq!(responder.state(), ResponderState::Stopped);
        assert!(matches!(
            host.read_line(WINDOW).await,
            Err(LinkError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn reply_to_a_vanished_controller_stops() {
        let (mut host, mut responder) = started(1, vec![5]).await;
        host.write_line("3").await.unwrap();
        drop(host);

        assert_eq!(responder.step().await.unwrap(), ResponderStep::Stopped);
        assert_eq!(responder.state(), ResponderState::Stopped);
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let (_host, mut responder) = started(1, vec![5]).await;
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();

        let handle = tokio::spawn(async move {
            responder.run(&shutdown).await.unwrap();
            responder.state()
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.trigger();

        let state = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, ResponderState::Stopped);
    }
}
