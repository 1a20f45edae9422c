//! Simulated two-device session.
//!
//! Runs a [`Responder`] driven by a [`SyntheticSignal`] and a [`Controller`]
//! as separate tasks joined by an in-memory duplex channel. The only state
//! the two tasks share is that channel and the shutdown signal.

use crate::channel::in_memory_pair;
use crate::config::LinkConfig;
use crate::controller::{Controller, ControllerSummary};
use crate::error::{LinkError, LinkResult};
use crate::responder::{Responder, SyntheticSignal};
use crate::shutdown::Shutdown;
use crate::sink::{BroadcastSink, LinkEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Bytes buffered per direction of the in-memory link.
const LINK_CAPACITY: usize = 1024;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Handle to a running controller/responder pair.
pub struct Session {
    shutdown: Shutdown,
    events: BroadcastSink,
    controller: JoinHandle<LinkResult<ControllerSummary>>,
    responder: JoinHandle<LinkResult<()>>,
}

impl Session {
    /// Validate `config`, build both roles, and start them.
    ///
    /// Both roles are constructed before either task is spawned, so an
    /// invalid identity or window is reported here and nothing runs.
    ///
    /// # Panics
    /// When called outside a Tokio runtime, since both roles are started
    /// with `tokio::spawn`.
    pub fn spawn(config: &LinkConfig) -> LinkResult<Self> {
        config.validate()?;

        let (controller_side, responder_side) = in_memory_pair(LINK_CAPACITY);
        let mut responder = Responder::new(
            &config.responder,
            responder_side,
            SyntheticSignal::from_seed(config.responder.seed),
        )?;

        let events = BroadcastSink::new(EVENT_CAPACITY);
        let mut controller =
            Controller::new(&config.controller, controller_side)?.with_sink(events.clone());

        let shutdown = Shutdown::new();

        let responder_shutdown = shutdown.clone();
        let responder = tokio::spawn(async move {
            // Open before the controller's first request can arrive
            responder.start().await?;
            responder.run(&responder_shutdown).await
        });

        let controller_shutdown = shutdown.clone();
        let controller = tokio::spawn(async move { controller.run(&controller_shutdown).await });

        tracing::info!(identity = config.responder.identity, "Session spawned");
        Ok(Self {
            shutdown,
            events,
            controller,
            responder,
        })
    }

    /// Subscribe to samples and batch reports from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Shutdown signal shared with both roles.
    ///
    /// Triggering it stops both loops; [`Session::stop`] then collects the
    /// result.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop both roles and wait for them to finish.
    pub async fn stop(self) -> LinkResult<ControllerSummary> {
        self.shutdown.trigger();

        let summary = join(self.controller).await?;
        if let Err(e) = join(self.responder).await {
            tracing::warn!(error = %e, "Responder ended with an error");
        }

        tracing::info!(
            samples = summary.samples,
            sensor_id = summary.sensor_id,
            "Session stopped"
        );
        Ok(summary)
    }
}

async fn join<T>(handle: JoinHandle<LinkResult<T>>) -> LinkResult<T> {
    handle
        .await
        .map_err(|e| LinkError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_config() -> LinkConfig {
        let mut config = LinkConfig::default();
        config.responder.identity = 8;
        config.responder.interval_ms = 1;
        config.responder.read_timeout_ms = 50;
        config.controller.interval_ms = 5;
        config.controller.read_timeout_ms = 500;
        config
    }

    #[test]
    #[should_panic]
    fn spawn_outside_runtime_panics() {
        let _ = Session::spawn(&quick_config());
    }

    #[tokio::test]
    async fn external_trigger_ends_both_roles() {
        let session = Session::spawn(&quick_config()).unwrap();
        let mut events = session.subscribe();
        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();

        let signal = session.shutdown_signal();
        signal.trigger();
        assert!(signal.is_triggered());

        let summary = tokio::time::timeout(Duration::from_secs(10), session.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.sensor_id, 8);
        assert!(summary.samples >= 1);
    }

    #[tokio::test]
    async fn invalid_identity_prevents_spawn() {
        let mut config = LinkConfig::default();
        config.responder.identity = 250;
        assert!(matches!(
            Session::spawn(&config),
            Err(LinkError::InvalidIdentity(250))
        ));
    }
}
