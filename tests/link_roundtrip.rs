//! Integration tests driving a real responder and controller over the
//! in-memory link.

use sensor_link::config::{ControllerConfig, LinkConfig, ResponderConfig};
use sensor_link::responder::{ReplaySource, Responder, ResponderState};
use sensor_link::sink::LinkEvent;
use sensor_link::{in_memory_pair, Controller, LineChannel, Session, Shutdown};
use std::time::Duration;

/// Generous upper bound for anything a test waits on.
const DEADLINE: Duration = Duration::from_secs(10);

fn responder_config(identity: i64) -> ResponderConfig {
    ResponderConfig {
        identity,
        interval_ms: 1,
        read_timeout_ms: 50,
        seed: Some(7),
    }
}

fn controller_config() -> ControllerConfig {
    ControllerConfig {
        interval_ms: 5,
        read_timeout_ms: 1000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_identity_and_values_flow_end_to_end() {
    let (host, device) = in_memory_pair(256);
    let mut responder = Responder::new(&responder_config(42), device, ReplaySource::new([37])).unwrap();
    let mut controller = Controller::new(&controller_config(), host).unwrap();

    let shutdown = Shutdown::new();
    let responder_shutdown = shutdown.clone();
    let responder_task = tokio::spawn(async move {
        let result = responder.run(&responder_shutdown).await;
        (responder, result)
    });

    assert_eq!(controller.start().await.unwrap(), 42);

    let mut filtered = Vec::new();
    for _ in 0..3 {
        let event = controller.poll_once().await.unwrap();
        assert_eq!(event.raw, 37);
        assert!(!event.over_limit);
        filtered.push(event.filtered);
    }
    assert!((filtered[0] - 37.0 / 3.0).abs() < 1e-9);
    assert!((filtered[1] - 74.0 / 3.0).abs() < 1e-9);
    assert!((filtered[2] - 37.0).abs() < 1e-9);

    // Stop handshake ends the responder without the shutdown signal
    controller.shutdown().await.unwrap();
    let (responder, result) = tokio::time::timeout(DEADLINE, responder_task)
        .await
        .expect("responder did not stop")
        .unwrap();
    result.unwrap();
    assert_eq!(responder.state(), ResponderState::Stopped);
    assert!(!shutdown.is_triggered());

    let summary = controller.summary();
    assert_eq!(summary.sensor_id, 42);
    assert_eq!(summary.samples, 3);
    let stats = summary.stats.unwrap();
    assert!((stats.max - 37.0).abs() < 1e-9);
    assert!((stats.min - 37.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_controller_survives_a_silent_responder() {
    let (host, mut device) = in_memory_pair(64);
    device.open().await.unwrap();
    let mut controller = Controller::new(
        &ControllerConfig {
            read_timeout_ms: 20,
            ..Default::default()
        },
        host,
    )
    .unwrap();

    assert_eq!(controller.start().await.unwrap(), -1);
    let event = controller.poll_once().await.unwrap();
    assert_eq!(event.raw, -1);
    assert!((event.filtered - (-1.0 / 3.0)).abs() < 1e-9);
}

#[tokio::test]
async fn test_controller_reads_sentinel_after_responder_is_gone() {
    let (host, device) = in_memory_pair(64);
    let mut controller = Controller::new(&controller_config(), host).unwrap();
    drop(device);

    assert_eq!(controller.start().await.unwrap(), -1);
    for _ in 0..3 {
        assert_eq!(controller.poll_once().await.unwrap().raw, -1);
    }
    controller.shutdown().await.unwrap();
    assert_eq!(controller.summary().samples, 3);
}

#[tokio::test]
async fn test_responder_stops_when_controller_disappears() {
    let (host, device) = in_memory_pair(64);
    let mut responder = Responder::new(&responder_config(5), device, ReplaySource::new([1])).unwrap();
    drop(host);

    let shutdown = Shutdown::new();
    tokio::time::timeout(DEADLINE, responder.run(&shutdown))
        .await
        .expect("responder kept running")
        .unwrap();
    assert_eq!(responder.state(), ResponderState::Stopped);
}

#[tokio::test]
async fn test_responder_stops_when_controller_leaves_mid_request() {
    let (mut host, device) = in_memory_pair(64);
    let mut responder = Responder::new(&responder_config(5), device, ReplaySource::new([9])).unwrap();
    host.open().await.unwrap();
    host.write_line("3").await.unwrap();
    drop(host);

    let shutdown = Shutdown::new();
    let result = tokio::time::timeout(DEADLINE, responder.run(&shutdown))
        .await
        .expect("responder kept running");
    assert!(result.is_ok(), "run failed: {:?}", result);
    assert_eq!(responder.state(), ResponderState::Stopped);
}

#[tokio::test]
async fn test_responder_honours_shutdown_signal() {
    let (_host, device) = in_memory_pair(64);
    let mut responder = Responder::new(&responder_config(5), device, ReplaySource::new([1])).unwrap();

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    tokio::time::timeout(DEADLINE, responder.run(&shutdown))
        .await
        .expect("responder ignored shutdown")
        .unwrap();
    assert_eq!(responder.state(), ResponderState::Stopped);
}

#[tokio::test]
async fn test_session_streams_samples_and_reports() {
    let mut config = LinkConfig::default();
    config.responder = responder_config(17);
    config.controller = ControllerConfig {
        report_every: 2,
        ..controller_config()
    };

    let session = Session::spawn(&config).unwrap();
    let mut events = session.subscribe();

    let mut samples = Vec::new();
    let mut reports = 0;
    tokio::time::timeout(DEADLINE, async {
        while samples.len() < 4 || reports == 0 {
            match events.recv().await.unwrap() {
                LinkEvent::Sample(sample) => samples.push(sample),
                LinkEvent::Report(_) => reports += 1,
            }
        }
    })
    .await
    .expect("session produced too few events");

    let indices: Vec<u64> = samples.iter().map(|s| s.index).collect();
    assert_eq!(&indices[..4], &[0, 1, 2, 3]);
    // Synthetic signal stays within amplitude plus noise
    assert!(samples.iter().all(|s| (-10..=15).contains(&s.raw)));

    let summary = session.stop().await.unwrap();
    assert_eq!(summary.sensor_id, 17);
    assert!(summary.samples >= 4);
    assert!(summary.stats.is_some());
}
