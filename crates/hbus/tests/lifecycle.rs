// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle integration tests
//!
//! Validates the start/close state machine, pre-start rejection, close-time
//! unregistration, context close hooks, and the metrics SPI wiring.

use hbus::{BusMetrics, Error, EventBus, EventBusOptions, ReplyFailure};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Default)]
struct RecordingMetrics {
    registered: AtomicUsize,
    unregistered: AtomicUsize,
    sent: AtomicUsize,
    delivered: AtomicUsize,
    no_handler_replies: AtomicUsize,
    closed: AtomicBool,
}

impl BusMetrics for RecordingMetrics {
    fn handler_registered(&self, _address: &str) {
        self.registered.fetch_add(1, Ordering::SeqCst);
    }

    fn handler_unregistered(&self, _address: &str) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }

    fn message_sent(&self, _address: &str, _publish: bool) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn message_delivered(&self, _address: &str) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    fn reply_failure(&self, _address: &str, failure: ReplyFailure) {
        if failure == ReplyFailure::NoHandlers {
            self.no_handler_replies.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_start_twice_is_illegal() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.start().unwrap();
    assert!(matches!(bus.start(), Err(Error::IllegalState(_))));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_operations_rejected_before_start() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();

    assert!(matches!(
        bus.send("addr", 1_i32),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(
        bus.publish("addr", 1_i32),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(
        bus.request("addr", 1_i32).await,
        Err(Error::IllegalState(_))
    ));

    let consumer = bus.consumer("addr").unwrap();
    assert!(matches!(
        consumer.handler(|_msg| {}),
        Err(Error::IllegalState(_))
    ));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_close_before_start_completes_immediately() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.close().await.unwrap();
    // And the bus cannot be started afterwards.
    assert!(matches!(bus.start(), Err(Error::IllegalState(_))));
}

#[tokio::test]
async fn test_close_unregisters_every_consumer_and_is_idempotent() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.start().unwrap();

    let mut consumers = Vec::new();
    for i in 0..3 {
        let consumer = bus.consumer(&format!("addr-{}", i)).unwrap();
        consumer.handler(|_msg| {}).unwrap();
        consumers.push(consumer);
    }

    bus.close().await.unwrap();
    for consumer in &consumers {
        assert!(!consumer.is_registered());
    }

    bus.close().await.unwrap();
    assert!(matches!(
        bus.send("addr-0", 1_i32),
        Err(Error::IllegalState(_))
    ));
}

#[tokio::test]
async fn test_empty_address_is_rejected() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.start().unwrap();

    assert!(matches!(bus.send("", 1_i32), Err(Error::InvalidAddress)));
    assert!(matches!(bus.consumer(""), Err(Error::InvalidAddress)));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_context_close_unregisters_its_consumers() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.start().unwrap();

    let context = bus.create_context("deployment");
    let consumer = bus.consumer_on(&context, "scoped").unwrap();
    consumer.handler(|_msg| {}).unwrap();
    assert!(consumer.is_registered());

    context.close().await;

    assert!(!consumer.is_registered());
    assert!(matches!(
        bus.send("scoped", 1_i32),
        Err(Error::NoHandlers(_))
    ));
    // Unregister after the hook already fired stays idempotent.
    consumer.unregister().unwrap();
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_metrics_observe_lifecycle_and_dispatch() {
    let metrics = Arc::new(RecordingMetrics::default());
    let bus = EventBus::with_metrics(
        EventBusOptions::default(),
        Arc::clone(&metrics) as Arc<dyn BusMetrics>,
    )
    .unwrap();
    bus.start().unwrap();

    let consumer = bus.consumer("observed").unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    consumer
        .handler(move |_msg| {
            let _ = tx.send(());
        })
        .unwrap();
    assert_eq!(metrics.registered.load(Ordering::SeqCst), 1);

    bus.send("observed", 1_i32).unwrap();
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivered")
        .expect("open");
    assert_eq!(metrics.sent.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.delivered.load(Ordering::SeqCst), 1);

    // A failed request records a no-handlers reply failure.
    let _ = bus.request("nobody", 1_i32).await;
    assert!(metrics.no_handler_replies.load(Ordering::SeqCst) >= 1);

    bus.close().await.unwrap();
    assert!(metrics.closed.load(Ordering::SeqCst));
    assert_eq!(
        metrics.unregistered.load(Ordering::SeqCst),
        metrics.registered.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_exception_sink_receives_handler_panics() {
    let bus = EventBus::new(EventBusOptions::default()).unwrap();
    bus.start().unwrap();

    let context = bus.create_context("faulty");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    context.set_exception_handler(move |err| {
        let _ = tx.send(err.to_string());
    });

    let consumer = bus.consumer_on(&context, "boom").unwrap();
    consumer.handler(|_msg| panic!("exploded")).unwrap();

    bus.send("boom", 1_i32).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("sink called")
        .expect("open");
    assert!(report.contains("exploded"));
    bus.close().await.unwrap();
}
