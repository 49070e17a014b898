// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply integration tests
//!
//! Validates reply correlation, timeouts, no-handlers failures,
//! at-most-once completion, recipient failures, and request chaining.

use hbus::{DeliveryOptions, Error, EventBus, EventBusOptions};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

fn started_bus() -> EventBus {
    let bus = EventBus::new(EventBusOptions::default()).expect("bus inside runtime");
    bus.start().expect("first start succeeds");
    bus
}

#[tokio::test]
async fn test_request_reply_roundtrip() {
    let bus = started_bus();

    let responder = bus.consumer("greet").unwrap();
    responder
        .handler(|msg| {
            let body = msg.body::<String>().cloned().unwrap_or_default();
            let _ = msg.reply(format!("{}!", body));
        })
        .unwrap();

    let options = DeliveryOptions::default().with_send_timeout(Duration::from_millis(1000));
    let started = Instant::now();
    let reply = bus
        .request_with("greet", "hi".to_string(), options)
        .await
        .unwrap();

    assert_eq!(reply.body::<String>().map(String::as_str), Some("hi!"));
    assert!(started.elapsed() < Duration::from_secs(1));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_request_times_out_without_reply() {
    let bus = started_bus();

    let responder = bus.consumer("silent").unwrap();
    responder.handler(|_msg| {}).unwrap();

    let options = DeliveryOptions::default().with_send_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let outcome = bus.request_with("silent", "x".to_string(), options).await;

    assert!(started.elapsed() >= Duration::from_millis(50));
    match outcome {
        Err(Error::Timeout {
            address,
            timeout_ms,
        }) => {
            assert_eq!(address, "silent");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
    }
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_request_to_empty_address_fails_promptly() {
    let bus = started_bus();

    let options = DeliveryOptions::default().with_send_timeout(Duration::from_millis(1000));
    let started = Instant::now();
    let outcome = bus.request_with("ghost", "x".to_string(), options).await;

    match outcome {
        Err(Error::NoHandlers(addr)) => assert_eq!(addr, "ghost"),
        other => panic!("expected NoHandlers, got {:?}", other.map(|_| ())),
    }
    // Far sooner than the timeout.
    assert!(started.elapsed() < Duration::from_millis(500));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_second_reply_is_dropped() {
    let bus = started_bus();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();

    let responder = bus.consumer("eager").unwrap();
    responder
        .handler(move |msg| {
            let _ = msg.reply("first".to_string());
            let _ = second_tx.send(msg.reply("second".to_string()).is_ok());
        })
        .unwrap();

    let reply = bus.request("eager", "q".to_string()).await.unwrap();
    assert_eq!(reply.body::<String>().map(String::as_str), Some("first"));

    // The second reply either failed to route or was dropped at the
    // one-shot holder; the future resolved exactly once either way.
    let _ = timeout(Duration::from_secs(2), second_rx.recv())
        .await
        .expect("responder ran")
        .expect("channel open");
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_recipient_failure_surfaces_code_and_message() {
    let bus = started_bus();

    let responder = bus.consumer("strict").unwrap();
    responder
        .handler(|msg| {
            let _ = msg.fail(42, "rejected");
        })
        .unwrap();

    let outcome = bus.request("strict", "payload".to_string()).await;
    match outcome {
        Err(Error::Recipient { code, message }) => {
            assert_eq!(code, 42);
            assert_eq!(message, "rejected");
        }
        other => panic!("expected Recipient, got {:?}", other.map(|_| ())),
    }
    bus.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_reply_after_timeout_is_dropped() {
    let bus = started_bus();
    let (late_tx, mut late_rx) = mpsc::unbounded_channel();

    let responder = bus.consumer("sluggish").unwrap();
    responder
        .handler(move |msg| {
            let late_tx = late_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                let _ = late_tx.send(msg.reply("too late".to_string()));
            });
        })
        .unwrap();

    let options = DeliveryOptions::default().with_send_timeout(Duration::from_millis(50));
    let outcome = bus.request_with("sluggish", "x".to_string(), options).await;
    assert!(matches!(outcome, Err(Error::Timeout { .. })));

    // The late reply finds no reply handler registered any more.
    let late = timeout(Duration::from_secs(2), late_rx.recv())
        .await
        .expect("late reply attempted")
        .expect("channel open");
    assert!(matches!(late, Err(Error::NoHandlers(_))));
    bus.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reply_and_request_chains_a_second_exchange() {
    let bus = started_bus();
    let (confirm_tx, mut confirm_rx) = mpsc::unbounded_channel();

    let responder = bus.consumer("negotiate").unwrap();
    responder
        .handler(move |msg| {
            let confirm_tx = confirm_tx.clone();
            tokio::spawn(async move {
                let confirmation = msg.reply_and_request("offer".to_string()).await;
                let _ = confirm_tx
                    .send(confirmation.map(|m| m.body::<String>().cloned()));
            });
        })
        .unwrap();

    let reply = bus.request("negotiate", "start".to_string()).await.unwrap();
    assert_eq!(reply.body::<String>().map(String::as_str), Some("offer"));
    reply.reply("accepted".to_string()).unwrap();

    let confirmation = timeout(Duration::from_secs(2), confirm_rx.recv())
        .await
        .expect("chain completed")
        .expect("channel open");
    match confirmation {
        Ok(Some(body)) => assert_eq!(body, "accepted"),
        other => panic!("expected accepted, got {:?}", other),
    }
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_sender_request_roundtrip() {
    let bus = started_bus();

    let responder = bus.consumer("double").unwrap();
    responder
        .handler(|msg| {
            let n = msg.body::<i64>().copied().unwrap_or(0);
            let _ = msg.reply(n * 2);
        })
        .unwrap();

    let sender = bus.sender::<i64>("double");
    let reply = sender.request(21).await.unwrap();
    assert_eq!(reply.body::<i64>().copied(), Some(42));
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_request_round_robins_across_responders() {
    let bus = started_bus();

    for id in 0..2 {
        let consumer = bus.consumer("pool").unwrap();
        consumer
            .handler(move |msg| {
                let _ = msg.reply(format!("worker-{}", id));
            })
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..4 {
        let reply = bus.request("pool", "job".to_string()).await.unwrap();
        seen.push(reply.body::<String>().cloned().unwrap_or_default());
    }
    let zero = seen.iter().filter(|s| *s == "worker-0").count();
    let one = seen.iter().filter(|s| *s == "worker-1").count();
    assert_eq!(zero, 2);
    assert_eq!(one, 2);
    bus.close().await.unwrap();
}
