// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HBUS - Local In-Process Event Bus
//!
//! A publish/subscribe and point-to-point message-dispatch hub that
//! decouples producers from consumers via string-named addresses. Producers
//! emit messages to an address; the bus routes each message to one or all
//! registered consumers, executing every handler on the serialising
//! context it was registered with. Request/reply with timeouts, pluggable
//! body codecs, and interceptor pipelines are built in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hbus::{EventBus, EventBusOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = EventBus::new(EventBusOptions::default())?;
//!     bus.start()?;
//!
//!     // One-of-N consumer
//!     let consumer = bus.consumer("sensors/temperature")?;
//!     consumer.handler(|msg| {
//!         if let Some(value) = msg.body::<f64>() {
//!             println!("reading: {value}");
//!         }
//!     })?;
//!
//!     // Fire-and-forget send
//!     bus.send("sensors/temperature", 21.5_f64)?;
//!
//!     // Request/reply
//!     let echo = bus.consumer("echo")?;
//!     echo.handler(|msg| {
//!         let body = msg.body::<String>().cloned().unwrap_or_default();
//!         let _ = msg.reply(body);
//!     })?;
//!     let reply = bus.request("echo", "ping".to_string()).await?;
//!     assert_eq!(reply.body::<String>().map(String::as_str), Some("ping"));
//!
//!     bus.close().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                            EventBus                                |
//! |   send / publish / request | consumers | producers | lifecycle     |
//! +--------------------------------------------------------------------+
//! |   createMessage (codec resolution) -> outbound interceptor chain   |
//! +--------------------------------------------------------------------+
//! |                           Dispatcher                               |
//! |   HandlerRegistry -> CyclicSequence (round-robin) | fan-out        |
//! +--------------------------------------------------------------------+
//! |            per-holder scheduling onto owning Context               |
//! |   removed-flag re-check -> inbound interceptor chain -> handler    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EventBus`] | The bus façade: emission, registration, lifecycle |
//! | [`MessageConsumer`] | Registration object for one address |
//! | [`Message`] | A delivered message; supports `reply`/`fail` |
//! | [`DeliveryOptions`] | Per-emission headers, codec override, timeout |
//! | [`MessageCodec`] | Body copy/encode contract |
//! | [`Context`] | Serialising execution domain for handlers |
//!
//! ## Delivery semantics
//!
//! - `send` picks one handler round-robin; `publish` copies the message to
//!   every handler.
//! - Emission is non-blocking: success means scheduled, not handled.
//! - From a single sending context, each receiver observes FIFO order.
//! - Handler panics are caught per delivery and reported to the owning
//!   context's exception sink; they never reach the sender.

/// Public bus API: façade, consumers, producers, messages, options.
pub mod bus;
/// Body codecs and the codec registry.
pub mod codec;
/// Bus construction options.
pub mod config;
/// Dispatch engine internals (contexts and interceptors are public here).
pub mod core;
/// Error taxonomy.
pub mod error;
/// Metrics SPI.
pub mod metrics;

pub use crate::bus::consumer::MessageConsumer;
pub use crate::bus::message::{Headers, Message};
pub use crate::bus::options::DeliveryOptions;
pub use crate::bus::producer::{MessagePublisher, MessageSender};
pub use crate::bus::EventBus;
pub use crate::codec::{Body, MessageCodec};
pub use crate::config::{EventBusOptions, DEFAULT_SEND_TIMEOUT};
pub use crate::core::context::Context;
pub use crate::core::interceptor::{DeliveryContext, Interceptor};
pub use crate::error::{Error, ReplyFailure, Result};
pub use crate::metrics::{BusMetrics, NullMetrics};
