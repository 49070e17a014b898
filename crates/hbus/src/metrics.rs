// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics SPI: a passive observer of the dispatch path.
//!
//! The bus invokes these callbacks inline while routing messages, so
//! implementations must be thread-safe and cheap. The default
//! [`NullMetrics`] discards everything.

use crate::error::ReplyFailure;

/// Observer interface for event bus activity.
///
/// All methods have empty default bodies so implementations only override
/// what they measure.
pub trait BusMetrics: Send + Sync {
    /// A handler was registered on `address`.
    fn handler_registered(&self, address: &str) {
        let _ = address;
    }

    /// A handler was unregistered from `address`.
    fn handler_unregistered(&self, address: &str) {
        let _ = address;
    }

    /// A message was emitted to `address` (`publish` distinguishes fan-out
    /// from point-to-point).
    fn message_sent(&self, address: &str, publish: bool) {
        let _ = (address, publish);
    }

    /// A message was routed to `handlers` local handlers.
    fn message_received(&self, address: &str, publish: bool, handlers: usize) {
        let _ = (address, publish, handlers);
    }

    /// A message copy reached a handler (inbound chain not short-circuited).
    fn message_delivered(&self, address: &str) {
        let _ = address;
    }

    /// A reply future failed with the given category.
    fn reply_failure(&self, address: &str, failure: ReplyFailure) {
        let _ = (address, failure);
    }

    /// The bus is closing; flush and release resources.
    fn close(&self) {}
}

/// Metrics implementation that records nothing.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl BusMetrics for NullMetrics {}
