// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed producer façades over the bus primitives.

use crate::bus::message::Message;
use crate::bus::options::DeliveryOptions;
use crate::bus::BusInner;
use crate::error::Result;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Point-to-point producer for one address, carrying its own delivery
/// options as defaults.
pub struct MessageSender<T: Any + Send + Sync> {
    bus: Arc<BusInner>,
    address: String,
    options: DeliveryOptions,
    _body: PhantomData<fn(T)>,
}

impl<T: Any + Send + Sync> MessageSender<T> {
    pub(crate) fn new(bus: Arc<BusInner>, address: String, options: DeliveryOptions) -> Self {
        Self {
            bus,
            address,
            options,
            _body: PhantomData,
        }
    }

    /// Send `body` to this producer's address (round-robin one-of-N).
    pub fn send(&self, body: T) -> Result<()> {
        self.bus
            .send_or_publish(true, &self.address, Box::new(body), self.options.clone())
    }

    /// Send `body` and await the reply.
    pub async fn request(&self, body: T) -> Result<Message> {
        self.bus
            .request_to(self.address.clone(), Box::new(body), self.options.clone())
            .await
    }

    /// Replace this producer's default delivery options.
    pub fn with_options(mut self, options: DeliveryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn delivery_options(&self) -> &DeliveryOptions {
        &self.options
    }
}

/// Broadcast producer for one address.
pub struct MessagePublisher<T: Any + Send + Sync> {
    bus: Arc<BusInner>,
    address: String,
    options: DeliveryOptions,
    _body: PhantomData<fn(T)>,
}

impl<T: Any + Send + Sync> MessagePublisher<T> {
    pub(crate) fn new(bus: Arc<BusInner>, address: String, options: DeliveryOptions) -> Self {
        Self {
            bus,
            address,
            options,
            _body: PhantomData,
        }
    }

    /// Publish `body` to every handler on this producer's address.
    pub fn publish(&self, body: T) -> Result<()> {
        self.bus
            .send_or_publish(false, &self.address, Box::new(body), self.options.clone())
    }

    /// Replace this producer's default delivery options.
    pub fn with_options(mut self, options: DeliveryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn delivery_options(&self) -> &DeliveryOptions {
        &self.options
    }
}
