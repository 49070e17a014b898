// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages and headers.
//!
//! A [`Message`] is created per emission and copied (through its codec)
//! before each local delivery, so every handler owns an independent
//! instance: header and body mutations never leak between receivers.

use crate::bus::options::DeliveryOptions;
use crate::bus::BusInner;
use crate::codec::{Body, MessageCodec};
use crate::error::{Error, Result};
use std::any::Any;
use std::sync::{Arc, Weak};

/// Case-sensitive string multi-map preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Replace all values for `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, value.into()));
        self
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Remove all values for `name`. Returns `true` if any were present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A message routed by the bus.
pub struct Message {
    address: String,
    reply_address: Option<String>,
    headers: Headers,
    body: Body,
    codec: Arc<dyn MessageCodec>,
    is_send: bool,
    is_local: bool,
    /// Set when the body encodes a reply failure instead of a value.
    failure: Option<Error>,
    bus: Weak<BusInner>,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        address: String,
        reply_address: Option<String>,
        headers: Headers,
        body: Body,
        codec: Arc<dyn MessageCodec>,
        is_send: bool,
        failure: Option<Error>,
        bus: Weak<BusInner>,
    ) -> Self {
        Self {
            address,
            reply_address,
            headers,
            body,
            codec,
            is_send,
            is_local: true,
            failure,
            bus,
        }
    }

    /// Address the message was emitted to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reply address, present when the sender awaits a reply.
    pub fn reply_address(&self) -> Option<&str> {
        self.reply_address.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Body downcast to `T`; `None` on type mismatch.
    pub fn body<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }

    /// Type-erased body.
    pub fn body_any(&self) -> &(dyn Any + Send + Sync) {
        self.body.as_ref()
    }

    /// Name of the codec that carried this body.
    pub fn codec_name(&self) -> &str {
        self.codec.name()
    }

    /// Point-to-point send (`true`) or publish fan-out (`false`).
    pub fn is_send(&self) -> bool {
        self.is_send
    }

    /// True for messages that originated in this process.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// The reply failure this message carries, if it is a failure reply.
    pub(crate) fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Reply to the sender.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the message carries no reply address, the bus is
    /// gone, or no reply handler remains registered (late reply; the reply
    /// is dropped).
    pub fn reply<B: Any + Send + Sync>(&self, body: B) -> Result<()> {
        self.reply_with(body, DeliveryOptions::default())
    }

    /// Reply with explicit delivery options.
    pub fn reply_with<B: Any + Send + Sync>(
        &self,
        body: B,
        options: DeliveryOptions,
    ) -> Result<()> {
        let bus = self.bus()?;
        bus.send_reply(self.require_reply_address()?, Box::new(body), options)
    }

    /// Reply with an explicit failure; surfaced to the requester as a
    /// recipient failure carrying `code` and `message`.
    pub fn fail(&self, code: i32, message: impl Into<String>) -> Result<()> {
        let bus = self.bus()?;
        bus.send_reply_failure(
            self.require_reply_address()?,
            Error::Recipient {
                code,
                message: message.into(),
            },
        )
    }

    /// Reply and await a further reply from the original requester
    /// (request chaining).
    pub async fn reply_and_request<B: Any + Send + Sync>(&self, body: B) -> Result<Message> {
        self.reply_and_request_with(body, DeliveryOptions::default())
            .await
    }

    /// [`Message::reply_and_request`] with explicit delivery options.
    pub async fn reply_and_request_with<B: Any + Send + Sync>(
        &self,
        body: B,
        options: DeliveryOptions,
    ) -> Result<Message> {
        let bus = self.bus()?;
        let target = self.require_reply_address()?.to_string();
        bus.request_to(target, Box::new(body), options).await
    }

    /// Defensive copy for one local delivery; the codec is re-applied to
    /// produce an independent body.
    pub(crate) fn duplicate(&self) -> Result<Message> {
        Ok(Message {
            address: self.address.clone(),
            reply_address: self.reply_address.clone(),
            headers: self.headers.clone(),
            body: self.codec.transform(self.body.as_ref())?,
            codec: Arc::clone(&self.codec),
            is_send: self.is_send,
            is_local: self.is_local,
            failure: self.failure.clone(),
            bus: Weak::clone(&self.bus),
        })
    }

    fn require_reply_address(&self) -> Result<&str> {
        self.reply_address
            .as_deref()
            .ok_or_else(|| Error::IllegalState("message has no reply address".to_string()))
    }

    fn bus(&self) -> Result<Arc<BusInner>> {
        self.bus
            .upgrade()
            .ok_or_else(|| Error::IllegalState("event bus has been dropped".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn test_message(address: &str) -> Message {
        use crate::codec::CodecRegistry;

        let registry = CodecRegistry::new();
        let body: Body = Box::new(());
        let codec = registry
            .resolve(None, body.as_ref())
            .expect("unit system codec");
        Message::new(
            address.to_string(),
            None,
            Headers::new(),
            body,
            codec,
            true,
            None,
            Weak::new(),
        )
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("address", &self.address)
            .field("reply_address", &self.reply_address)
            .field("headers", &self.headers)
            .field("codec", &self.codec.name())
            .field("is_send", &self.is_send)
            .field("failure", &self.failure)
            .finish()
    }
}
