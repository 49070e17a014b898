// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Event Bus API
//!
//! The [`EventBus`] is the public façade over the dispatch engine: emission
//! (`send`/`publish`/`request`), consumer and producer construction, codec
//! and interceptor registration, and the start/close lifecycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hbus::{EventBus, EventBusOptions};
//!
//! # async fn example() -> hbus::Result<()> {
//! let bus = EventBus::new(EventBusOptions::default())?;
//! bus.start()?;
//!
//! let consumer = bus.consumer("greetings")?;
//! consumer.handler(|msg| {
//!     if let Some(name) = msg.body::<String>() {
//!         let _ = msg.reply(format!("hello, {}", name));
//!     }
//! })?;
//!
//! let reply = bus.request("greetings", "world".to_string()).await?;
//! assert_eq!(reply.body::<String>().map(String::as_str), Some("hello, world"));
//!
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifecycle
//!
//! A bus starts exactly once; a second `start`, or any registration or
//! emission before the first, fails with an illegal-state error. `close`
//! unregisters every consumer, tears down the contexts the bus created,
//! and closes the metrics observer.

pub mod consumer;
pub mod message;
pub mod options;
pub mod producer;

use crate::bus::consumer::MessageConsumer;
use crate::bus::message::{Headers, Message};
use crate::bus::options::DeliveryOptions;
use crate::bus::producer::{MessagePublisher, MessageSender};
use crate::codec::{Body, CodecRegistry, MessageCodec};
use crate::config::EventBusOptions;
use crate::core::context::Context;
use crate::core::dispatch::Dispatcher;
use crate::core::interceptor::Interceptor;
use crate::core::registry::{Handler, HandlerHolder, Registration};
use crate::core::reply;
use crate::error::{Error, Result};
use crate::metrics::{BusMetrics, NullMetrics};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Created,
    Started,
    Closed,
}

/// The local event bus.
///
/// Cheap to clone; all clones share one dispatch engine.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

pub(crate) struct BusInner {
    options: EventBusOptions,
    handle: Handle,
    dispatcher: Arc<Dispatcher>,
    codecs: CodecRegistry,
    state: Mutex<LifecycleState>,
    /// Cheap read for the hot path; transitions happen under `state`.
    started: AtomicBool,
    reply_sequence: AtomicU64,
    registration_seq: AtomicU64,
    context_seq: AtomicU64,
    /// Contexts created by this bus, closed on bus close.
    contexts: Mutex<Vec<Context>>,
    /// Fallback context for reply handlers installed outside any context.
    reply_context: Mutex<Option<Context>>,
    self_ref: Weak<BusInner>,
}

impl EventBus {
    /// Create a bus with [`NullMetrics`].
    ///
    /// # Errors
    ///
    /// Returns `Err` when called outside a tokio runtime; the bus spawns
    /// its contexts and timers on the runtime it was created in.
    pub fn new(options: EventBusOptions) -> Result<EventBus> {
        Self::with_metrics(options, Arc::new(NullMetrics))
    }

    /// Create a bus reporting to the given metrics observer.
    pub fn with_metrics(options: EventBusOptions, metrics: Arc<dyn BusMetrics>) -> Result<EventBus> {
        let handle = Handle::try_current().map_err(|_| {
            Error::IllegalState("event bus must be created inside a tokio runtime".to_string())
        })?;
        let inner = Arc::new_cyclic(|self_ref| BusInner {
            options,
            handle,
            dispatcher: Arc::new(Dispatcher::new(metrics)),
            codecs: CodecRegistry::new(),
            state: Mutex::new(LifecycleState::Created),
            started: AtomicBool::new(false),
            reply_sequence: AtomicU64::new(0),
            registration_seq: AtomicU64::new(0),
            context_seq: AtomicU64::new(0),
            contexts: Mutex::new(Vec::new()),
            reply_context: Mutex::new(None),
            self_ref: Weak::clone(self_ref),
        });
        Ok(EventBus { inner })
    }

    /// Transition to started. Exactly once per bus.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the bus is already started or closed.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            LifecycleState::Created => {
                *state = LifecycleState::Started;
                self.inner.started.store(true, Ordering::Release);
                log::debug!("[EventBus::start] started");
                Ok(())
            }
            LifecycleState::Started => {
                Err(Error::IllegalState("event bus already started".to_string()))
            }
            LifecycleState::Closed => {
                Err(Error::IllegalState("event bus already closed".to_string()))
            }
        }
    }

    /// Unregister every consumer, close bus-created contexts, close
    /// metrics. Completes immediately when the bus never started; safe to
    /// call twice.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != LifecycleState::Started {
                *state = LifecycleState::Closed;
                return Ok(());
            }
            *state = LifecycleState::Closed;
            self.inner.started.store(false, Ordering::Release);
        }

        for holder in self.inner.dispatcher.registry.all_holders() {
            self.inner.unregister_holder(&holder);
        }

        let contexts: Vec<Context> = self.inner.contexts.lock().drain(..).collect();
        for context in contexts {
            context.close().await;
        }
        self.inner.reply_context.lock().take();

        self.inner.dispatcher.metrics.close();
        log::debug!("[EventBus::close] closed");
        Ok(())
    }

    /// Point-to-point emission: one of the address's handlers receives the
    /// message, chosen round-robin.
    pub fn send<B: Any + Send + Sync>(&self, address: &str, body: B) -> Result<()> {
        self.send_with(address, body, DeliveryOptions::default())
    }

    /// [`EventBus::send`] with explicit delivery options.
    pub fn send_with<B: Any + Send + Sync>(
        &self,
        address: &str,
        body: B,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.inner
            .send_or_publish(true, address, Box::new(body), options)
    }

    /// Broadcast emission: every handler registered on the address receives
    /// its own copy.
    pub fn publish<B: Any + Send + Sync>(&self, address: &str, body: B) -> Result<()> {
        self.publish_with(address, body, DeliveryOptions::default())
    }

    /// [`EventBus::publish`] with explicit delivery options.
    pub fn publish_with<B: Any + Send + Sync>(
        &self,
        address: &str,
        body: B,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.inner
            .send_or_publish(false, address, Box::new(body), options)
    }

    /// Point-to-point emission awaiting a reply.
    ///
    /// The future fails with `NoHandlers` when the address has no consumer,
    /// with `Timeout` when no reply arrives within the send timeout, and
    /// with `Recipient` when the consumer replies with a failure.
    pub async fn request<B: Any + Send + Sync>(&self, address: &str, body: B) -> Result<Message> {
        self.request_with(address, body, DeliveryOptions::default())
            .await
    }

    /// [`EventBus::request`] with explicit delivery options.
    pub async fn request_with<B: Any + Send + Sync>(
        &self,
        address: &str,
        body: B,
        options: DeliveryOptions,
    ) -> Result<Message> {
        self.inner
            .request_to(address.to_string(), Box::new(body), options)
            .await
    }

    /// Consumer on a fresh bus-owned context. Attach the handler on the
    /// returned object to register.
    pub fn consumer(&self, address: &str) -> Result<MessageConsumer> {
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }
        let context = self.inner.create_context_internal(None);
        self.build_consumer(address, false, context)
    }

    /// Consumer restricted to locally-originated messages.
    pub fn local_consumer(&self, address: &str) -> Result<MessageConsumer> {
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }
        let context = self.inner.create_context_internal(None);
        self.build_consumer(address, true, context)
    }

    /// Consumer bound to an existing context.
    pub fn consumer_on(&self, context: &Context, address: &str) -> Result<MessageConsumer> {
        self.build_consumer(address, false, context.clone())
    }

    /// Local-only consumer bound to an existing context.
    pub fn local_consumer_on(&self, context: &Context, address: &str) -> Result<MessageConsumer> {
        self.build_consumer(address, true, context.clone())
    }

    /// Typed point-to-point producer carrying its own delivery options.
    pub fn sender<T: Any + Send + Sync>(&self, address: &str) -> MessageSender<T> {
        MessageSender::new(
            Arc::clone(&self.inner),
            address.to_string(),
            DeliveryOptions::default(),
        )
    }

    /// [`EventBus::sender`] with explicit delivery options.
    pub fn sender_with<T: Any + Send + Sync>(
        &self,
        address: &str,
        options: DeliveryOptions,
    ) -> MessageSender<T> {
        MessageSender::new(Arc::clone(&self.inner), address.to_string(), options)
    }

    /// Typed broadcast producer carrying its own delivery options.
    pub fn publisher<T: Any + Send + Sync>(&self, address: &str) -> MessagePublisher<T> {
        MessagePublisher::new(
            Arc::clone(&self.inner),
            address.to_string(),
            DeliveryOptions::default(),
        )
    }

    /// [`EventBus::publisher`] with explicit delivery options.
    pub fn publisher_with<T: Any + Send + Sync>(
        &self,
        address: &str,
        options: DeliveryOptions,
    ) -> MessagePublisher<T> {
        MessagePublisher::new(Arc::clone(&self.inner), address.to_string(), options)
    }

    /// Register a named user codec.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a codec with the same name is already registered.
    pub fn register_codec(&self, codec: Arc<dyn MessageCodec>) -> Result<()> {
        self.inner.codecs.register(codec)
    }

    /// Remove a named user codec. Returns `false` if absent.
    pub fn unregister_codec(&self, name: &str) -> bool {
        self.inner.codecs.unregister(name)
    }

    /// Register `codec` as the default for bodies of type `T`.
    pub fn register_default_codec<T: Any>(&self, codec: Arc<dyn MessageCodec>) {
        self.inner.codecs.register_default::<T>(codec);
    }

    /// Remove the default codec for type `T`. Returns `false` if absent.
    pub fn unregister_default_codec<T: Any>(&self) -> bool {
        self.inner.codecs.unregister_default::<T>()
    }

    /// Append an interceptor to the outbound chain (runs on the sender's
    /// context). Keep the clone to remove it later.
    pub fn add_outbound_interceptor(&self, interceptor: Interceptor) {
        self.inner.dispatcher.outbound.add(interceptor);
    }

    /// Remove an outbound interceptor by identity.
    pub fn remove_outbound_interceptor(&self, interceptor: &Interceptor) -> bool {
        self.inner.dispatcher.outbound.remove(interceptor)
    }

    /// Append an interceptor to the inbound chain (runs on each receiver's
    /// context).
    pub fn add_inbound_interceptor(&self, interceptor: Interceptor) {
        self.inner.dispatcher.inbound.add(interceptor);
    }

    /// Remove an inbound interceptor by identity.
    pub fn remove_inbound_interceptor(&self, interceptor: &Interceptor) -> bool {
        self.inner.dispatcher.inbound.remove(interceptor)
    }

    /// Create a named serialising context owned (and closed) by this bus.
    pub fn create_context(&self, name: &str) -> Context {
        self.inner.create_context_internal(Some(name.to_string()))
    }

    fn build_consumer(
        &self,
        address: &str,
        local_only: bool,
        context: Context,
    ) -> Result<MessageConsumer> {
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }
        Ok(MessageConsumer::new(
            Arc::clone(&self.inner),
            address.to_string(),
            local_only,
            context,
        ))
    }
}

impl BusInner {
    fn check_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::IllegalState("event bus not started".to_string()))
        }
    }

    /// Build a message, resolving its codec: named override, then default
    /// for the body type, then system codec.
    fn create_message(
        &self,
        is_send: bool,
        address: String,
        reply_address: Option<String>,
        headers: Headers,
        body: Body,
        codec_name: Option<&str>,
    ) -> Result<Message> {
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }
        let codec = self.codecs.resolve(codec_name, body.as_ref())?;
        Ok(Message::new(
            address,
            reply_address,
            headers,
            body,
            codec,
            is_send,
            None,
            Weak::clone(&self.self_ref),
        ))
    }

    pub(crate) fn send_or_publish(
        &self,
        is_send: bool,
        address: &str,
        body: Body,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.check_started()?;
        let message = self.create_message(
            is_send,
            address.to_string(),
            None,
            options.headers().clone(),
            body,
            options.codec_name(),
        )?;
        self.dispatcher.dispatch(message)
    }

    /// Reply to a synthetic reply address (ordinary send).
    pub(crate) fn send_reply(
        &self,
        reply_address: &str,
        body: Body,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.check_started()?;
        let message = self.create_message(
            true,
            reply_address.to_string(),
            None,
            options.headers().clone(),
            body,
            options.codec_name(),
        )?;
        self.dispatcher.dispatch(message)
    }

    /// Route an explicit recipient failure back to the requester.
    pub(crate) fn send_reply_failure(&self, reply_address: &str, failure: Error) -> Result<()> {
        self.check_started()?;
        let body: Body = Box::new(());
        let codec = self.codecs.resolve(None, body.as_ref())?;
        let message = Message::new(
            reply_address.to_string(),
            None,
            Headers::new(),
            body,
            codec,
            true,
            Some(failure),
            Weak::clone(&self.self_ref),
        );
        self.dispatcher.dispatch(message)
    }

    /// Shared by `request` and `reply_and_request`.
    pub(crate) async fn request_to(
        &self,
        address: String,
        body: Body,
        options: DeliveryOptions,
    ) -> Result<Message> {
        self.check_started()?;
        let timeout = options
            .send_timeout()
            .unwrap_or(self.options.default_send_timeout);
        let context = Context::current().unwrap_or_else(|| self.reply_context());
        let reply_address = reply::next_reply_address(&self.reply_sequence);
        let setup = reply::install(
            &self.dispatcher,
            &self.handle,
            &address,
            reply_address.clone(),
            context,
            self.next_registration_id(),
            timeout,
        );

        let message = match self.create_message(
            true,
            address.clone(),
            Some(reply_address),
            options.headers().clone(),
            body,
            options.codec_name(),
        ) {
            Ok(message) => message,
            Err(err) => {
                self.dispatcher.registry.unregister(&setup.holder);
                setup.pending.complete(Err(err.clone()));
                return Err(err);
            }
        };

        if let Err(err) = self.dispatcher.dispatch(message) {
            // The send found no handlers (or failed outright): fail the
            // reply future immediately instead of waiting for the timeout.
            self.dispatcher.registry.unregister(&setup.holder);
            if let Some(kind) = err.failure_kind() {
                self.dispatcher.metrics.reply_failure(&address, kind);
            }
            setup.pending.complete(Err(err));
        }

        match setup.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Internal("reply channel closed".to_string())),
        }
    }

    /// Register a consumer handler and attach the context close hook.
    pub(crate) fn add_registration(
        &self,
        address: &str,
        handler: Handler,
        local_only: bool,
        context: &Context,
    ) -> Result<Arc<HandlerHolder>> {
        self.check_started()?;
        if address.is_empty() {
            return Err(Error::InvalidAddress);
        }

        let registration = Registration {
            id: self.next_registration_id(),
            address: address.to_string(),
            handler,
            local_only,
        };
        let holder = Arc::new(HandlerHolder::new(registration, context.clone(), false));
        self.dispatcher.registry.register(Arc::clone(&holder));

        let weak_bus = Weak::clone(&self.self_ref);
        let weak_holder = Arc::downgrade(&holder);
        context.add_close_hook(holder.hook_key(), move || {
            if let (Some(bus), Some(holder)) = (weak_bus.upgrade(), weak_holder.upgrade()) {
                bus.unregister_holder(&holder);
            }
        });

        self.dispatcher.metrics.handler_registered(address);
        Ok(holder)
    }

    /// Idempotent unregistration; detaches the close hook for the winner.
    pub(crate) fn unregister_holder(&self, holder: &Arc<HandlerHolder>) -> bool {
        if self.dispatcher.registry.unregister(holder) {
            holder.context.remove_close_hook(&holder.hook_key());
            self.dispatcher
                .metrics
                .handler_unregistered(&holder.registration.address);
            true
        } else {
            false
        }
    }

    fn create_context_internal(&self, name: Option<String>) -> Context {
        let name = name.unwrap_or_else(|| {
            format!(
                "hbus-context-{}",
                self.context_seq.fetch_add(1, Ordering::Relaxed)
            )
        });
        let context = Context::new(&self.handle, name);
        self.contexts.lock().push(context.clone());
        context
    }

    /// Fallback context for reply handlers installed from outside any
    /// context; created lazily, closed with the bus.
    fn reply_context(&self) -> Context {
        let mut slot = self.reply_context.lock();
        match slot.as_ref() {
            Some(context) => context.clone(),
            None => {
                let context = self.create_context_internal(Some("hbus-reply".to_string()));
                *slot = Some(context.clone());
                context
            }
        }
    }

    fn next_registration_id(&self) -> u64 {
        self.registration_seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
