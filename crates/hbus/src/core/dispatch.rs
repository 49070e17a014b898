// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message dispatcher: routes one message to one or all holders.
//!
//! The outbound interceptor chain runs on the caller; each chosen holder
//! then gets a defensive copy scheduled onto its owning context, where the
//! inbound chain and the user handler run. The emission result reported to
//! the caller reflects scheduling, not handler completion.
//!
//! A holder unregistered between selection and execution is detected by the
//! removed-flag re-check inside the scheduled task; the copy is dropped
//! silently rather than invoking a dead handler.

use crate::bus::message::Message;
use crate::core::context::panic_message;
use crate::core::interceptor::{run_chain, InterceptorChain};
use crate::core::registry::{HandlerHolder, HandlerRegistry};
use crate::error::{Error, Result};
use crate::metrics::BusMetrics;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub(crate) struct Dispatcher {
    pub registry: HandlerRegistry,
    pub outbound: InterceptorChain,
    pub inbound: InterceptorChain,
    pub metrics: Arc<dyn BusMetrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<dyn BusMetrics>) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            outbound: InterceptorChain::new(),
            inbound: InterceptorChain::new(),
            metrics,
        }
    }

    /// Run the outbound chain on the caller, then route.
    ///
    /// `Ok` means every chosen holder had a delivery scheduled (or the
    /// chain suppressed the emission); `Err(NoHandlers)` means the address
    /// had no live consumer.
    pub fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
        self.metrics
            .message_sent(message.address(), !message.is_send());
        let address = message.address().to_string();
        let chain = self.outbound.snapshot();
        let mut outcome = Ok(());
        let walk = panic::catch_unwind(AssertUnwindSafe(|| {
            run_chain(&chain, message, |msg| outcome = self.route(msg));
        }));
        if let Err(payload) = walk {
            let err = Error::Internal(format!(
                "outbound interceptor for '{}' panicked: {}",
                address,
                panic_message(payload.as_ref())
            ));
            log::error!("[Dispatcher::dispatch] {}", err);
            return Err(err);
        }
        outcome
    }

    fn route(self: &Arc<Self>, message: Message) -> Result<()> {
        let address = message.address().to_string();
        let Some(sequence) = self.registry.lookup(&address) else {
            log::debug!("[Dispatcher::route] no handlers for '{}'", address);
            return Err(Error::NoHandlers(address));
        };
        if message.is_send() {
            match sequence.next() {
                Some(holder) => {
                    self.metrics.message_received(&address, false, 1);
                    self.deliver(holder, &message);
                    Ok(())
                }
                // The sequence emptied between lookup and selection.
                None => Err(Error::NoHandlers(address)),
            }
        } else {
            self.metrics
                .message_received(&address, true, sequence.len());
            for holder in sequence.iter() {
                self.deliver(Arc::clone(holder), &message);
            }
            Ok(())
        }
    }

    /// Copy the message and schedule the inbound side on the holder's
    /// context.
    fn deliver(self: &Arc<Self>, holder: Arc<HandlerHolder>, message: &Message) {
        let copy = match message.duplicate() {
            Ok(copy) => copy,
            Err(err) => {
                // Codec failure for this receiver only; the message is
                // dropped and the owning context's sink is told.
                holder.context.report(err);
                return;
            }
        };
        let inbound = self.inbound.snapshot();
        let this = Arc::clone(self);
        let context = holder.context.clone();
        let scheduled = context.run(move || {
            if holder.is_removed() {
                log::debug!(
                    "[Dispatcher::deliver] handler for '{}' unregistered before delivery, dropping",
                    copy.address()
                );
                return;
            }
            let address = copy.address().to_string();
            run_chain(&inbound, copy, |msg| {
                this.metrics.message_delivered(&address);
                let handler = Arc::clone(&holder.registration.handler);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(msg))) {
                    holder.context.report(Error::Internal(format!(
                        "handler for '{}' panicked: {}",
                        address,
                        panic_message(payload.as_ref())
                    )));
                }
                if holder.reply_handler {
                    this.registry.unregister(&holder);
                }
            });
        });
        if !scheduled {
            log::debug!(
                "[Dispatcher::deliver] context '{}' closed, dropping message for '{}'",
                context.name(),
                message.address()
            );
        }
    }
}
