// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interceptor pipelines for the outbound and inbound delivery paths.
//!
//! Each direction keeps an append-only, copy-on-write list. A delivery
//! captures a snapshot of the list on entry, so adds and removes during an
//! in-flight delivery do not affect it. Outbound interceptors run on the
//! sender's context; inbound interceptors run on the receiver's context,
//! after the per-holder schedule.
//!
//! An interceptor that does not call [`DeliveryContext::next`] suppresses
//! the delivery on that side: the message is dropped, the remainder of the
//! chain and the handler never run.

use crate::bus::message::Message;
use arc_swap::ArcSwap;
use std::cell::Cell;
use std::sync::Arc;

/// An interceptor observing (and possibly mutating or suppressing) one
/// delivery. Registered per direction; removal matches by identity, so keep
/// the clone you registered if you intend to remove it later.
pub type Interceptor = Arc<dyn Fn(&mut DeliveryContext) + Send + Sync>;

/// Per-delivery view handed to each interceptor in the chain.
pub struct DeliveryContext {
    message: Message,
    send: bool,
    proceed: bool,
}

impl DeliveryContext {
    /// The message flowing through this delivery.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Mutable access, e.g. to add headers.
    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Point-to-point send (`true`) or publish fan-out (`false`).
    pub fn is_send(&self) -> bool {
        self.send
    }

    /// Let the delivery continue past this interceptor. The remainder of
    /// the chain runs after the current interceptor returns.
    pub fn next(&mut self) {
        self.proceed = true;
    }
}

/// One direction's append-only interceptor list.
pub(crate) struct InterceptorChain {
    list: ArcSwap<Vec<Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self {
            list: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append in registration order.
    pub fn add(&self, interceptor: Interceptor) {
        self.list.rcu(|current| {
            let mut next = current.as_ref().clone();
            next.push(Arc::clone(&interceptor));
            next
        });
    }

    /// Remove the first occurrence by identity. Returns `false` when the
    /// interceptor was not registered.
    pub fn remove(&self, interceptor: &Interceptor) -> bool {
        let removed = Cell::new(false);
        self.list.rcu(|current| {
            removed.set(false);
            let mut next = Vec::with_capacity(current.len());
            for existing in current.iter() {
                if !removed.get() && Arc::ptr_eq(existing, interceptor) {
                    removed.set(true);
                } else {
                    next.push(Arc::clone(existing));
                }
            }
            next
        });
        removed.get()
    }

    /// Consistent snapshot for one delivery.
    pub fn snapshot(&self) -> Arc<Vec<Interceptor>> {
        self.list.load_full()
    }
}

/// Walk `chain` with `message`; invoke `terminal` only if every interceptor
/// called `next()`.
pub(crate) fn run_chain(
    chain: &Arc<Vec<Interceptor>>,
    message: Message,
    terminal: impl FnOnce(Message),
) {
    let send = message.is_send();
    let mut ctx = DeliveryContext {
        message,
        send,
        proceed: false,
    };
    for interceptor in chain.iter() {
        ctx.proceed = false;
        interceptor(&mut ctx);
        if !ctx.proceed {
            log::debug!(
                "[InterceptorChain] delivery to '{}' suppressed by interceptor",
                ctx.message.address()
            );
            return;
        }
    }
    terminal(ctx.message);
}
