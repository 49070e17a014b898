// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reply correlation: request/reply built on ordinary sends.
//!
//! Each request registers a hidden one-shot consumer on a synthetic
//! process-unique address (`__reply.<n>`), arms a timeout, and exposes a
//! future resolved by the first reply, the timeout, or an immediate
//! no-handlers failure from the outbound send.
//!
//! At-most-once completion is enforced twice over: the pending slot hands
//! out its sender exactly once, and the holder's removed flag makes the
//! one-shot unregistration a single-winner operation.

use crate::bus::message::Message;
use crate::core::context::Context;
use crate::core::dispatch::Dispatcher;
use crate::core::registry::{HandlerHolder, Registration};
use crate::error::{Error, ReplyFailure, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Reserved prefix; user addresses must not start with it.
pub(crate) const REPLY_ADDRESS_PREFIX: &str = "__reply.";

/// Next synthetic reply address from the bus-wide monotonic counter.
pub(crate) fn next_reply_address(counter: &AtomicU64) -> String {
    format!(
        "{}{}",
        REPLY_ADDRESS_PREFIX,
        counter.fetch_add(1, Ordering::Relaxed)
    )
}

/// One outstanding request: the future's sender plus the armed timer.
pub(crate) struct PendingReply {
    /// Address the request targeted (error and metrics reporting).
    target: String,
    reply_address: String,
    state: Mutex<PendingState>,
}

struct PendingState {
    tx: Option<oneshot::Sender<Result<Message>>>,
    timer: Option<JoinHandle<()>>,
}

impl PendingReply {
    /// Resolve the future. Only the first caller wins; the timer is
    /// cancelled either way.
    pub fn complete(&self, outcome: Result<Message>) -> bool {
        let (tx, timer) = {
            let mut state = self.state.lock();
            (state.tx.take(), state.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct ReplySetup {
    pub holder: Arc<HandlerHolder>,
    pub pending: Arc<PendingReply>,
    pub rx: oneshot::Receiver<Result<Message>>,
}

/// Register the one-shot reply consumer and arm its timeout.
///
/// The caller dispatches the outbound send afterwards and must fail
/// `pending` (and unregister `holder`) if that dispatch reports no
/// handlers.
pub(crate) fn install(
    dispatcher: &Arc<Dispatcher>,
    handle: &Handle,
    target: &str,
    reply_address: String,
    context: Context,
    registration_id: u64,
    timeout: Duration,
) -> ReplySetup {
    let (tx, rx) = oneshot::channel();
    let pending = Arc::new(PendingReply {
        target: target.to_string(),
        reply_address: reply_address.clone(),
        state: Mutex::new(PendingState {
            tx: Some(tx),
            timer: None,
        }),
    });

    let handler_pending = Arc::clone(&pending);
    let handler_dispatcher = Arc::clone(dispatcher);
    let registration = Registration {
        id: registration_id,
        address: reply_address,
        handler: Arc::new(move |msg: Message| {
            let outcome = match msg.failure() {
                Some(err) => {
                    if let Some(kind) = err.failure_kind() {
                        handler_dispatcher
                            .metrics
                            .reply_failure(&handler_pending.target, kind);
                    }
                    Err(err.clone())
                }
                None => Ok(msg),
            };
            if !handler_pending.complete(outcome) {
                log::debug!(
                    "[ReplyHandler] late reply on '{}' dropped",
                    handler_pending.reply_address
                );
            }
        }),
        local_only: true,
    };
    let holder = Arc::new(HandlerHolder::new(registration, context, true));
    dispatcher.registry.register(Arc::clone(&holder));

    let timer_pending = Arc::clone(&pending);
    let timer_dispatcher = Arc::clone(dispatcher);
    let timer_holder = Arc::clone(&holder);
    let timeout_ms = timeout.as_millis() as u64;
    let timer = handle.spawn(async move {
        tokio::time::sleep(timeout).await;
        if timer_dispatcher.registry.unregister(&timer_holder) {
            timer_dispatcher
                .metrics
                .reply_failure(&timer_pending.target, ReplyFailure::Timeout);
        }
        timer_pending.complete(Err(Error::Timeout {
            address: timer_pending.target.clone(),
            timeout_ms,
        }));
    });
    pending.state.lock().timer = Some(timer);

    ReplySetup {
        holder,
        pending,
        rx,
    }
}
