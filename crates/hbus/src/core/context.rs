// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serialising execution contexts.
//!
//! A [`Context`] is the execution domain a handler is bound to: an unbounded
//! task queue drained by a single spawned task, one closure at a time. Every
//! handler invocation for a registration happens on the registration's
//! context, which gives per-receiver FIFO ordering from any single sender.
//!
//! # Thread Safety
//!
//! `Context` is a cheap clonable handle; all operations are safe from any
//! thread. Tasks submitted with [`Context::run`] never run concurrently with
//! each other.
//!
//! # Close hooks
//!
//! A context carries keyed close hooks. Consumer registrations attach a hook
//! keyed by `(address, registration id)` so tearing the context down
//! unregisters them; unregistration reverse-detaches the hook by the same
//! key.

use crate::error::Error;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;
type ExceptionSink = Arc<dyn Fn(Error) + Send + Sync>;

/// Key identifying a close hook: `(address, registration id)`.
pub(crate) type HookKey = (String, u64);

thread_local! {
    static CURRENT: RefCell<Option<Weak<ContextInner>>> = const { RefCell::new(None) };
}

/// A named, serialising executor for handler invocations.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    hooks: Mutex<HashMap<HookKey, Box<dyn FnOnce() + Send>>>,
    sink: Mutex<ExceptionSink>,
}

impl Context {
    /// Spawn a new context on the given runtime handle.
    pub(crate) fn new(handle: &Handle, name: impl Into<String>) -> Context {
        let name = name.into();
        let sink_name = name.clone();
        let default_sink: ExceptionSink = Arc::new(move |err: Error| {
            log::error!("[Context::{}] uncaught handler error: {}", sink_name, err);
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let inner = Arc::new(ContextInner {
            name,
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(None),
            closed: AtomicBool::new(false),
            hooks: Mutex::new(HashMap::new()),
            sink: Mutex::new(default_sink),
        });

        let weak = Arc::downgrade(&inner);
        let loop_inner = Arc::clone(&inner);
        let join = handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                CURRENT.with(|c| *c.borrow_mut() = Some(weak.clone()));
                let outcome = panic::catch_unwind(AssertUnwindSafe(task));
                CURRENT.with(|c| *c.borrow_mut() = None);
                if let Err(payload) = outcome {
                    loop_inner.report(Error::Internal(format!(
                        "task panicked: {}",
                        panic_message(&payload)
                    )));
                }
            }
        });
        *inner.join.lock() = Some(join);

        Context { inner }
    }

    /// The context running the current task, if any.
    ///
    /// Set for the duration of every task executed by a context; used to
    /// bind reply handlers to the caller's context when `request` is issued
    /// from inside a handler.
    pub fn current() -> Option<Context> {
        CURRENT
            .with(|c| c.borrow().clone())
            .and_then(|w| w.upgrade())
            .map(|inner| Context { inner })
    }

    /// Enqueue a task for serialised execution on this context.
    ///
    /// Returns `false` if the context is closed; the task is dropped.
    pub fn run(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let tx = self.inner.tx.lock();
        match tx.as_ref() {
            Some(sender) => sender.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// Replace the uncaught-exception sink for this context.
    ///
    /// The sink receives caught handler panics and per-delivery failures
    /// (codec errors on the inbound path). The default sink logs at error
    /// level.
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        *self.inner.sink.lock() = Arc::new(handler);
    }

    /// Report an error to this context's exception sink.
    pub(crate) fn report(&self, err: Error) {
        self.inner.report(err);
    }

    /// Attach a close hook under `key`. If the context is already closed the
    /// hook runs immediately.
    pub(crate) fn add_close_hook(&self, key: HookKey, hook: impl FnOnce() + Send + 'static) {
        if self.inner.closed.load(Ordering::Acquire) {
            hook();
            return;
        }
        self.inner.hooks.lock().insert(key, Box::new(hook));
    }

    /// Detach the close hook under `key` without running it.
    pub(crate) fn remove_close_hook(&self, key: &HookKey) -> bool {
        self.inner.hooks.lock().remove(key).is_some()
    }

    /// Context name (diagnostics only).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once [`Context::close`] has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Run close hooks, stop accepting tasks, drain the queue, and wait for
    /// the drain to finish. Idempotent; later callers return without
    /// waiting.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks: Vec<Box<dyn FnOnce() + Send>> = {
            let mut hooks = self.inner.hooks.lock();
            hooks.drain().map(|(_, hook)| hook).collect()
        };
        for hook in hooks {
            hook();
        }
        // Dropping the sender lets the queue drain, then the loop exits.
        let tx = self.inner.tx.lock().take();
        drop(tx);
        let join = self.inner.join.lock().take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ContextInner {
    fn report(&self, err: Error) {
        let sink = Arc::clone(&self.sink.lock());
        sink(err);
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
