// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler registry: the concurrent address -> handlers mapping.
//!
//! Registration and unregistration of holders for the same address must not
//! lose or duplicate entries under contention, so every mutation goes
//! through the map's per-key entry API (atomic compute on the shard). There
//! is no global lock.
//!
//! Removal is two-phase: the holder's removed flag is the authoritative
//! should-not-deliver signal (checked again on the holder's context right
//! before invocation), and snapshot replacement is the optimisation that
//! eventually stops selection. Only the caller that flips the flag proceeds
//! with map surgery; later unregisters are no-ops.

use crate::bus::message::Message;
use crate::core::context::{Context, HookKey};
use crate::core::sequence::CyclicSequence;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// User handler invoked with an owned copy of each delivered message.
pub(crate) type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// A consumer registration: the user handler plus its address and flags.
pub(crate) struct Registration {
    /// Unique within the bus; keys the context close hook.
    pub id: u64,
    pub address: String,
    pub handler: Handler,
    /// Registration is invisible to any non-local transport extension.
    #[allow(dead_code)]
    pub local_only: bool,
}

/// Binds a registration to its owning context and lifecycle flags.
///
/// Lives in exactly one cyclic sequence until removed.
pub(crate) struct HandlerHolder {
    pub registration: Registration,
    pub context: Context,
    /// One-shot holder installed by reply correlation; unregistered by the
    /// dispatcher after its single invocation.
    pub reply_handler: bool,
    removed: AtomicBool,
}

impl HandlerHolder {
    pub fn new(registration: Registration, context: Context, reply_handler: bool) -> Self {
        Self {
            registration,
            context,
            reply_handler,
            removed: AtomicBool::new(false),
        }
    }

    /// Flip the removed flag. Returns `true` only for the single winner.
    pub fn mark_removed(&self) -> bool {
        !self.removed.swap(true, Ordering::AcqRel)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Close-hook key for the owning context.
    pub fn hook_key(&self) -> HookKey {
        (self.registration.address.clone(), self.registration.id)
    }
}

/// Concurrent mapping from address to the rotatable holder sequence.
pub(crate) struct HandlerRegistry {
    handlers: DashMap<String, CyclicSequence<HandlerHolder>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Insert `holder` into the sequence at its address, creating the
    /// sequence if the address is new. Insertion order of existing holders
    /// is preserved.
    pub fn register(&self, holder: Arc<HandlerHolder>) {
        let address = holder.registration.address.clone();
        match self.handlers.entry(address) {
            Entry::Occupied(mut entry) => {
                let next = entry.get().add(holder);
                entry.insert(next);
            }
            Entry::Vacant(entry) => {
                entry.insert(CyclicSequence::of(holder));
            }
        }
    }

    /// Remove `holder` from its address sequence, dropping the map entry
    /// when the sequence becomes empty. Idempotent; returns `true` for the
    /// single winning caller.
    pub fn unregister(&self, holder: &Arc<HandlerHolder>) -> bool {
        if !holder.mark_removed() {
            return false;
        }
        let address = &holder.registration.address;
        if let Entry::Occupied(mut entry) = self.handlers.entry(address.clone()) {
            let next = entry.get().remove(holder);
            if next.is_empty() {
                entry.remove();
            } else {
                entry.insert(next);
            }
        }
        log::debug!(
            "[HandlerRegistry::unregister] removed handler {} from '{}'",
            holder.registration.id,
            address
        );
        true
    }

    /// Cheap, non-blocking snapshot lookup.
    pub fn lookup(&self, address: &str) -> Option<CyclicSequence<HandlerHolder>> {
        self.handlers.get(address).map(|entry| entry.value().clone())
    }

    /// Every live holder across every address (bus close).
    pub fn all_holders(&self) -> Vec<Arc<HandlerHolder>> {
        self.handlers
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, address: &str) -> bool {
        self.handlers.contains_key(address)
    }
}
