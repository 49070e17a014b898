// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer façade: the registration object returned by
//! `EventBus::consumer`.

use crate::bus::message::Message;
use crate::bus::BusInner;
use crate::core::context::Context;
use crate::core::registry::HandlerHolder;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// A consumer registration on one address.
///
/// Construction is cheap and performs no registration: attaching the
/// handler registers it. Unregistration is explicit (or implicit when the
/// bus or the owning context closes); dropping the object leaves the
/// registration in place.
pub struct MessageConsumer {
    bus: Arc<BusInner>,
    address: String,
    local_only: bool,
    context: Context,
    holder: Mutex<Option<Arc<HandlerHolder>>>,
}

impl MessageConsumer {
    pub(crate) fn new(
        bus: Arc<BusInner>,
        address: String,
        local_only: bool,
        context: Context,
    ) -> Self {
        Self {
            bus,
            address,
            local_only,
            context,
            holder: Mutex::new(None),
        }
    }

    /// Attach the handler and register on the address.
    ///
    /// The handler runs on this consumer's context, one invocation at a
    /// time, with an owned copy of each delivered message.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the bus is not started or a handler is already
    /// attached.
    pub fn handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let mut slot = self.holder.lock();
        if slot.is_some() {
            return Err(Error::IllegalState(
                "consumer already has a handler".to_string(),
            ));
        }
        let holder = self.bus.add_registration(
            &self.address,
            Arc::new(handler),
            self.local_only,
            &self.context,
        )?;
        *slot = Some(holder);
        Ok(())
    }

    /// Remove the registration. Idempotent: repeated calls (and calls that
    /// race with bus close) complete successfully.
    pub fn unregister(&self) -> Result<()> {
        if let Some(holder) = self.holder.lock().take() {
            self.bus.unregister_holder(&holder);
        }
        Ok(())
    }

    /// True while the handler is attached and not yet unregistered.
    pub fn is_registered(&self) -> bool {
        self.holder
            .lock()
            .as_ref()
            .map(|holder| !holder.is_removed())
            .unwrap_or(false)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The context this consumer's handler runs on.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl std::fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("address", &self.address)
            .field("local_only", &self.local_only)
            .field("registered", &self.is_registered())
            .finish()
    }
}
