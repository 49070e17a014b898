// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-emission delivery options.

use crate::bus::message::Headers;
use std::time::Duration;

/// Options attached to a single `send`/`publish`/`request`, or carried by a
/// producer façade as its defaults.
///
/// # Example
///
/// ```rust,no_run
/// use hbus::DeliveryOptions;
/// use std::time::Duration;
///
/// let opts = DeliveryOptions::default()
///     .with_header("trace-id", "abc123")
///     .with_send_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    headers: Headers,
    codec_name: Option<String>,
    send_timeout: Option<Duration>,
    local_only: bool,
}

impl DeliveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header (multi-map semantics: existing values are kept).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Replace the full header map.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Force a specific registered codec instead of type-based resolution.
    pub fn with_codec_name(mut self, name: impl Into<String>) -> Self {
        self.codec_name = Some(name.into());
        self
    }

    /// Reply timeout for `request`. Unset means the bus default (30s unless
    /// configured otherwise).
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Restrict delivery to local consumers. The local bus delivers locally
    /// regardless; the flag is carried for transport extensions.
    pub fn with_local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn codec_name(&self) -> Option<&str> {
        self.codec_name.as_deref()
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    pub fn local_only(&self) -> bool {
        self.local_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DeliveryOptions::default();
        assert!(opts.headers().is_empty());
        assert!(opts.codec_name().is_none());
        assert!(opts.send_timeout().is_none());
        assert!(!opts.local_only());
    }

    #[test]
    fn test_with_header_appends() {
        let opts = DeliveryOptions::default()
            .with_header("k", "a")
            .with_header("k", "b");
        assert_eq!(opts.headers().get_all("k"), vec!["a", "b"]);
    }
}
