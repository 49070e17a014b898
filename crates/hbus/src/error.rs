// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for event bus operations.

use std::fmt;

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories surfaced on reply futures.
///
/// These are the four kinds a requester can observe on the future returned
/// by `request`, and the kinds reported to the metrics SPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFailure {
    /// No live consumer was registered on the target address.
    NoHandlers,
    /// The reply did not arrive within the configured send timeout.
    Timeout,
    /// The consumer explicitly replied with a failure.
    RecipientFailure,
    /// Any other bus-internal failure (codec error, scheduling failure).
    Error,
}

/// Errors returned by event bus operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// Operation issued before `start` or after `close`, or `start` called twice.
    IllegalState(String),

    /// Address was empty.
    InvalidAddress,

    /// Emission against an address with no live consumers.
    NoHandlers(String),

    /// Reply did not arrive within the send timeout.
    Timeout {
        /// Address the request was sent to.
        address: String,
        /// Timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// Consumer explicitly replied with a failure.
    Recipient {
        /// Application-defined failure code.
        code: i32,
        /// Failure message supplied by the consumer.
        message: String,
    },

    /// Body codec lookup or transformation failed.
    Codec(String),

    /// Internal bus failure (caught handler panic, closed channel).
    Internal(String),
}

impl Error {
    /// Map this error to the reply-failure category it represents, if any.
    ///
    /// `IllegalState` and `InvalidAddress` are synchronous call-site errors
    /// and have no reply-failure category.
    pub fn failure_kind(&self) -> Option<ReplyFailure> {
        match self {
            Error::NoHandlers(_) => Some(ReplyFailure::NoHandlers),
            Error::Timeout { .. } => Some(ReplyFailure::Timeout),
            Error::Recipient { .. } => Some(ReplyFailure::RecipientFailure),
            Error::Codec(_) | Error::Internal(_) => Some(ReplyFailure::Error),
            Error::IllegalState(_) | Error::InvalidAddress => None,
        }
    }

    /// True if this is a timeout failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// True if this is a no-handlers failure.
    pub fn is_no_handlers(&self) -> bool {
        matches!(self, Error::NoHandlers(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Error::InvalidAddress => write!(f, "Address must not be empty"),
            Error::NoHandlers(addr) => {
                write!(f, "No handlers registered for address '{}'", addr)
            }
            Error::Timeout {
                address,
                timeout_ms,
            } => write!(
                f,
                "No reply from '{}' within {} ms",
                address, timeout_ms
            ),
            Error::Recipient { code, message } => {
                write!(f, "Recipient failure ({}): {}", code, message)
            }
            Error::Codec(msg) => write!(f, "Codec error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
