//! Error types for broker operations.
//!
//! Every failure is scoped to the current login or refresh attempt; nothing
//! here is fatal to the host process. Flows recover at their boundary by
//! resetting to idle, so no error leaves a dangling pending session behind.

use calauth_core::CryptoError;
use thiserror::Error;

/// An error from the OAuth broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The state returned by the provider did not match the pending session.
    /// The flow aborts with no side effects.
    #[error("state mismatch on OAuth callback, possible CSRF")]
    CsrfMismatch,

    /// The token or refresh endpoint returned a non-success status or an
    /// unparsable body. Not retried; login is a one-shot, user-driven flow.
    #[error("token exchange failed ({status}): {message}")]
    Exchange {
        /// HTTP status code, 0 when the response never arrived.
        status: u16,
        /// Response body or parse error detail.
        message: String,
    },

    /// A stored secret failed authenticated decryption (wrong password or
    /// tampered data). Must propagate: an empty string here would be
    /// indistinguishable from "never logged in".
    #[error(transparent)]
    Integrity(#[from] CryptoError),

    /// The callback carried a scope outside the calendar allow-list.
    #[error("rejected OAuth callback with disallowed scope: {0}")]
    ScopeRejected(String),

    /// The request to the provider or relay could not be sent or read.
    #[error("network error: {0}")]
    Network(String),

    /// The persistence backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The user dismissed the password prompt, so encrypted fields cannot be
    /// read or written.
    #[error("no encryption password available")]
    PasswordUnavailable,

    /// The broker configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BrokerError {
    /// Creates an exchange error from an HTTP status and body.
    pub fn exchange(status: u16, message: impl Into<String>) -> Self {
        Self::Exchange {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// A specialized Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
