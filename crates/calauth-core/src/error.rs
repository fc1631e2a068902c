//! Error types for the cryptographic primitives.

use thiserror::Error;

/// An error from one of the crypto primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authenticated decryption failed: wrong password, truncated envelope or
    /// tampered ciphertext. Callers must treat this as a hard failure and
    /// never fall back to an empty value.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Key generation or key serialization failed.
    #[error("key error: {0}")]
    Key(String),

    /// Input was not valid base64/hex/UTF-8 for the expected encoding.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl CryptoError {
    /// Creates an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Creates a key error.
    pub fn key(message: impl Into<String>) -> Self {
        Self::Key(message.into())
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    /// Returns true if this is an integrity failure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

/// A specialized Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
