//! Core primitives for the calauth OAuth broker.
//!
//! This crate holds everything that needs no I/O and no async runtime:
//!
//! - [`pkce`] - PKCE verifier/challenge/state generation (RFC 7636)
//! - [`keys`] - RSA-OAEP keypair for the server-relayed login flow
//! - [`vault`] - password-based authenticated encryption for stored secrets
//! - [`scope`] - the calendar scope allow-list
//! - [`tracing`] - subscriber setup shared by binaries and tests
//!
//! The protocol and token-lifecycle logic lives in `calauth-broker`.

pub mod error;
pub mod keys;
pub mod pkce;
pub mod scope;
pub mod tracing;
pub mod vault;

pub use error::{CryptoError, CryptoResult};
pub use keys::{RSA_MODULUS_BITS, RsaKeyPair};
pub use scope::scope_allowed;
