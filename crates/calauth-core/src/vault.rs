//! Password-based authenticated encryption for stored secrets.
//!
//! Tokens and custom client credentials are optionally encrypted at rest.
//! The key is derived from a user-supplied password with PBKDF2-HMAC-SHA256
//! and a random per-value salt; the payload is sealed with AES-256-GCM using
//! a fresh random nonce per call.
//!
//! Envelope layout, base64 encoded as a single string:
//!
//! ```text
//! salt (16 bytes) | nonce (12 bytes) | ciphertext + GCM tag
//! ```
//!
//! Decryption with the wrong password or over tampered data fails with
//! [`CryptoError::Integrity`]; it never yields garbage plaintext.

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::{OsRng, RngCore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Derived key size in bytes (AES-256).
const KEY_SIZE: usize = 32;

/// Per-value salt size in bytes.
const SALT_SIZE: usize = 16;

/// GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count.
const KDF_ROUNDS: u32 = 100_000;

/// Encrypts a plaintext under a password.
///
/// Every call draws a fresh salt and nonce, so encrypting the same value
/// twice yields different output.
pub fn seal(plaintext: &str, password: &str) -> CryptoResult<String> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let cipher = cipher_for(password, &salt);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::key(format!("encryption failed: {e}")))?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(envelope))
}

/// Decrypts a sealed value with a password.
pub fn open(sealed: &str, password: &str) -> CryptoResult<String> {
    let envelope = BASE64
        .decode(sealed)
        .map_err(|e| CryptoError::encoding(format!("sealed value is not base64: {e}")))?;

    if envelope.len() < SALT_SIZE + NONCE_SIZE {
        return Err(CryptoError::integrity("sealed value is truncated"));
    }
    let (salt, rest) = envelope.split_at(SALT_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let cipher = cipher_for(password, salt);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::integrity("wrong password or tampered data"))?;

    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::encoding(format!("decrypted value is not UTF-8: {e}")))
}

fn cipher_for(password: &str, salt: &[u8]) -> Aes256Gcm {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ROUNDS, &mut key);
    // Key length is fixed above, new_from_slice cannot fail.
    Aes256Gcm::new_from_slice(&key).expect("AES-256 key must be 32 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let sealed = seal("refresh-token-value", "hunter2").unwrap();
        assert_ne!(sealed, "refresh-token-value");
        assert_eq!(open(&sealed, "hunter2").unwrap(), "refresh-token-value");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let a = seal("token", "pw").unwrap();
        let b = seal("token", "pw").unwrap();
        assert_ne!(a, b);
        assert_eq!(open(&a, "pw").unwrap(), "token");
        assert_eq!(open(&b, "pw").unwrap(), "token");
    }

    #[test]
    fn wrong_password_is_integrity_error() {
        let sealed = seal("token", "correct").unwrap();
        let err = open(&sealed, "incorrect").unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn tampered_ciphertext_is_integrity_error() {
        let sealed = seal("token", "pw").unwrap();
        let mut envelope = BASE64.decode(&sealed).unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        let err = open(&BASE64.encode(envelope), "pw").unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn truncated_envelope_is_integrity_error() {
        let err = open(&BASE64.encode([0u8; 8]), "pw").unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn non_base64_is_encoding_error() {
        let err = open("!!definitely not base64!!", "pw").unwrap_err();
        assert!(matches!(err, CryptoError::Encoding(_)));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let sealed = seal("", "pw").unwrap();
        assert_eq!(open(&sealed, "pw").unwrap(), "");
    }
}
