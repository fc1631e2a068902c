//! RSA keypair for the server-relayed login flow.
//!
//! The relayed flow transmits a freshly generated public key to the relay
//! server as the `state`/`key` query parameter; the relay performs the code
//! exchange and sends the token set back encrypted under that key. Only the
//! device holding the matching private key can read the result, so the relay
//! never sees where the tokens end up and the client secret never leaves the
//! relay.
//!
//! The public key travels as lowercase hex of its SPKI DER encoding, which is
//! URL-safe without further escaping. Ciphertext arrives base64url encoded,
//! with or without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Modulus size for generated keypairs.
pub const RSA_MODULUS_BITS: usize = 3072;

/// An RSA-OAEP (SHA-256) keypair.
#[derive(Clone)]
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generates a new keypair with the default modulus size.
    ///
    /// Key generation is CPU-bound and can take a few seconds.
    pub fn generate() -> CryptoResult<Self> {
        Self::generate_with_bits(RSA_MODULUS_BITS)
    }

    /// Generates a new keypair with an explicit modulus size.
    pub fn generate_with_bits(bits: usize) -> CryptoResult<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::key(format!("keypair generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Serializes the public key as lowercase hex of its SPKI DER encoding.
    pub fn public_key_hex(&self) -> CryptoResult<String> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::key(format!("public key export failed: {e}")))?;
        Ok(hex::encode(der.as_bytes()))
    }

    /// Decrypts base64url ciphertext with the private key.
    ///
    /// Accepts both padded and unpadded base64url input; relays differ here.
    pub fn decrypt_base64url(&self, ciphertext: &str) -> CryptoResult<Vec<u8>> {
        let raw = URL_SAFE_NO_PAD
            .decode(ciphertext.trim_end_matches('='))
            .map_err(|e| CryptoError::encoding(format!("ciphertext is not base64url: {e}")))?;
        self.private
            .decrypt(Oaep::new::<Sha256>(), &raw)
            .map_err(|e| CryptoError::integrity(format!("RSA-OAEP decryption failed: {e}")))
    }

    /// Encrypts a message under the public key, returning base64url.
    ///
    /// This is what the relay server does on its side; exposed so the relayed
    /// flow can be exercised end to end.
    pub fn encrypt_to_base64url(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let mut rng = rand_core::OsRng;
        let raw = self
            .public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::key(format!("RSA-OAEP encryption failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("RsaKeyPair").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2048 bits keeps keygen fast in debug builds; the OAEP paths are
    // identical at every modulus size.
    fn test_keypair() -> RsaKeyPair {
        RsaKeyPair::generate_with_bits(2048).unwrap()
    }

    #[test]
    fn public_key_hex_is_url_safe() {
        let keys = test_keypair();
        let hex = keys.public_key_hex().unwrap();
        assert!(!hex.is_empty());
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let keys = test_keypair();
        let ciphertext = keys.encrypt_to_base64url(b"[\"access\",\"refresh\"]").unwrap();
        let plaintext = keys.decrypt_base64url(&ciphertext).unwrap();
        assert_eq!(plaintext, b"[\"access\",\"refresh\"]");
    }

    #[test]
    fn decrypt_accepts_padded_base64() {
        let keys = test_keypair();
        let mut ciphertext = keys.encrypt_to_base64url(b"payload").unwrap();
        while ciphertext.len() % 4 != 0 {
            ciphertext.push('=');
        }
        assert_eq!(keys.decrypt_base64url(&ciphertext).unwrap(), b"payload");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let keys = test_keypair();
        let other = test_keypair();
        let ciphertext = keys.encrypt_to_base64url(b"secret").unwrap();
        let err = other.decrypt_base64url(&ciphertext).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn decrypt_rejects_garbage_encoding() {
        let keys = test_keypair();
        let err = keys.decrypt_base64url("not base64url!!").unwrap_err();
        assert!(matches!(err, CryptoError::Encoding(_)));
    }
}
