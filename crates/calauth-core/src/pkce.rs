//! PKCE parameter generation (RFC 7636).
//!
//! The authorization-code flow sends a SHA-256 *challenge* with the initial
//! redirect and proves possession of the matching *verifier* during the code
//! exchange. A separate random *state* value correlates the redirect with the
//! session that started it and defends against CSRF.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;

/// Entropy of the code verifier in bytes, before base64 encoding.
const CODE_VERIFIER_BYTES: usize = 32;

/// Entropy of the state token in bytes.
const STATE_BYTES: usize = 32;

/// Generates a cryptographically random code verifier.
///
/// 32 random bytes, base64url encoded without padding (43 characters).
pub fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(CODE_VERIFIER_BYTES))
}

/// Computes the S256 code challenge for a verifier.
///
/// Deterministic: the same verifier always yields the same challenge.
pub fn code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generates a random opaque state token for CSRF protection.
///
/// Drawn independently from the verifier so that concurrent flows cannot
/// collide on either value.
pub fn generate_state() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(STATE_BYTES))
}

/// Compares two state tokens in constant time.
///
/// A plain `==` short-circuits on the first differing byte, which leaks
/// prefix length through timing. The XOR fold below touches every byte of
/// both inputs regardless of where they differ.
pub fn state_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..n).map(|_| rng.random()).collect()
}
