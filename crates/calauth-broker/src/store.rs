//! The encrypted-at-rest token store.
//!
//! Owns all durable records: the token set (access token, refresh token,
//! expiry) and the optional custom client credentials. Each secret field is
//! stored individually and, when the settings enable it, sealed with the
//! password-derived key from [`calauth_core::vault`]. The expiry is always
//! plaintext: it is only a timestamp, and reading it must not cost a
//! password prompt.

use std::sync::Arc;

use calauth_core::vault;
use tracing::{debug, warn};

use crate::backend::TokenBackend;
use crate::error::BrokerResult;
use crate::host::{Host, Settings};
use crate::password::PasswordCache;

/// A secret field in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretField {
    /// The short-lived bearer token for API requests.
    AccessToken,
    /// The long-lived token used to mint new access tokens.
    RefreshToken,
    /// Custom OAuth client id, present only in custom-client mode.
    ClientId,
    /// Custom OAuth client secret, present only in custom-client mode.
    ClientSecret,
}

impl SecretField {
    fn key(self) -> &'static str {
        match self {
            Self::AccessToken => "calauth_access_token",
            Self::RefreshToken => "calauth_refresh_token",
            Self::ClientId => "calauth_client_id",
            Self::ClientSecret => "calauth_client_secret",
        }
    }
}

/// Storage key for the plaintext expiry timestamp.
const EXPIRY_KEY: &str = "calauth_expiry";

/// Placeholder some upstreams serialize for a missing refresh token; writing
/// it would persist a meaningless sentinel, so it is dropped.
const UNDEFINED_SENTINEL: &str = "undefined";

/// Encrypted key/value store for the token set and client credentials.
///
/// The store is the only component that reads or writes the durable records;
/// flows and the refresher go through it exclusively.
pub struct TokenStore {
    backend: Arc<dyn TokenBackend>,
    settings: Arc<dyn Settings>,
    host: Arc<dyn Host>,
    password: PasswordCache,
}

impl TokenStore {
    /// Creates a store over the given backend and collaborators.
    pub fn new(
        backend: Arc<dyn TokenBackend>,
        settings: Arc<dyn Settings>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            backend,
            settings,
            host,
            password: PasswordCache::new(),
        }
    }

    /// Reads the plaintext value of a secret field.
    ///
    /// Returns an empty string for a never-written field. When encryption is
    /// enabled this blocks on password acquisition; a wrong password
    /// surfaces as [`BrokerError::Integrity`], never as an empty string.
    ///
    /// [`BrokerError::Integrity`]: crate::error::BrokerError::Integrity
    pub async fn get(&self, field: SecretField) -> BrokerResult<String> {
        let raw = self.backend.get(field.key())?.unwrap_or_default();
        if raw.is_empty() || !self.settings.encrypt_tokens() {
            return Ok(raw);
        }
        let password = self.password.obtain(self.host.as_ref()).await?;
        Ok(vault::open(&raw, &password)?)
    }

    /// Writes the plaintext value of a secret field, sealing it first when
    /// encryption is enabled.
    ///
    /// Setting the refresh token to the literal `"undefined"` placeholder is
    /// a no-op.
    pub async fn set(&self, field: SecretField, plaintext: &str) -> BrokerResult<()> {
        if field == SecretField::RefreshToken && plaintext == UNDEFINED_SENTINEL {
            warn!("refusing to store the undefined refresh-token placeholder");
            return Ok(());
        }
        let value = if self.settings.encrypt_tokens() && !plaintext.is_empty() {
            let password = self.password.obtain(self.host.as_ref()).await?;
            vault::seal(plaintext, &password)?
        } else {
            plaintext.to_string()
        };
        self.backend.set(field.key(), &value)
    }

    /// Reads the access-token expiry in epoch milliseconds; 0 if never set.
    pub fn expiry(&self) -> BrokerResult<i64> {
        let raw = self.backend.get(EXPIRY_KEY)?.unwrap_or_default();
        Ok(raw.parse().unwrap_or(0))
    }

    /// Writes the access-token expiry.
    ///
    /// The expiry must only ever be set together with a fresh access token;
    /// use [`store_token_set`] or [`store_access_token`] from flow code.
    /// Negative timestamps are dropped as a no-op, the typed equivalent of
    /// the non-numeric guard the storage layer always had.
    ///
    /// [`store_token_set`]: Self::store_token_set
    /// [`store_access_token`]: Self::store_access_token
    pub fn set_expiry(&self, epoch_ms: i64) -> BrokerResult<()> {
        if epoch_ms < 0 {
            warn!(epoch_ms, "ignoring negative expiry");
            return Ok(());
        }
        self.backend.set(EXPIRY_KEY, &epoch_ms.to_string())
    }

    /// Persists a complete token set from a successful authorization.
    pub async fn store_token_set(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_at_ms: i64,
    ) -> BrokerResult<()> {
        self.set(SecretField::RefreshToken, refresh_token).await?;
        self.store_access_token(access_token, expires_at_ms).await
    }

    /// Persists a rotated access token with its expiry, leaving the refresh
    /// token untouched.
    pub async fn store_access_token(
        &self,
        access_token: &str,
        expires_at_ms: i64,
    ) -> BrokerResult<()> {
        self.set(SecretField::AccessToken, access_token).await?;
        self.set_expiry(expires_at_ms)
    }

    /// Clears access token, refresh token and expiry in one logical step.
    pub fn clear_tokens(&self) -> BrokerResult<()> {
        debug!("clearing stored token set");
        self.backend.set(SecretField::AccessToken.key(), "")?;
        self.backend.set(SecretField::RefreshToken.key(), "")?;
        self.backend.set(EXPIRY_KEY, "0")
    }

    /// Clears the custom client credentials.
    pub fn clear_credentials(&self) -> BrokerResult<()> {
        debug!("clearing stored client credentials");
        self.backend.set(SecretField::ClientId.key(), "")?;
        self.backend.set(SecretField::ClientSecret.key(), "")
    }

    /// True iff a refresh token is present.
    ///
    /// Checks the raw stored value: presence, not content, is what matters,
    /// so this never decrypts and never prompts for a password.
    pub fn is_logged_in(&self) -> BrokerResult<bool> {
        Ok(self
            .backend
            .get(SecretField::RefreshToken.key())?
            .is_some_and(|raw| !raw.is_empty()))
    }

    /// Forgets the cached encryption password (logout, settings change).
    pub fn forget_password(&self) {
        self.password.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::host::test_support::{FakeHost, FakeSettings};

    fn plain_store() -> (TokenStore, Arc<FakeHost>) {
        let host = Arc::new(FakeHost::with_password("pw"));
        let store = TokenStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(FakeSettings::default()),
            host.clone(),
        );
        (store, host)
    }

    fn encrypted_store(backend: Arc<dyn TokenBackend>, password: &str) -> (TokenStore, Arc<FakeHost>) {
        let host = Arc::new(FakeHost::with_password(password));
        let settings = FakeSettings {
            encrypt: true,
            ..FakeSettings::default()
        };
        let store = TokenStore::new(backend, Arc::new(settings), host.clone());
        (store, host)
    }

    #[tokio::test]
    async fn unset_field_reads_empty() {
        let (store, _) = plain_store();
        assert_eq!(store.get(SecretField::AccessToken).await.unwrap(), "");
        assert_eq!(store.expiry().unwrap(), 0);
    }

    #[tokio::test]
    async fn plain_roundtrip() {
        let (store, host) = plain_store();
        store.set(SecretField::AccessToken, "at").await.unwrap();
        assert_eq!(store.get(SecretField::AccessToken).await.unwrap(), "at");
        // No encryption, no prompt.
        assert_eq!(host.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn encrypted_roundtrip_prompts_once() {
        let backend: Arc<dyn TokenBackend> = Arc::new(MemoryBackend::new());
        let (store, host) = encrypted_store(backend.clone(), "pw");

        store.set(SecretField::RefreshToken, "rt").await.unwrap();
        assert_eq!(store.get(SecretField::RefreshToken).await.unwrap(), "rt");
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);

        // The raw stored value is sealed, not the plaintext.
        let raw = backend.get("calauth_refresh_token").unwrap().unwrap();
        assert_ne!(raw, "rt");
    }

    #[tokio::test]
    async fn wrong_password_surfaces_integrity_error() {
        let backend: Arc<dyn TokenBackend> = Arc::new(MemoryBackend::new());
        {
            let (store, _) = encrypted_store(backend.clone(), "correct");
            store.set(SecretField::AccessToken, "at").await.unwrap();
        }
        let (store, _) = encrypted_store(backend, "incorrect");
        let err = store.get(SecretField::AccessToken).await.unwrap_err();
        assert!(matches!(err, crate::error::BrokerError::Integrity(_)));
    }

    #[tokio::test]
    async fn undefined_refresh_token_is_dropped() {
        let (store, _) = plain_store();
        store.set(SecretField::RefreshToken, "undefined").await.unwrap();
        assert_eq!(store.get(SecretField::RefreshToken).await.unwrap(), "");
        assert!(!store.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn logged_in_tracks_raw_refresh_token() {
        let (store, host) = plain_store();
        assert!(!store.is_logged_in().unwrap());

        store.store_token_set("at", "rt", 123).await.unwrap();
        assert!(store.is_logged_in().unwrap());
        assert_eq!(store.expiry().unwrap(), 123);

        store.clear_tokens().unwrap();
        assert!(!store.is_logged_in().unwrap());
        assert_eq!(store.expiry().unwrap(), 0);
        assert_eq!(store.get(SecretField::AccessToken).await.unwrap(), "");
        assert_eq!(host.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logged_in_check_never_decrypts() {
        let backend: Arc<dyn TokenBackend> = Arc::new(MemoryBackend::new());
        let (store, host) = encrypted_store(backend, "pw");
        store.set(SecretField::RefreshToken, "rt").await.unwrap();

        let before = host.prompts.load(Ordering::SeqCst);
        assert!(store.is_logged_in().unwrap());
        assert_eq!(host.prompts.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn negative_expiry_ignored() {
        let (store, _) = plain_store();
        store.set_expiry(500).unwrap();
        store.set_expiry(-1).unwrap();
        assert_eq!(store.expiry().unwrap(), 500);
    }

    #[tokio::test]
    async fn clear_credentials() {
        let (store, _) = plain_store();
        store.set(SecretField::ClientId, "id").await.unwrap();
        store.set(SecretField::ClientSecret, "secret").await.unwrap();
        store.clear_credentials().unwrap();
        assert_eq!(store.get(SecretField::ClientId).await.unwrap(), "");
        assert_eq!(store.get(SecretField::ClientSecret).await.unwrap(), "");
    }
}
