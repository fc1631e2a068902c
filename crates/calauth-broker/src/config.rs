//! Broker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BrokerError, BrokerResult};

/// Google OAuth endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// The registered public OAuth client, used when the caller does not supply
/// a self-hosted one. The matching secret lives only on the relay server.
pub const DEFAULT_CLIENT_ID: &str =
    "783876022238-calauth-public.apps.googleusercontent.com";

/// Redirect URI registered for both the public client and custom clients.
pub const DEFAULT_REDIRECT_URI: &str = "https://calauth-redirect.vercel.app/callback";

/// Configuration for the auth broker.
///
/// Static knobs only; user-togglable settings (custom client on/off, token
/// encryption, relay server URL) come from the [`Settings`] collaborator so
/// they can change without rebuilding the broker.
///
/// [`Settings`]: crate::host::Settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Authorization endpoint.
    pub auth_url: String,

    /// Token exchange endpoint.
    pub token_url: String,

    /// Redirect URI sent with the authorization request.
    pub redirect_uri: String,

    /// OAuth scopes to request.
    ///
    /// Defaults to calendar events + readonly, the pair the consent screen
    /// grants for the stock client.
    pub scopes: Vec<String>,

    /// Request timeout for token and refresh exchanges.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// Modulus size for the relayed-login keypair.
    pub relay_key_bits: usize,

    /// Path for the file token backend, when the host does not bring its own
    /// key/value store.
    ///
    /// Defaults to `~/.local/share/calauth/tokens.json`.
    pub token_path: PathBuf,
}

impl BrokerConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration with Google endpoints and default scopes.
    pub fn new() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/calendar.events".to_string(),
                "https://www.googleapis.com/auth/calendar.readonly".to_string(),
            ],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calauth/{}", env!("CARGO_PKG_VERSION")),
            relay_key_bits: calauth_core::RSA_MODULUS_BITS,
            token_path: Self::default_token_path(),
        }
    }

    /// Returns the default token storage path.
    pub fn default_token_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".local").join("share"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calauth")
            .join("tokens.json")
    }

    /// Sets the authorization endpoint.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Sets the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Sets the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the relayed-login keypair modulus size.
    pub fn with_relay_key_bits(mut self, bits: usize) -> Self {
        self.relay_key_bits = bits;
        self
    }

    /// Sets the token storage path.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BrokerResult<()> {
        if self.scopes.is_empty() {
            return Err(BrokerError::configuration(
                "at least one OAuth scope is required",
            ));
        }
        let scope_string = self.scopes.join(" ");
        if !calauth_core::scope_allowed(&scope_string) {
            return Err(BrokerError::configuration(format!(
                "scope outside the calendar allow-list: {scope_string}"
            )));
        }
        if self.redirect_uri.is_empty() {
            return Err(BrokerError::configuration("redirect_uri is required"));
        }
        if self.relay_key_bits < 2048 {
            return Err(BrokerError::configuration(
                "relay keypair must be at least 2048 bits",
            ));
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BrokerConfig::new().validate().is_ok());
    }

    #[test]
    fn empty_scopes_rejected() {
        let config = BrokerConfig::new().with_scopes(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_calendar_scope_rejected() {
        let config = BrokerConfig::new()
            .with_scopes(vec!["https://www.googleapis.com/auth/drive".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_relay_key_rejected() {
        let config = BrokerConfig::new().with_relay_key_bits(1024);
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_methods() {
        let config = BrokerConfig::new()
            .with_token_url("http://127.0.0.1:9999/token")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.token_url, "http://127.0.0.1:9999/token");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
