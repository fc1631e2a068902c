//! Just-in-time access-token refresh.
//!
//! API callers never touch the token endpoint themselves; they ask the
//! refresher for "a valid access token". The hot path is a cheap local
//! check against the stored expiry; only an expired or missing token costs
//! a network round-trip.
//!
//! A rejected refresh is not retried and not backed off: the caller simply
//! observes an unauthenticated state. Production-grade behavior would add
//! bounded retry with jitter for transient 5xx responses.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::flow::{expires_at_ms, now_ms};
use crate::host::Settings;
use crate::store::{SecretField, TokenStore};

/// Response from a refresh exchange.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Fallback expiry when the refresh response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Produces valid access tokens, refreshing through the provider or the
/// relay as needed.
pub struct TokenRefresher {
    config: BrokerConfig,
    store: Arc<TokenStore>,
    settings: Arc<dyn Settings>,
    http: reqwest::Client,
}

impl TokenRefresher {
    /// Creates a refresher over a broker's token store.
    pub fn new(
        config: BrokerConfig,
        store: Arc<TokenStore>,
        settings: Arc<dyn Settings>,
    ) -> BrokerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| BrokerError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            store,
            settings,
            http,
        })
    }

    /// Returns an access token that has not expired, refreshing it first if
    /// necessary.
    ///
    /// `Ok(None)` means the caller is effectively logged out: there is no
    /// refresh token, or the refresh exchange was rejected. The stored
    /// access token is left untouched in the rejection case.
    pub async fn valid_access_token(&self) -> BrokerResult<Option<String>> {
        let access_token = self.store.get(SecretField::AccessToken).await?;
        let expiry = self.store.expiry()?;

        if !access_token.is_empty() && expiry > now_ms() {
            return Ok(Some(access_token));
        }

        self.refresh().await
    }

    /// Performs the refresh exchange.
    async fn refresh(&self) -> BrokerResult<Option<String>> {
        let refresh_token = self.store.get(SecretField::RefreshToken).await?;
        if refresh_token.is_empty() {
            debug!("no refresh token stored, cannot refresh");
            return Ok(None);
        }

        let response = if self.settings.use_custom_client() {
            self.refresh_via_google(&refresh_token).await?
        } else {
            self.refresh_via_relay(&refresh_token).await?
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::network(format!("failed to read refresh response: {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "refresh exchange rejected");
            return Ok(None);
        }

        let refreshed: RefreshResponse = serde_json::from_str(&body).map_err(|e| {
            BrokerError::exchange(status.as_u16(), format!("invalid refresh response: {e}"))
        })?;

        let expires_at = expires_at_ms(refreshed.expires_in, DEFAULT_EXPIRES_IN_SECS);
        self.store
            .store_access_token(&refreshed.access_token, expires_at)
            .await?;

        info!("refreshed access token");
        Ok(Some(refreshed.access_token))
    }

    /// Direct refresh against the token endpoint, custom-client mode.
    async fn refresh_via_google(&self, refresh_token: &str) -> BrokerResult<reqwest::Response> {
        let client_id = self.store.get(SecretField::ClientId).await?;
        let client_secret = self.store.get(SecretField::ClientSecret).await?;

        let params = [
            ("refresh_token", refresh_token),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        self.http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| BrokerError::network(format!("refresh request failed: {e}")))
    }

    /// Refresh through the relay server, stock-client mode. The relay fills
    /// in the client credentials itself, so they travel as nulls.
    async fn refresh_via_relay(&self, refresh_token: &str) -> BrokerResult<reqwest::Response> {
        let url = format!("{}/refresh", self.settings.relay_server_url());
        let body = serde_json::json!({
            "refresh_token": refresh_token,
            "client_id": null,
            "client_secret": null,
            "grant_type": "refresh_token",
        });

        self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::network(format!("relay refresh request failed: {e}")))
    }
}
