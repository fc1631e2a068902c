//! The authorization flows and their orchestrator.
//!
//! [`AuthBroker`] drives the two competing login protocols:
//!
//! - **Local PKCE** (custom client): build the consent URL with a PKCE
//!   challenge, later exchange the returned code plus the remembered
//!   verifier for a token set, directly against Google.
//! - **Server-relayed** (stock client): send a fresh public key to the relay
//!   server, which performs the code exchange with the secret only it holds
//!   and redirects back with the token set encrypted under that key.
//!
//! Both are driven through the [`SessionCorrelator`]; a flow that completes,
//! fails or is superseded always leaves its slot idle. Exactly one protocol
//! is active per user configuration, selected by the settings collaborator.

use std::sync::Arc;

use calauth_core::{RsaKeyPair, pkce, scope_allowed};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::TokenBackend;
use crate::callback::CallbackParams;
use crate::config::{BrokerConfig, DEFAULT_CLIENT_ID};
use crate::error::{BrokerError, BrokerResult};
use crate::host::{Host, Settings};
use crate::session::{FlowKind, Session, SessionCorrelator, SessionProof};
use crate::store::{SecretField, TokenStore};

/// Expiry horizon for relayed token sets that do not carry their own
/// `expires_in` (the relay's array form never does).
pub const RELAY_TOKEN_TTL_SECS: i64 = 4000;

/// Fallback expiry when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// A relayed token set, after decryption.
///
/// The relay historically sends a bare `[access_token, refresh_token]` pair;
/// newer deployments send the token-endpoint object shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayPayload {
    Object {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_in: Option<i64>,
    },
    Pair(Vec<String>),
}

/// Orchestrates login flows and owns the transient session state.
pub struct AuthBroker {
    config: BrokerConfig,
    store: Arc<TokenStore>,
    sessions: SessionCorrelator,
    host: Arc<dyn Host>,
    settings: Arc<dyn Settings>,
    http: reqwest::Client,
}

impl AuthBroker {
    /// Creates a broker over the given backend and collaborators.
    pub fn new(
        config: BrokerConfig,
        backend: Arc<dyn TokenBackend>,
        settings: Arc<dyn Settings>,
        host: Arc<dyn Host>,
    ) -> BrokerResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| BrokerError::configuration(format!("failed to build HTTP client: {e}")))?;

        let store = Arc::new(TokenStore::new(backend, settings.clone(), host.clone()));

        Ok(Self {
            config,
            store,
            sessions: SessionCorrelator::new(),
            host,
            settings,
            http,
        })
    }

    /// The token store backing this broker.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// A shared handle to the token store, for wiring up a
    /// [`TokenRefresher`](crate::refresh::TokenRefresher).
    pub fn store_handle(&self) -> Arc<TokenStore> {
        Arc::clone(&self.store)
    }

    /// The broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Starts whichever login flow the current settings select.
    pub async fn start_login(&self) -> BrokerResult<()> {
        if self.settings.use_custom_client() {
            self.start_local_flow().await
        } else {
            self.start_relay_flow().await
        }
    }

    /// Starts the local PKCE flow: generates the PKCE parameters, records
    /// the session and navigates the browser to the consent page.
    ///
    /// A pending local flow is overwritten; its state will never match again.
    pub async fn start_local_flow(&self) -> BrokerResult<()> {
        let client_id = self.client_id().await?;

        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::code_challenge(&verifier);
        let state = pkce::generate_state();

        let auth_url = self.build_auth_url(&client_id, &challenge, &state);
        self.sessions.begin(
            FlowKind::LocalPkce,
            Session::new(state, SessionProof::Verifier(verifier)),
        );

        info!("starting local PKCE flow, opening consent page");
        debug!(url = %auth_url, "authorization URL");
        self.host.navigate_to(&auth_url);
        Ok(())
    }

    /// Finishes the local PKCE flow with the code and state from the
    /// callback.
    ///
    /// Silently does nothing when no local flow is pending. A state
    /// mismatch aborts with [`BrokerError::CsrfMismatch`] and leaves the
    /// pending session untouched, so a late or forged callback cannot burn
    /// the real one.
    pub async fn finish_local_flow(&self, code: &str, returned_state: &str) -> BrokerResult<()> {
        if !self.sessions.is_pending(FlowKind::LocalPkce) {
            debug!("ignoring code callback with no pending local flow");
            return Ok(());
        }

        let Some(session) = self.sessions.take_if_state(FlowKind::LocalPkce, returned_state)
        else {
            return Err(BrokerError::CsrfMismatch);
        };
        let SessionProof::Verifier(verifier) = session.proof else {
            // A local session always carries a verifier.
            return Err(BrokerError::CsrfMismatch);
        };

        // The session is consumed: whatever happens below, the flow is idle
        // again and a failed exchange is not retried.
        let token = self.exchange_code(code, &verifier).await?;
        self.store_token_response(&token).await?;

        info!("local PKCE flow complete");
        self.host.notify("Login successful");
        Ok(())
    }

    /// Starts the server-relayed flow.
    ///
    /// Generates a keypair and sends the public key to the relay as the
    /// correlation token. If a relayed flow is already pending its keypair
    /// is reused: the relay has already seen that key, and generating
    /// another would only orphan the first.
    pub async fn start_relay_flow(&self) -> BrokerResult<()> {
        let state = match self.sessions.pending_state(FlowKind::ServerRelayed) {
            Some(state) => {
                warn!("relayed flow already pending, re-sending the same key");
                state
            }
            None => {
                let keys = RsaKeyPair::generate_with_bits(self.config.relay_key_bits)?;
                let state = keys.public_key_hex()?;
                self.sessions.begin(
                    FlowKind::ServerRelayed,
                    Session::new(state.clone(), SessionProof::Keypair(keys)),
                );
                state
            }
        };

        let login_url = format!("{}/login?key={}", self.settings.relay_server_url(), state);
        info!("starting relayed flow, opening relay login page");
        self.host.navigate_to(&login_url);
        Ok(())
    }

    /// Finishes the server-relayed flow with the ciphertext from the
    /// callback.
    ///
    /// Silently does nothing when no relayed flow is pending. Possession of
    /// the session's private key is the correlation check; decryption or
    /// parse failure surfaces as an exchange error with the session already
    /// cleared.
    pub async fn finish_relay_flow(&self, ciphertext: &str) -> BrokerResult<()> {
        let Some(session) = self.sessions.take(FlowKind::ServerRelayed) else {
            debug!("ignoring token callback with no pending relayed flow");
            return Ok(());
        };
        let SessionProof::Keypair(keys) = session.proof else {
            return Err(BrokerError::exchange(0, "relayed session without keypair"));
        };

        let plaintext = keys
            .decrypt_base64url(ciphertext)
            .map_err(|e| BrokerError::exchange(0, format!("cannot decrypt relayed tokens: {e}")))?;
        let payload: RelayPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| BrokerError::exchange(0, format!("malformed relayed tokens: {e}")))?;

        let (access_token, refresh_token, expires_in) = match payload {
            RelayPayload::Object {
                access_token,
                refresh_token,
                expires_in,
            } => (access_token, refresh_token, expires_in),
            RelayPayload::Pair(mut pair) => {
                if pair.len() < 2 {
                    return Err(BrokerError::exchange(0, "relayed token pair is incomplete"));
                }
                let refresh = pair.remove(1);
                let access = pair.remove(0);
                (access, Some(refresh), None)
            }
        };

        let expires_at = expires_at_ms(expires_in, RELAY_TOKEN_TTL_SECS);
        if let Some(refresh_token) = refresh_token.as_deref() {
            self.store.set(SecretField::RefreshToken, refresh_token).await?;
        }
        self.store.store_access_token(&access_token, expires_at).await?;

        info!("relayed flow complete");
        self.host.notify("Login successful");
        Ok(())
    }

    /// Entry point for the host's protocol callback.
    ///
    /// Enforces the callback policy: nothing is honored while already logged
    /// in; code callbacks must carry an allow-listed scope and a state. CSRF
    /// and scope rejections abort silently (logged, no user notification —
    /// a known UX gap kept from the original behavior); exchange failures
    /// notify the user and propagate.
    pub async fn handle_callback(&self, params: &CallbackParams) -> BrokerResult<()> {
        if self.store.is_logged_in()? {
            warn!("ignoring authorization callback while already logged in");
            return Ok(());
        }

        let result = if params.is_token_callback() {
            let token = params.token.as_deref().unwrap_or_default();
            self.finish_relay_flow(token).await
        } else if params.is_code_callback() {
            let scope = params.scope.as_deref().unwrap_or_default();
            if !scope_allowed(scope) {
                Err(BrokerError::ScopeRejected(scope.to_string()))
            } else {
                let code = params.code.as_deref().unwrap_or_default();
                let state = params.state.as_deref().unwrap_or_default();
                self.finish_local_flow(code, state).await
            }
        } else {
            debug!("callback carried neither code nor token, ignoring");
            Ok(())
        };

        match result {
            Err(BrokerError::CsrfMismatch) => {
                warn!("dropping callback with mismatched state");
                Ok(())
            }
            Err(BrokerError::ScopeRejected(scope)) => {
                warn!(%scope, "dropping callback with disallowed scope");
                Ok(())
            }
            Err(err) => {
                self.host.notify(&format!("Login failed: {err}"));
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Logs out: clears the token set, the cached password and any pending
    /// sessions. Custom client credentials are kept; they are settings, not
    /// session state.
    pub async fn logout(&self) -> BrokerResult<()> {
        self.store.clear_tokens()?;
        self.store.forget_password();
        self.sessions.reset();
        info!("logged out");
        self.host.notify("Logged out");
        Ok(())
    }

    /// Invalidates everything bound to the current OAuth client: called when
    /// switching between the default and a custom client, since tokens from
    /// one client are useless under the other.
    pub async fn on_client_change(&self) -> BrokerResult<()> {
        self.store.clear_tokens()?;
        self.store.clear_credentials()?;
        self.store.forget_password();
        self.sessions.reset();
        info!("cleared tokens and credentials after client change");
        Ok(())
    }

    /// Resolves the client id for the active mode.
    async fn client_id(&self) -> BrokerResult<String> {
        if self.settings.use_custom_client() {
            let id = self.store.get(SecretField::ClientId).await?;
            if id.is_empty() {
                return Err(BrokerError::configuration(
                    "custom client selected but no client id is stored",
                ));
            }
            Ok(id)
        } else {
            Ok(DEFAULT_CLIENT_ID.to_string())
        }
    }

    /// Builds the authorization URL for the local PKCE flow.
    fn build_auth_url(&self, client_id: &str, challenge: &str, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&\
            code_challenge_method=S256&code_challenge={}&access_type=offline&prompt=consent",
            self.config.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
            urlencoding::encode(challenge),
        )
    }

    /// Exchanges an authorization code for a token set.
    async fn exchange_code(&self, code: &str, verifier: &str) -> BrokerResult<TokenResponse> {
        let client_id = self.client_id().await?;
        let client_secret = self.store.get(SecretField::ClientSecret).await?;

        let params = [
            ("code", code),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| BrokerError::network(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(BrokerError::exchange(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            BrokerError::exchange(status.as_u16(), format!("invalid token response: {e}"))
        })
    }

    /// Persists a token-endpoint response.
    ///
    /// The refresh token is only written when present; a rotation response
    /// without one must not clobber the stored value.
    async fn store_token_response(&self, token: &TokenResponse) -> BrokerResult<()> {
        if let Some(refresh_token) = token.refresh_token.as_deref() {
            self.store.set(SecretField::RefreshToken, refresh_token).await?;
        }
        let expires_at = expires_at_ms(token.expires_in, DEFAULT_EXPIRES_IN_SECS);
        self.store
            .store_access_token(&token.access_token, expires_at)
            .await
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a server-supplied `expires_in` (seconds) into an absolute epoch-ms
/// expiry. Saturating: an absurd lifetime clamps instead of overflowing.
pub(crate) fn expires_at_ms(expires_in: Option<i64>, fallback_secs: i64) -> i64 {
    now_ms().saturating_add(expires_in.unwrap_or(fallback_secs).saturating_mul(1000))
}
