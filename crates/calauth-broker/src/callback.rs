//! The structured callback request delivered by the host.
//!
//! After the browser round-trip, the host's protocol handler receives the
//! redirect and hands its parameters to the broker. A local PKCE callback
//! carries `code`, `state` and `scope`; a relayed callback carries the
//! ciphertext as `token` (or its short alias `t`).

use url::form_urlencoded;

/// Parameters of an authorization callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code (local PKCE flow).
    pub code: Option<String>,
    /// Returned CSRF state (local PKCE flow).
    pub state: Option<String>,
    /// Space-separated granted scopes (local PKCE flow).
    pub scope: Option<String>,
    /// Encrypted token set (server-relayed flow).
    pub token: Option<String>,
}

impl CallbackParams {
    /// Parses callback parameters from a raw query string (no leading `?`).
    ///
    /// Unknown parameters are ignored; `t` is accepted as an alias for
    /// `token` but never overrides an explicit `token`.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        let mut short_token = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "scope" => params.scope = Some(value),
                "token" => params.token = Some(value),
                "t" => short_token = Some(value),
                _ => {}
            }
        }
        if params.token.is_none() {
            params.token = short_token;
        }
        params
    }

    /// True if this looks like a local PKCE callback.
    pub fn is_code_callback(&self) -> bool {
        self.code.is_some()
    }

    /// True if this looks like a relayed-ciphertext callback.
    pub fn is_token_callback(&self) -> bool {
        self.token.is_some()
    }
}
