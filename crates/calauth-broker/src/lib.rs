//! Client-side OAuth2 authorization broker for Google Calendar tokens.
//!
//! A desktop application embeds this crate to obtain, store, refresh and
//! optionally encrypt-at-rest Google API tokens. Two login protocols are
//! supported behind one interface:
//!
//! - **Local PKCE**: Authorization-Code + PKCE directly against Google,
//!   when the user registered their own OAuth client.
//! - **Server-relayed**: a relay server holding the stock client's secret
//!   performs the code exchange and returns the token set encrypted under a
//!   public key generated on the device, so the secret never reaches the
//!   device and the tokens never rest on the relay.
//!
//! # Architecture
//!
//! ```text
//! host app ──login──▶ AuthBroker ──▶ browser (consent / relay)
//!     │                   │
//!     │◀─callback──▶ SessionCorrelator ──▶ token exchange / decrypt
//!     │                   │
//! API calls ──▶ TokenRefresher ──▶ TokenStore ──▶ TokenBackend
//! ```
//!
//! The host supplies the outer world through the [`Host`] and [`Settings`]
//! collaborator traits: browser navigation, the password prompt for the
//! encrypted store, user notifications and the user-togglable settings.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use calauth_broker::{AuthBroker, BrokerConfig, CallbackParams, FileBackend, TokenRefresher};
//!
//! let config = BrokerConfig::new();
//! let backend = Arc::new(FileBackend::open(config.token_path.clone())?);
//! let broker = AuthBroker::new(config.clone(), backend, settings, host)?;
//!
//! // Login command:
//! broker.start_login().await?;
//!
//! // Protocol callback from the host:
//! broker.handle_callback(&CallbackParams::from_query(query)).await?;
//!
//! // Before every API request:
//! let refresher = TokenRefresher::new(config, broker.store_handle(), settings)?;
//! let token = refresher.valid_access_token().await?;
//! ```

pub mod backend;
pub mod callback;
pub mod config;
pub mod error;
pub mod flow;
pub mod host;
pub mod password;
pub mod refresh;
pub mod session;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, TokenBackend};
pub use callback::CallbackParams;
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use flow::AuthBroker;
pub use host::{BoxFuture, Host, Settings};
pub use refresh::TokenRefresher;
pub use session::FlowKind;
pub use store::{SecretField, TokenStore};
