//! Collaborator interfaces provided by the embedding application.
//!
//! The broker never renders UI and never decides policy questions the host
//! owns. Everything it needs from the outside world comes through these two
//! traits: [`Host`] for side effects (browser navigation, password prompt,
//! user notification) and [`Settings`] for user-togglable configuration.

use std::future::Future;
use std::pin::Pin;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the collaborator traits object-safe, so hosts can hand
/// the broker `Arc<dyn Host>` trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Side-effect collaborators supplied by the host application.
pub trait Host: Send + Sync {
    /// Opens a URL in the user's browser (or the host's embedded view).
    ///
    /// Fire-and-forget: the broker learns the outcome only through the
    /// callback entry point, if it ever arrives.
    fn navigate_to(&self, url: &str);

    /// Asks the user for the token-encryption password.
    ///
    /// May take arbitrarily long (a modal the user can ignore). `None` means
    /// the prompt was dismissed. The broker de-duplicates concurrent calls,
    /// so a single prompt is open at a time.
    fn prompt_password(&self) -> BoxFuture<'_, Option<String>>;

    /// Shows a short, non-blocking message to the user.
    fn notify(&self, message: &str);
}

/// User-togglable settings supplied by the host application.
///
/// Read on every use rather than cached, so a settings change takes effect on
/// the next operation.
pub trait Settings: Send + Sync {
    /// True when the user supplied their own OAuth client. Selects the local
    /// PKCE flow and the direct Google refresh endpoint.
    fn use_custom_client(&self) -> bool;

    /// True when stored tokens and credentials are encrypted at rest.
    fn encrypt_tokens(&self) -> bool;

    /// Base URL of the relay server used by the server-relayed flow, without
    /// a trailing slash.
    fn relay_server_url(&self) -> String;
}
