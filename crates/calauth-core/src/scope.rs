//! OAuth scope allow-list.
//!
//! Callbacks carry the scope string granted by the consent screen. Only
//! calendar scopes are acceptable; anything broader aborts the flow before
//! any token is exchanged.

/// Scopes the broker is willing to accept.
///
/// The plain `/calendar` scope is kept for compatibility with older clients.
const ALLOWED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Returns true if every scope in a space-separated scope string is allowed.
///
/// An empty string is rejected: it splits into a single empty scope, which is
/// not a valid scope.
pub fn scope_allowed(scopes: &str) -> bool {
    scopes
        .split(' ')
        .all(|scope| ALLOWED_SCOPES.contains(&scope))
}
