//! In-memory correlation of redirect-based authorization flows.
//!
//! A flow spans two externally triggered events: `start` (we navigate the
//! browser away) and `end` (the host delivers the callback, possibly much
//! later or never). The correlator holds the single in-flight [`Session`]
//! per flow kind in between.
//!
//! Starting a new flow while one is pending overwrites it: the previous flow
//! is abandoned silently except for a WARN. That non-atomicity is
//! documented behavior, not an accident; a pending session also has no TTL,
//! only a `started_at` stamp a host can use to add one.

use calauth_core::{RsaKeyPair, pkce};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::warn;

/// The two competing authorization protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Authorization-Code + PKCE against Google directly, using a custom
    /// OAuth client the user registered.
    LocalPkce,
    /// Delegated flow: the relay server exchanges the code and returns the
    /// token set encrypted under a keypair generated here.
    ServerRelayed,
}

/// What the session must remember to finish its flow.
pub enum SessionProof {
    /// The PKCE code verifier, revealed during the code exchange.
    Verifier(String),
    /// The keypair whose private half decrypts the relayed token set.
    Keypair(RsaKeyPair),
}

/// A single in-flight authorization attempt.
pub struct Session {
    /// CSRF correlation token. For the relayed flow this is the serialized
    /// public key, which doubles as the correlation value.
    pub state: String,
    /// Flow-kind-specific proof material.
    pub proof: SessionProof,
    /// When the flow started; informational only.
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session starting now.
    pub fn new(state: impl Into<String>, proof: SessionProof) -> Self {
        Self {
            state: state.into(),
            proof,
            started_at: Utc::now(),
        }
    }
}

/// Holds at most one pending [`Session`] per [`FlowKind`].
#[derive(Default)]
pub struct SessionCorrelator {
    local: Mutex<Option<Session>>,
    relay: Mutex<Option<Session>>,
}

impl SessionCorrelator {
    /// Creates an idle correlator.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: FlowKind) -> &Mutex<Option<Session>> {
        match kind {
            FlowKind::LocalPkce => &self.local,
            FlowKind::ServerRelayed => &self.relay,
        }
    }

    /// Installs a new pending session, abandoning any previous one.
    pub fn begin(&self, kind: FlowKind, session: Session) {
        let mut slot = self.slot(kind).lock().unwrap();
        if slot.is_some() {
            warn!(?kind, "abandoning pending authorization session");
        }
        *slot = Some(session);
    }

    /// True if a flow of this kind is pending.
    pub fn is_pending(&self, kind: FlowKind) -> bool {
        self.slot(kind).lock().unwrap().is_some()
    }

    /// Returns the pending session's state without consuming it.
    pub fn pending_state(&self, kind: FlowKind) -> Option<String> {
        self.slot(kind)
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.state.clone())
    }

    /// Consumes the pending session unconditionally.
    pub fn take(&self, kind: FlowKind) -> Option<Session> {
        self.slot(kind).lock().unwrap().take()
    }

    /// Consumes the pending session only if the returned state matches.
    ///
    /// The comparison is constant-time. On mismatch the session stays
    /// pending, untouched; the rejection is idempotent.
    pub fn take_if_state(&self, kind: FlowKind, returned_state: &str) -> Option<Session> {
        let mut slot = self.slot(kind).lock().unwrap();
        match slot.as_ref() {
            Some(session) if pkce::state_eq(&session.state, returned_state) => slot.take(),
            _ => None,
        }
    }

    /// Drops any pending sessions (logout, shutdown).
    pub fn reset(&self) {
        self.local.lock().unwrap().take();
        self.relay.lock().unwrap().take();
    }
}
