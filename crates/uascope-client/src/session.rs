// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session state machine and the session handle itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use uascope_codec::NodeId;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session exists yet.
    NotCreated,
    /// CreateSession is in flight.
    Creating,
    /// CreateSession succeeded; not yet activated.
    Created,
    /// ActivateSession is in flight.
    Activating,
    /// The session is usable.
    Active,
    /// The connection dropped; channel and session are being re-established.
    Reconnecting,
    /// CloseSession is in flight.
    Closing,
    /// The session is gone by request.
    Closed,
    /// The session is gone and will not come back.
    Failed,
}

impl SessionState {
    /// Returns `true` if service calls may be issued in this state.
    pub fn is_usable(self) -> bool {
        self == Self::Active
    }

    /// Returns `true` if the transition to `next` is legal. Illegal
    /// transitions are logged and refused rather than panicking.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (NotCreated, Creating)
                | (Creating, Created | Failed)
                | (Created, Activating | Failed)
                | (Activating, Active | Failed)
                | (Active, Reconnecting | Closing | Failed)
                | (Reconnecting, Active | Closing | Failed)
                | (Closing, Closed | Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotCreated => "not_created",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An established session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Token carried in every request header after activation.
    pub authentication_token: NodeId,
    /// Granted session timeout in milliseconds.
    pub revised_timeout_ms: f64,
    /// Latest server nonce.
    pub server_nonce: Option<Vec<u8>>,
    state: SessionState,
}

impl Session {
    /// Tracks a session freshly returned by CreateSession.
    pub fn created(
        session_id: NodeId,
        authentication_token: NodeId,
        revised_timeout_ms: f64,
        server_nonce: Option<Vec<u8>>,
    ) -> Self {
        Self {
            session_id,
            authentication_token,
            revised_timeout_ms,
            server_nonce,
            state: SessionState::Created,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempts a state transition. Returns `false` (and logs) if the
    /// transition is illegal; the state is left unchanged.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            warn!(from = %self.state, to = %next, "illegal session state transition refused");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::created(NodeId::numeric(1, 100), NodeId::opaque(0, vec![1; 16]), 30_000.0, None)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Created);
        assert!(s.transition(SessionState::Activating));
        assert!(s.transition(SessionState::Active));
        assert!(s.state().is_usable());
        assert!(s.transition(SessionState::Closing));
        assert!(s.transition(SessionState::Closed));
    }

    #[test]
    fn test_reconnect_cycle() {
        let mut s = session();
        s.transition(SessionState::Activating);
        s.transition(SessionState::Active);
        assert!(s.transition(SessionState::Reconnecting));
        assert!(!s.state().is_usable());
        assert!(s.transition(SessionState::Active));
        assert!(s.state().is_usable());
    }

    #[test]
    fn test_illegal_transition_is_refused() {
        let mut s = session();
        assert!(!s.transition(SessionState::Closed));
        assert_eq!(s.state(), SessionState::Created);
        assert!(!s.transition(SessionState::NotCreated));
    }
}
