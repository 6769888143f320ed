//! Conversation session lifecycle.
//!
//! Tracks the server-issued session id, guards against re-entrant
//! initialization, and stamps every session-scoped request with a
//! generation so responses from a superseded session can be dropped.

use serde::{Deserialize, Serialize};

/// Opaque server-issued session handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the backend returns when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: SessionId,
    /// First message of the session response, if any.
    pub greeting: Option<String>,
}

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session; the next user action starts one.
    #[default]
    Disconnected,
    /// A session request is in flight.
    Initializing,
    Ready(SessionId),
}

/// Session id plus the generation counter.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: SessionPhase,
    generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn id(&self) -> Option<&SessionId> {
        match &self.phase {
            SessionPhase::Ready(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self.phase, SessionPhase::Initializing)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark initialization as started. Returns false (and changes nothing)
    /// when one is already pending or a session already exists.
    pub fn begin_init(&mut self) -> bool {
        match self.phase {
            SessionPhase::Disconnected => {
                self.phase = SessionPhase::Initializing;
                true
            }
            SessionPhase::Initializing | SessionPhase::Ready(_) => false,
        }
    }

    /// Record the session created by the pending initialization.
    pub fn establish(&mut self, id: SessionId) {
        self.phase = SessionPhase::Ready(id);
    }

    /// Initialization failed; leave the session open for a retry.
    pub fn fail(&mut self) {
        self.phase = SessionPhase::Disconnected;
    }

    /// Drop the current session (auth failure) and start a new generation.
    /// Returns the new generation.
    pub fn invalidate(&mut self) -> u64 {
        self.phase = SessionPhase::Disconnected;
        self.generation += 1;
        self.generation
    }

    /// Whether a response stamped with `generation` still belongs here.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_not_reentrant() {
        let mut state = SessionState::new();
        assert!(state.begin_init());
        assert!(state.is_initializing());
        assert!(!state.begin_init(), "second init while pending must be a no-op");

        state.establish(SessionId::new("s-1"));
        assert_eq!(state.id().map(SessionId::as_str), Some("s-1"));
        assert!(!state.begin_init(), "no init while a session exists");
    }

    #[test]
    fn failure_allows_retry() {
        let mut state = SessionState::new();
        assert!(state.begin_init());
        state.fail();
        assert_eq!(state.phase(), &SessionPhase::Disconnected);
        assert!(state.begin_init());
    }

    #[test]
    fn invalidate_bumps_generation() {
        let mut state = SessionState::new();
        state.begin_init();
        state.establish(SessionId::new("old"));
        let before = state.generation();

        let after = state.invalidate();
        assert_eq!(after, before + 1);
        assert!(state.id().is_none());
        assert!(!state.is_current(before));
        assert!(state.is_current(after));
    }

    #[test]
    fn session_id_serializes_transparently() {
        let id = SessionId::new("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
        assert_eq!(id.to_string(), "abc-123");
    }
}
