//! Free-form agent bridge: the waiting gate and how replies are shown.

use crate::backend::AgentReply;
use crate::error::ChatError;

pub const STILL_CONNECTING: &str = "I'm still connecting. Please try again in a moment.";
pub const BLANK_REPLY: &str = "Sorry, I couldn't process that.";
pub const NO_REPLY: &str = "I received your message but couldn't generate a response.";
pub const RECONNECTING: &str = "My connection expired. Reconnecting...";
pub const AGENT_FAILED: &str = "I encountered an error. Please try again later.";

/// Whether a free-form message is awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    /// Sent under session generation `generation`.
    Waiting { generation: u64 },
}

/// What the widget should do with a finished free-form exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Show this bot message.
    Reply(String),
    /// The session is gone: show [`RECONNECTING`] and start a new one.
    Reconnect,
    /// Show [`AGENT_FAILED`].
    Failed,
}

#[derive(Debug, Default)]
pub struct AgentBridge {
    state: AgentState,
}

impl AgentBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, AgentState::Waiting { .. })
    }

    /// Claim the gate for a message sent under `generation`. Returns false
    /// when a reply is already pending.
    pub fn begin(&mut self, generation: u64) -> bool {
        if self.is_waiting() {
            return false;
        }
        self.state = AgentState::Waiting { generation };
        true
    }

    /// Release the gate and classify the result.
    pub fn finish(&mut self, result: Result<AgentReply, ChatError>) -> AgentOutcome {
        self.state = AgentState::Idle;
        match result {
            Ok(reply) => AgentOutcome::Reply(reply_text(&reply).to_string()),
            Err(e) if e.is_session_expired() => AgentOutcome::Reconnect,
            Err(_) => AgentOutcome::Failed,
        }
    }

    /// Release the gate without an outcome (session replaced underneath).
    pub fn abandon(&mut self) {
        self.state = AgentState::Idle;
    }
}

/// Text to show for a reply: its first message, with fallbacks for a blank
/// first message and for no messages at all.
pub fn reply_text(reply: &AgentReply) -> &str {
    match reply.messages.first() {
        Some(first) if !first.trim().is_empty() => first,
        Some(_) => BLANK_REPLY,
        None => NO_REPLY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    fn status(code: u16) -> ChatError {
        ChatError::Transport(TransportError::Status {
            url: "https://chat.example/s".into(),
            status: code,
            body: String::new(),
        })
    }

    fn reply(messages: &[&str]) -> AgentReply {
        AgentReply {
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn gate_blocks_second_message() {
        let mut bridge = AgentBridge::new();
        assert!(bridge.begin(0));
        assert!(!bridge.begin(0));
        assert_eq!(bridge.state(), AgentState::Waiting { generation: 0 });

        bridge.finish(Ok(reply(&["hi"])));
        assert!(!bridge.is_waiting());
        assert!(bridge.begin(1));
    }

    #[test]
    fn gate_clears_on_every_path() {
        for result in [Ok(reply(&[])), Err(status(401)), Err(status(500)), Err(ChatError::NoSession)] {
            let mut bridge = AgentBridge::new();
            bridge.begin(0);
            bridge.finish(result);
            assert!(!bridge.is_waiting());
        }
    }

    #[test]
    fn outcomes() {
        let mut bridge = AgentBridge::new();
        assert_eq!(
            bridge.finish(Ok(reply(&["first", "second"]))),
            AgentOutcome::Reply("first".into())
        );
        assert_eq!(bridge.finish(Ok(reply(&[" "]))), AgentOutcome::Reply(BLANK_REPLY.into()));
        assert_eq!(bridge.finish(Ok(reply(&[]))), AgentOutcome::Reply(NO_REPLY.into()));
        assert_eq!(bridge.finish(Err(status(401))), AgentOutcome::Reconnect);
        assert_eq!(bridge.finish(Err(status(404))), AgentOutcome::Reconnect);
        assert_eq!(bridge.finish(Err(status(503))), AgentOutcome::Failed);
    }
}
