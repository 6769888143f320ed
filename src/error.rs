//! Error types for exonchat.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Network-level failures talking to the chat service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Bearer token acquisition errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token request failed: {reason}")]
    TokenRequest { reason: String },

    #[error("Token endpoint response carried no access_token")]
    MissingToken,
}

/// A response body that does not have the shape we expect.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Expected {expected}, found {found}")]
    Shape {
        expected: &'static str,
        found: String,
    },

    #[error("Payload nested deeper than {max} layers")]
    TooDeep { max: usize },
}

/// Logic errors inside a guided flow: the selection no longer resolves
/// against the loaded config.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("No chat configuration loaded")]
    NoConfig,

    #[error("Menu item {index} does not exist")]
    UnknownMenuItem { index: usize },

    #[error("No menu item named {label:?}")]
    UnknownOption { label: String },
}

/// Errors surfaced by a [`ChatBackend`](crate::backend::ChatBackend).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Malformed payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("No active session")]
    NoSession,

    #[error("Session was replaced before the response arrived")]
    Superseded,

    #[error("Backend {backend} does not support {operation}")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },
}

impl ChatError {
    /// HTTP 401/404 on a session-scoped call means the session is gone.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Status {
                status: 401 | 404,
                ..
            })
        )
    }

    /// Whether the server answered with something we could not read.
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ChatError {
        ChatError::Transport(TransportError::Status {
            url: "https://chat.example/session/1".into(),
            status: code,
            body: String::new(),
        })
    }

    #[test]
    fn unauthorized_and_not_found_expire_the_session() {
        assert!(status(401).is_session_expired());
        assert!(status(404).is_session_expired());
        assert!(!status(500).is_session_expired());
        assert!(!ChatError::NoSession.is_session_expired());
    }

    #[test]
    fn payload_errors_are_classified() {
        let err: ChatError = PayloadError::MissingField("sessionId").into();
        assert!(err.is_payload());
        assert!(!status(400).is_payload());
        assert_eq!(err.to_string(), "Malformed payload: Missing field: sessionId");
    }
}
