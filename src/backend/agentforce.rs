//! Salesforce AgentForce agent API.
//!
//! Every call carries a bearer token from the shared [`TokenCache`]. Config
//! fetches and submissions travel as ordinary text messages.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{TokenCache, TokenSource};
use crate::error::{ChatError, PayloadError};
use crate::flow::model::{ChatConfig, Submission};
use crate::session::{SessionId, SessionStart};
use crate::transport::HttpTransport;

use super::envelope::{decode_config, parse_reply, parse_session};
use super::{AgentReply, ChatBackend, INITIATE_TEXT};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    external_session_key: String,
    instance_config: InstanceConfig,
    streaming_capabilities: StreamingCapabilities,
    bypass_user: bool,
}

#[derive(Debug, Serialize)]
struct InstanceConfig {
    endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamingCapabilities {
    chunk_types: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    message: OutgoingMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    sequence_id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

pub struct AgentForceBackend<T> {
    transport: HttpTransport,
    api_base: String,
    agent_id: String,
    tokens: TokenCache<T>,
    sequence: AtomicU64,
}

impl<T: TokenSource> AgentForceBackend<T> {
    pub fn new(transport: HttpTransport, api_base: &str, agent_id: &str, tokens: TokenCache<T>) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
            tokens,
            sequence: AtomicU64::new(1),
        }
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/einstein/ai-agent/v1/agents/{}/sessions",
            self.api_base, self.agent_id
        )
    }

    fn session_url(&self, session: &SessionId) -> String {
        format!("{}/einstein/ai-agent/v1/sessions/{}", self.api_base, session)
    }

    async fn send_text(&self, session: &SessionId, text: &str) -> Result<serde_json::Value, ChatError> {
        let token = self.tokens.get_token().await?;
        let request = MessageRequest {
            message: OutgoingMessage {
                sequence_id: self.sequence.fetch_add(1, Ordering::Relaxed),
                kind: "Text",
                text,
            },
        };
        let body = serde_json::to_value(&request).map_err(PayloadError::from)?;
        let url = format!("{}/messages", self.session_url(session));
        Ok(self.transport.post(&url, &body, Some(&token)).await?)
    }
}

#[async_trait]
impl<T: TokenSource + 'static> ChatBackend for AgentForceBackend<T> {
    fn name(&self) -> &str {
        "agentforce"
    }

    async fn start_session(&self) -> Result<SessionStart, ChatError> {
        let token = self.tokens.get_token().await?;
        let request = StartSessionRequest {
            external_session_key: uuid::Uuid::new_v4().to_string(),
            instance_config: InstanceConfig {
                endpoint: self.api_base.clone(),
            },
            streaming_capabilities: StreamingCapabilities {
                chunk_types: vec!["Text"],
            },
            bypass_user: true,
        };
        let body = serde_json::to_value(&request).map_err(PayloadError::from)?;
        let response = self
            .transport
            .post(&self.sessions_url(), &body, Some(&token))
            .await?;
        let start = parse_session(response)?;
        info!(session_id = %start.session_id, agent_id = %self.agent_id, "AgentForce session created");
        Ok(start)
    }

    async fn fetch_config(&self, session: &SessionId) -> Result<ChatConfig, ChatError> {
        let body = self.send_text(session, INITIATE_TEXT).await?;
        Ok(decode_config(body)?)
    }

    async fn send_message(&self, session: &SessionId, text: &str) -> Result<AgentReply, ChatError> {
        let body = self.send_text(session, text).await?;
        Ok(parse_reply(body)?)
    }

    async fn submit(&self, session: &SessionId, submission: &Submission) -> Result<(), ChatError> {
        debug!(menu = %submission.menu, fields = submission.data.len(), "Submitting collected data");
        let data = submission.data.to_json().to_string();
        self.send_text(session, &data).await?;
        Ok(())
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), ChatError> {
        let token = self.tokens.get_token().await?;
        self.transport
            .delete(
                &self.session_url(session),
                Some(&token),
                &[("x-session-end-reason", "UserRequest")],
            )
            .await?;
        info!(session_id = %session, "AgentForce session ended");
        Ok(())
    }

    fn invalidate_credentials(&self) {
        debug!("Dropping cached AgentForce token");
        self.tokens.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::error::AuthError;

    struct CountingSource(Arc<AtomicUsize>);

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<SecretString, AuthError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SecretString::from("tok"))
        }
    }

    fn backend(fetches: Arc<AtomicUsize>) -> AgentForceBackend<CountingSource> {
        AgentForceBackend::new(
            HttpTransport::new(Duration::from_secs(1)).unwrap(),
            "https://api.example/",
            "agent-7",
            TokenCache::new(CountingSource(fetches), Duration::from_secs(60)),
        )
    }

    #[test]
    fn urls() {
        let b = backend(Arc::default());
        assert_eq!(
            b.sessions_url(),
            "https://api.example/einstein/ai-agent/v1/agents/agent-7/sessions"
        );
        assert_eq!(
            b.session_url(&SessionId::new("s1")),
            "https://api.example/einstein/ai-agent/v1/sessions/s1"
        );
    }

    #[test]
    fn message_body_shape() {
        let request = MessageRequest {
            message: OutgoingMessage {
                sequence_id: 3,
                kind: "Text",
                text: "hello",
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"message": {"sequenceId": 3, "type": "Text", "text": "hello"}})
        );
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_token() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let b = backend(fetches.clone());
        b.tokens.get_token().await.unwrap();
        b.tokens.get_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        b.invalidate_credentials();
        b.tokens.get_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
