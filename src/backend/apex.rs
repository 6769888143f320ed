//! Apex REST protocol: `GET {base}` opens a session, everything else is a
//! `POST {base}/{sessionId}`.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::flow::model::{ChatConfig, Submission};
use crate::session::{SessionId, SessionStart};
use crate::transport::HttpTransport;

use super::envelope::{decode_config, parse_reply, parse_session};
use super::{AgentReply, ChatBackend, INITIATE_TEXT};

pub struct ApexBackend {
    transport: HttpTransport,
    base_url: String,
}

impl ApexBackend {
    pub fn new(transport: HttpTransport, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn session_url(&self, session: &SessionId) -> String {
        format!("{}/{}", self.base_url, session)
    }
}

#[async_trait]
impl ChatBackend for ApexBackend {
    fn name(&self) -> &str {
        "apex"
    }

    async fn start_session(&self) -> Result<SessionStart, ChatError> {
        let body = self.transport.get(&self.base_url, None).await?;
        let start = parse_session(body)?;
        info!(session_id = %start.session_id, "Apex session created");
        Ok(start)
    }

    async fn fetch_config(&self, session: &SessionId) -> Result<ChatConfig, ChatError> {
        let body = self
            .transport
            .post(&self.session_url(session), &json!({ "text": INITIATE_TEXT }), None)
            .await?;
        Ok(decode_config(body)?)
    }

    async fn send_message(&self, session: &SessionId, text: &str) -> Result<AgentReply, ChatError> {
        let body = self
            .transport
            .post(&self.session_url(session), &json!({ "text": text }), None)
            .await?;
        Ok(parse_reply(body)?)
    }

    async fn submit(&self, session: &SessionId, submission: &Submission) -> Result<(), ChatError> {
        debug!(menu = %submission.menu, fields = submission.data.len(), "Submitting collected data");
        self.transport
            .post(&self.session_url(session), &submission.data.to_json(), None)
            .await?;
        Ok(())
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), ChatError> {
        self.transport.delete(&self.session_url(session), None, &[]).await?;
        info!(session_id = %session, "Apex session ended");
        Ok(())
    }
}
