//! Chat service backends.
//!
//! Supports:
//! - **Apex**: Salesforce Apex REST endpoint (session id in the path)
//! - **LLM**: generic endpoint driven by `selectedMenu`/`requestDataType`
//! - **AgentForce**: Salesforce agent API behind an OAuth client-credentials token
//!
//! All three sit behind the [`ChatBackend`] trait, so the widget never knows
//! which protocol it is speaking.

pub mod agentforce;
pub mod apex;
pub mod envelope;
pub mod llm;

pub use agentforce::AgentForceBackend;
pub use apex::ApexBackend;
pub use llm::LlmBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{ClientCredentials, TokenCache};
use crate::config::{BackendConfig, BackendKind};
use crate::error::{self, ChatError, ConfigError};
use crate::flow::model::{ChatConfig, Product, Submission};
use crate::session::{SessionId, SessionStart};
use crate::transport::HttpTransport;

/// Text sent to ask the service for the chat configuration.
pub const INITIATE_TEXT: &str = "initiate chat session";

/// Messages returned for one free-form user message, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    pub messages: Vec<String>,
}

/// One chat service protocol.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short protocol name for logs.
    fn name(&self) -> &str;

    async fn start_session(&self) -> Result<SessionStart, ChatError>;

    async fn fetch_config(&self, session: &SessionId) -> Result<ChatConfig, ChatError>;

    async fn send_message(&self, session: &SessionId, text: &str) -> Result<AgentReply, ChatError>;

    async fn submit(&self, session: &SessionId, submission: &Submission) -> Result<(), ChatError>;

    async fn search_products(
        &self,
        _session: &SessionId,
        _query: &str,
    ) -> Result<Vec<Product>, ChatError> {
        Err(ChatError::Unsupported {
            backend: self.name().to_string(),
            operation: "product search",
        })
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), ChatError>;

    /// Drop any cached credentials after the service rejected them.
    fn invalidate_credentials(&self) {}
}

/// Create the backend selected by configuration.
pub fn connect(config: &BackendConfig) -> error::Result<Arc<dyn ChatBackend>> {
    let transport = HttpTransport::new(config.http_timeout).map_err(ChatError::from)?;
    match config.kind {
        BackendKind::Apex => {
            tracing::info!("Using Apex backend ({})", config.base_url);
            Ok(Arc::new(ApexBackend::new(transport, &config.base_url)))
        }
        BackendKind::Llm => {
            tracing::info!("Using LLM backend ({})", config.base_url);
            Ok(Arc::new(LlmBackend::new(transport, &config.base_url)))
        }
        BackendKind::AgentForce => {
            let oauth = config
                .oauth
                .as_ref()
                .ok_or_else(|| ConfigError::MissingEnvVar("EXONCHAT_OAUTH_URL".to_string()))?;
            let credentials = ClientCredentials::new(
                transport.clone(),
                &oauth.token_url,
                &oauth.client_id,
                oauth.client_secret.clone(),
            );
            let tokens = TokenCache::new(credentials, oauth.token_ttl);
            tracing::info!(
                "Using AgentForce backend ({}, agent {})",
                config.base_url,
                oauth.agent_id
            );
            Ok(Arc::new(AgentForceBackend::new(
                transport,
                &config.base_url,
                &oauth.agent_id,
                tokens,
            )))
        }
    }
}
