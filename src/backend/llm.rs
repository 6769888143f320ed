//! Generic LLM endpoint. Every call after session creation is a
//! `POST {base}/session/{id}` whose body names the menu and request type.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ChatError, PayloadError};
use crate::flow::model::{ChatConfig, Product, Submission};
use crate::session::{SessionId, SessionStart};
use crate::transport::HttpTransport;

use super::envelope::{decode_config, parse_products, parse_reply, parse_session};
use super::{AgentReply, ChatBackend};

/// Menu name product searches are filed under.
pub const PRODUCT_SEARCH_MENU: &str = "Product Search";

/// Body of every session-scoped request.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest<'a> {
    pub selected_menu: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_text: Option<String>,
}

impl<'a> LlmRequest<'a> {
    pub fn init() -> Self {
        Self {
            selected_menu: "INIT",
            request_data_type: None,
            request_text: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            selected_menu: "",
            request_data_type: Some("text"),
            request_text: Some(text.to_string()),
        }
    }

    pub fn submit(submission: &'a Submission) -> Self {
        Self {
            selected_menu: &submission.menu,
            request_data_type: Some("submit"),
            request_text: Some(submission.data.to_json().to_string()),
        }
    }

    pub fn product_search(query: &str) -> Self {
        Self {
            selected_menu: PRODUCT_SEARCH_MENU,
            request_data_type: Some("productSearch"),
            request_text: Some(query.to_string()),
        }
    }
}

pub struct LlmBackend {
    transport: HttpTransport,
    base_url: String,
}

impl LlmBackend {
    pub fn new(transport: HttpTransport, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn session_url(&self, session: &SessionId) -> String {
        format!("{}/session/{}", self.base_url, session)
    }

    async fn call(&self, session: &SessionId, request: &LlmRequest<'_>) -> Result<serde_json::Value, ChatError> {
        let body = serde_json::to_value(request).map_err(PayloadError::from)?;
        Ok(self.transport.post(&self.session_url(session), &body, None).await?)
    }
}

#[async_trait]
impl ChatBackend for LlmBackend {
    fn name(&self) -> &str {
        "llm"
    }

    async fn start_session(&self) -> Result<SessionStart, ChatError> {
        let url = format!("{}/session", self.base_url);
        let start = parse_session(self.transport.get(&url, None).await?)?;
        info!(session_id = %start.session_id, "LLM session created");
        Ok(start)
    }

    async fn fetch_config(&self, session: &SessionId) -> Result<ChatConfig, ChatError> {
        let body = self.call(session, &LlmRequest::init()).await?;
        Ok(decode_config(body)?)
    }

    async fn send_message(&self, session: &SessionId, text: &str) -> Result<AgentReply, ChatError> {
        let body = self.call(session, &LlmRequest::text(text)).await?;
        Ok(parse_reply(body)?)
    }

    async fn submit(&self, session: &SessionId, submission: &Submission) -> Result<(), ChatError> {
        debug!(menu = %submission.menu, fields = submission.data.len(), "Submitting collected data");
        self.call(session, &LlmRequest::submit(submission)).await?;
        Ok(())
    }

    async fn search_products(&self, session: &SessionId, query: &str) -> Result<Vec<Product>, ChatError> {
        let body = self.call(session, &LlmRequest::product_search(query)).await?;
        let products = parse_products(body)?;
        debug!(query = query, count = products.len(), "Product search answered");
        Ok(products)
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), ChatError> {
        self.transport.delete(&self.session_url(session), None, &[]).await?;
        info!(session_id = %session, "LLM session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flow::model::UserData;

    #[test]
    fn request_bodies() {
        assert_eq!(serde_json::to_value(LlmRequest::init()).unwrap(), json!({"selectedMenu": "INIT"}));
        assert_eq!(
            serde_json::to_value(LlmRequest::text("hi")).unwrap(),
            json!({"selectedMenu": "", "requestDataType": "text", "requestText": "hi"})
        );
        assert_eq!(
            serde_json::to_value(LlmRequest::product_search("lamp")).unwrap(),
            json!({"selectedMenu": "Product Search", "requestDataType": "productSearch", "requestText": "lamp"})
        );
    }

    #[test]
    fn submit_carries_menu_and_data_as_json_text() {
        let mut data = UserData::new();
        data.insert("email", "a@b.com");
        let submission = Submission {
            menu: "Support".into(),
            data,
        };
        let body = serde_json::to_value(LlmRequest::submit(&submission)).unwrap();
        assert_eq!(body["selectedMenu"], "Support");
        assert_eq!(body["requestDataType"], "submit");
        let text: serde_json::Value =
            serde_json::from_str(body["requestText"].as_str().unwrap()).unwrap();
        assert_eq!(text, json!({"email": "a@b.com"}));
    }
}
