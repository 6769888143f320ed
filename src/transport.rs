//! HTTP transport shared by every backend.
//!
//! Bodies are read as JSON when they parse and handed back as a JSON string
//! otherwise, so the typed envelope layer decides what a payload means.

use std::time::Duration;

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;

/// Thin wrapper over a `reqwest::Client` that attaches bearer tokens and maps
/// non-2xx responses to [`TransportError::Status`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: Option<&SecretString>) -> Result<Value, TransportError> {
        let request = with_auth(self.client.get(url), token);
        self.execute(url, request).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: &Value,
        token: Option<&SecretString>,
    ) -> Result<Value, TransportError> {
        let request = with_auth(self.client.post(url).json(body), token);
        self.execute(url, request).await
    }

    /// Form-encoded POST, used for OAuth token grants.
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, TransportError> {
        let request = self.client.post(url).form(form);
        self.execute(url, request).await
    }

    pub async fn delete(
        &self,
        url: &str,
        token: Option<&SecretString>,
        headers: &[(&str, &str)],
    ) -> Result<(), TransportError> {
        let mut request = with_auth(self.client.delete(url), token);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.execute(url, request).await.map(|_| ())
    }

    async fn execute(&self, url: &str, request: RequestBuilder) -> Result<Value, TransportError> {
        let resp = request.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = url, status = status.as_u16(), bytes = body.len(), "Chat service responded");
        Ok(decode_body(body))
    }
}

fn with_auth(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

/// Empty bodies become `null`; non-JSON bodies become a JSON string.
fn decode_body(body: String) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_body_variants() {
        assert_eq!(decode_body(String::new()), Value::Null);
        assert_eq!(decode_body("  \n".into()), Value::Null);
        assert_eq!(
            decode_body(r#"{"sessionId":"abc"}"#.into()),
            serde_json::json!({"sessionId": "abc"})
        );
        assert_eq!(
            decode_body("plain text reply".into()),
            Value::String("plain text reply".into())
        );
    }

    #[test]
    fn builds_with_timeout() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}
