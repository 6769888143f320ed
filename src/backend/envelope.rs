//! Response envelopes returned by the chat services.
//!
//! Services wrap their payloads inconsistently: a config may arrive as an
//! object, as a JSON string, or inside `messageResponse` or
//! `messages[0].message`. Each decoder peels a bounded number of layers and
//! fails with a [`PayloadError`] instead of guessing.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PayloadError;
use crate::flow::model::{ChatConfig, Product};
use crate::session::{SessionId, SessionStart};

use super::AgentReply;

/// Most layers peeled while looking for a chat config.
pub const MAX_CONFIG_LAYERS: usize = 4;
/// Most layers peeled while looking for a product list.
pub const MAX_PRODUCT_LAYERS: usize = 3;

const CONFIG_KEYS: &[&str] = &["messageResponse", "messages", "message"];
const PRODUCT_KEYS: &[&str] = &["products", "result", "messageResponse", "messages", "message"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEnvelope {
    session_id: Option<String>,
    #[serde(default)]
    messages: Option<Vec<MessageEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageEntry {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyEnvelope {
    #[serde(default)]
    messages: Option<Vec<MessageEntry>>,
    #[serde(default)]
    message_response: Option<Value>,
}

/// Read `{ sessionId, messages?: [{message}] }`.
pub fn parse_session(value: Value) -> Result<SessionStart, PayloadError> {
    if !value.is_object() {
        return Err(shape("session object", &value));
    }
    let envelope: SessionEnvelope = serde_json::from_value(value)?;
    let session_id = envelope
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(PayloadError::MissingField("sessionId"))?;
    let greeting = envelope
        .messages
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|m| m.message)
        .filter(|m| !m.trim().is_empty());
    Ok(SessionStart {
        session_id: SessionId::new(session_id),
        greeting,
    })
}

/// Read a free-form reply. `messages[*].message` wins over
/// `messageResponse`; an empty body is a reply with no messages.
pub fn parse_reply(value: Value) -> Result<AgentReply, PayloadError> {
    let envelope: ReplyEnvelope = match value {
        Value::Null => return Ok(AgentReply::default()),
        Value::String(text) => return Ok(AgentReply { messages: vec![text] }),
        object @ Value::Object(_) => serde_json::from_value(object)?,
        other => return Err(shape("reply object", &other)),
    };

    if let Some(entries) = envelope.messages.filter(|m| !m.is_empty()) {
        let messages = entries.into_iter().map(|m| m.message.unwrap_or_default()).collect();
        return Ok(AgentReply { messages });
    }
    let messages = match envelope.message_response {
        Some(Value::String(text)) => vec![text],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.to_string()],
    };
    Ok(AgentReply { messages })
}

/// Find and decode the chat config inside a config-fetch response.
pub fn decode_config(value: Value) -> Result<ChatConfig, PayloadError> {
    let found = peel(
        value,
        MAX_CONFIG_LAYERS,
        |v| v.get("mainMenuItems").is_some(),
        CONFIG_KEYS,
        "mainMenuItems",
    )?;
    Ok(serde_json::from_value(found)?)
}

/// Find and decode the product array inside a product-search response.
pub fn parse_products(value: Value) -> Result<Vec<Product>, PayloadError> {
    let found = peel(value, MAX_PRODUCT_LAYERS, Value::is_array, PRODUCT_KEYS, "products")?;
    Ok(serde_json::from_value(found)?)
}

/// Unwrap layers until `done` matches. JSON strings are decoded in place and
/// do not count as a layer; moving into a nested field does.
fn peel(
    mut value: Value,
    max: usize,
    done: impl Fn(&Value) -> bool,
    keys: &[&str],
    target: &'static str,
) -> Result<Value, PayloadError> {
    for _ in 0..=max {
        if let Value::String(text) = &value {
            value = serde_json::from_str(text)?;
        }
        if done(&value) {
            return Ok(value);
        }
        value = next_layer(value, keys, target)?;
    }
    Err(PayloadError::TooDeep { max })
}

fn next_layer(value: Value, keys: &[&str], target: &'static str) -> Result<Value, PayloadError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => return Err(shape("object", &other)),
    };
    for key in keys {
        match map.remove(*key) {
            Some(Value::Array(items)) if *key == "messages" => {
                if let Some(first) = items.into_iter().next() {
                    return Ok(first);
                }
            }
            Some(Value::Null) | None => {}
            Some(inner) => return Ok(inner),
        }
    }
    Err(PayloadError::MissingField(target))
}

fn shape(expected: &'static str, found: &Value) -> PayloadError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    PayloadError::Shape {
        expected,
        found: found.to_string(),
    }
}
