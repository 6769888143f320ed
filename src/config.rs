//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which chat service protocol the widget talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Salesforce Apex REST endpoint.
    Apex,
    /// Salesforce AgentForce agent API (OAuth-backed).
    AgentForce,
    /// Generic LLM endpoint using the `selectedMenu` protocol.
    Llm,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apex" => Ok(Self::Apex),
            "agentforce" | "agent_force" => Ok(Self::AgentForce),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::InvalidValue {
                key: "EXONCHAT_BACKEND".into(),
                message: format!("unknown backend {other:?} (expected apex, agentforce or llm)"),
            }),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Apex => "apex",
            Self::AgentForce => "agentforce",
            Self::Llm => "llm",
        };
        write!(f, "{s}")
    }
}

/// OAuth client-credentials settings for AgentForce.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub agent_id: String,
    /// How long a fetched token is trusted before it is fetched again.
    pub token_ttl: Duration,
}

/// Connection settings for the chat service.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Service base URL, without a trailing slash.
    pub base_url: String,
    pub http_timeout: Duration,
    /// Present only for [`BackendKind::AgentForce`].
    pub oauth: Option<OAuthConfig>,
}

/// Default token lifetime: 50 minutes.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

impl BackendConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = match lookup("EXONCHAT_BACKEND") {
            Some(raw) => raw.parse()?,
            None => BackendKind::Apex,
        };

        let base_url = required(&lookup, "EXONCHAT_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        let http_timeout = Duration::from_secs(parse_or(&lookup, "EXONCHAT_HTTP_TIMEOUT_SECS", 30)?);

        let oauth = if kind == BackendKind::AgentForce {
            Some(OAuthConfig {
                token_url: required(&lookup, "EXONCHAT_OAUTH_URL")?,
                client_id: required(&lookup, "EXONCHAT_CLIENT_ID")?,
                client_secret: SecretString::from(required(&lookup, "EXONCHAT_CLIENT_SECRET")?),
                agent_id: required(&lookup, "EXONCHAT_AGENT_ID")?,
                token_ttl: Duration::from_secs(parse_or(
                    &lookup,
                    "EXONCHAT_TOKEN_TTL_SECS",
                    DEFAULT_TOKEN_TTL.as_secs(),
                )?),
            })
        } else {
            None
        };

        Ok(Self {
            kind,
            base_url,
            http_timeout,
            oauth,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        None => Ok(default),
    }
}

/// Delays that pace the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Typing indicator shown before the server greeting.
    pub greeting: Duration,
    /// Typing indicator shown before each instruction prompt.
    pub typing: Duration,
    /// Pause before the main menu appears.
    pub menu_reveal: Duration,
    /// Pause before an instruction that needs no input advances by itself.
    pub auto_advance: Duration,
    /// Pause before the return menu appears after a submission.
    pub return_menu: Duration,
    /// Reset delay after an acknowledgement or an unresolvable option.
    pub acknowledgement_reset: Duration,
    /// Reset delay after a submission with no return menu.
    pub completion_reset: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            greeting: Duration::from_millis(1000),
            typing: Duration::from_millis(1000),
            menu_reveal: Duration::from_millis(500),
            auto_advance: Duration::from_millis(800),
            return_menu: Duration::from_millis(1000),
            acknowledgement_reset: Duration::from_secs(3),
            completion_reset: Duration::from_secs(4),
        }
    }
}

impl Pacing {
    /// No delays at all. Headless drivers and tests use this.
    pub fn immediate() -> Self {
        Self {
            greeting: Duration::ZERO,
            typing: Duration::ZERO,
            menu_reveal: Duration::ZERO,
            auto_advance: Duration::ZERO,
            return_menu: Duration::ZERO,
            acknowledgement_reset: Duration::ZERO,
            completion_reset: Duration::ZERO,
        }
    }
}

/// Settings owned by the widget surface.
#[derive(Debug, Clone, Default)]
pub struct WidgetConfig {
    /// Shown when the server's session response carries no greeting.
    pub welcome_message: Option<String>,
    pub title: Option<String>,
    pub pacing: Pacing,
}

impl WidgetConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            welcome_message: non_empty("EXONCHAT_WELCOME_MESSAGE"),
            title: non_empty("EXONCHAT_TITLE"),
            pacing: Pacing::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_apex() {
        let config =
            BackendConfig::from_lookup(lookup(&[("EXONCHAT_BASE_URL", "https://chat.example/api/")]))
                .unwrap();
        assert_eq!(config.kind, BackendKind::Apex);
        assert_eq!(config.base_url, "https://chat.example/api");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.oauth.is_none());
    }

    #[test]
    fn missing_base_url_is_reported() {
        let err = BackendConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EXONCHAT_BASE_URL"));
    }

    #[test]
    fn agentforce_requires_oauth_settings() {
        let err = BackendConfig::from_lookup(lookup(&[
            ("EXONCHAT_BACKEND", "AgentForce"),
            ("EXONCHAT_BASE_URL", "https://api.example"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EXONCHAT_OAUTH_URL"));

        let config = BackendConfig::from_lookup(lookup(&[
            ("EXONCHAT_BACKEND", "agentforce"),
            ("EXONCHAT_BASE_URL", "https://api.example"),
            ("EXONCHAT_OAUTH_URL", "https://login.example/services/oauth2/token"),
            ("EXONCHAT_CLIENT_ID", "client"),
            ("EXONCHAT_CLIENT_SECRET", "s3cret"),
            ("EXONCHAT_AGENT_ID", "0Xx000"),
        ]))
        .unwrap();
        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.client_secret.expose_secret(), "s3cret");
        assert_eq!(oauth.token_ttl, DEFAULT_TOKEN_TTL);
    }

    #[test]
    fn rejects_unknown_backend_and_bad_numbers() {
        let err = BackendConfig::from_lookup(lookup(&[
            ("EXONCHAT_BACKEND", "soap"),
            ("EXONCHAT_BASE_URL", "https://x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = BackendConfig::from_lookup(lookup(&[
            ("EXONCHAT_BASE_URL", "https://x"),
            ("EXONCHAT_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EXONCHAT_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn widget_config_ignores_blank_values() {
        let config = WidgetConfig::from_lookup(lookup(&[
            ("EXONCHAT_WELCOME_MESSAGE", "  "),
            ("EXONCHAT_TITLE", "Support"),
        ]));
        assert!(config.welcome_message.is_none());
        assert_eq!(config.title.as_deref(), Some("Support"));
        assert_eq!(config.pacing, Pacing::default());
    }

    #[test]
    fn immediate_pacing_is_all_zero() {
        let p = Pacing::immediate();
        assert_eq!(p.typing, Duration::ZERO);
        assert_eq!(p.completion_reset, Duration::ZERO);
    }
}
