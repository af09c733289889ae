//! Session credential resolution
//!
//! The engine authenticates by injecting an opaque session token as the
//! site's session cookie. The token is looked up in this order:
//! 1. the environment variable named by `session.token_env`
//! 2. the inline `session.token` config value

use std::env;

use crate::config::SessionConfig;
use crate::{OutreachError, Result};

/// Opaque session token; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Accept a token that could be sent as a cookie value
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(OutreachError::Authentication(
                "session token is empty".to_string(),
            ));
        }
        if token
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == ';' || c == ',')
        {
            return Err(OutreachError::Authentication(
                "session token is malformed".to_string(),
            ));
        }
        Ok(Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken(***)")
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visible: String = self.0.chars().take(4).collect();
        write!(f, "{}***", visible)
    }
}

/// Get the session token for the configured site
pub fn resolve_session_token(config: &SessionConfig) -> Result<SessionToken> {
    if let Ok(raw) = env::var(&config.token_env) {
        tracing::info!("Using session token from ${}", config.token_env);
        return SessionToken::parse(&raw);
    }

    if let Some(raw) = &config.token {
        tracing::info!("Using session token from config file");
        return SessionToken::parse(raw);
    }

    Err(OutreachError::Authentication(format!(
        "No session token found. Set ${} or session.token in .outreach/config.toml",
        config.token_env
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_var<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let original = env::var(key).ok();
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }

        let result = f();

        match original {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }

        result
    }

    fn config_with(token_env: &str, inline: Option<&str>) -> SessionConfig {
        SessionConfig {
            token_env: token_env.to_string(),
            token: inline.map(str::to_string),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_env_takes_priority() {
        let config = config_with("OUTREACH_TEST_TOKEN_A", Some("inline-token"));
        with_env_var("OUTREACH_TEST_TOKEN_A", Some("env-token"), || {
            let token = resolve_session_token(&config).unwrap();
            assert_eq!(token.expose(), "env-token");
        });
    }

    #[test]
    fn test_inline_fallback() {
        let config = config_with("OUTREACH_TEST_TOKEN_B", Some("inline-token"));
        with_env_var("OUTREACH_TEST_TOKEN_B", None, || {
            let token = resolve_session_token(&config).unwrap();
            assert_eq!(token.expose(), "inline-token");
        });
    }

    #[test]
    fn test_missing_token() {
        let config = config_with("OUTREACH_TEST_TOKEN_C", None);
        with_env_var("OUTREACH_TEST_TOKEN_C", None, || {
            let result = resolve_session_token(&config);
            assert!(matches!(result, Err(OutreachError::Authentication(_))));
        });
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(SessionToken::parse("").is_err());
        assert!(SessionToken::parse("   ").is_err());
        assert!(SessionToken::parse("abc def").is_err());
        assert!(SessionToken::parse("abc;def").is_err());
        assert!(SessionToken::parse("abc\ndef").is_err());
        assert_eq!(SessionToken::parse("  AQEDAR  ").unwrap().expose(), "AQEDAR");
    }

    #[test]
    fn test_token_is_redacted() {
        let token = SessionToken::parse("AQEDARsecretvalue").unwrap();
        assert_eq!(format!("{:?}", token), "SessionToken(***)");
        assert_eq!(token.to_string(), "AQED***");
    }
}
