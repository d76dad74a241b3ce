//! Configuration error types.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert!(ConfigError::Invalid("x".into()).user_message().contains("Invalid"));
        assert!(ConfigError::ParseError("x".into())
            .user_message()
            .contains("malformed"));
        assert!(ConfigError::NotFound("x".into())
            .user_message()
            .contains("defaults"));
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ConfigError::Invalid("upstream.request_timeout_secs: Timeout must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: upstream.request_timeout_secs: Timeout must be greater than 0"
        );
    }
}
