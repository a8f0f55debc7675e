use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub signaling_url: String,
    pub model: String,
    /// Backend endpoint minting ephemeral bearer tokens.
    pub mint_url: Option<String>,
    /// Direct API key, used only when no mint endpoint is configured.
    pub api_key: Option<String>,
    pub voice: String,
    pub guard_timeout: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let signaling_url = std::env::var("REALTIME_SIGNALING_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/realtime".to_string());

        let model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());

        let mint_url = std::env::var("TOKEN_MINT_URL").ok();
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if mint_url.is_none() && api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "either TOKEN_MINT_URL or OPENAI_API_KEY must be set".to_string(),
            ));
        }

        let voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let guard_timeout_str =
            std::env::var("CONNECT_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let guard_timeout = guard_timeout_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidValue("CONNECT_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            signaling_url,
            model,
            mint_url,
            api_key,
            voice,
            guard_timeout,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("REALTIME_SIGNALING_URL");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("TOKEN_MINT_URL");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("REALTIME_VOICE");
            env::remove_var("CONNECT_TIMEOUT_SECS");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-api-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.signaling_url, "https://api.openai.com/v1/realtime");
        assert_eq!(config.model, "gpt-4o-realtime-preview-2024-12-17");
        assert_eq!(config.mint_url, None);
        assert_eq!(config.api_key, Some("test-api-key".to_string()));
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.guard_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("REALTIME_SIGNALING_URL", "https://gateway.example.com/rt");
            env::set_var("REALTIME_MODEL", "custom-realtime-model");
            env::set_var("TOKEN_MINT_URL", "https://api.example.com/mint");
            env::set_var("REALTIME_VOICE", "verse");
            env::set_var("CONNECT_TIMEOUT_SECS", "20");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.signaling_url, "https://gateway.example.com/rt");
        assert_eq!(config.model, "custom-realtime-model");
        assert_eq!(
            config.mint_url,
            Some("https://api.example.com/mint".to_string())
        );
        assert_eq!(config.voice, "verse");
        assert_eq!(config.guard_timeout, Duration::from_secs(20));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_credentials() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("TOKEN_MINT_URL"));
                assert!(msg.contains("OPENAI_API_KEY"));
            }
            _ => panic!("Expected MissingVar"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-api-key");
            env::set_var("CONNECT_TIMEOUT_SECS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CONNECT_TIMEOUT_SECS"),
            _ => panic!("Expected InvalidValue for CONNECT_TIMEOUT_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-api-key");
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
