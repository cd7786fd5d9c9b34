use std::path::PathBuf;
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
    /// Websocket endpoint of the lesson backend.
    pub endpoint: String,
    pub user_alias: String,
    pub language: String,
    /// Reconnect budget after the link drops; exhausting it is fatal.
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Cadence of the demo/random affect sources.
    pub affect_interval: Duration,
    /// Samples below this confidence never trigger an adaptation.
    pub confidence_threshold: f32,
    /// Pause after a tutor answer so it can be read before pacing resumes.
    pub answer_grace: Duration,
    /// Bound on waiting for a tutor answer that never arrives.
    pub answer_timeout: Duration,
    pub storage_dir: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let endpoint = std::env::var("KAIROS_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8000/ws/session/".to_string());
        let user_alias = std::env::var("KAIROS_USER_ALIAS").unwrap_or_else(|_| "User".to_string());
        let language = std::env::var("KAIROS_LANGUAGE").unwrap_or_else(|_| "es".to_string());

        let max_reconnect_attempts = env_u32("KAIROS_MAX_RECONNECT_ATTEMPTS", 5)?;
        let reconnect_delay = env_duration_ms("KAIROS_RECONNECT_DELAY_MS", 3000)?;
        let affect_interval = env_duration_ms("KAIROS_AFFECT_INTERVAL_MS", 3000)?;
        let answer_grace = env_duration_ms("KAIROS_ANSWER_GRACE_MS", 2500)?;
        let answer_timeout = env_duration_ms("KAIROS_ANSWER_TIMEOUT_MS", 90_000)?;

        let confidence_threshold = match std::env::var("KAIROS_CONFIDENCE_THRESHOLD") {
            Ok(raw) => {
                let value = raw.parse::<f32>().map_err(|e| {
                    ConfigError::InvalidValue("KAIROS_CONFIDENCE_THRESHOLD".to_string(), e.to_string())
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::InvalidValue(
                        "KAIROS_CONFIDENCE_THRESHOLD".to_string(),
                        format!("{} is outside [0, 1]", value),
                    ));
                }
                value
            }
            Err(_) => kairos_core::adaptation::DEFAULT_CONFIDENCE_THRESHOLD,
        };

        let storage_dir = std::env::var("KAIROS_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./sessions"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            endpoint,
            user_alias,
            language,
            max_reconnect_attempts,
            reconnect_delay,
            affect_interval,
            confidence_threshold,
            answer_grace,
            answer_timeout,
            storage_dir,
            log_level,
        })
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn env_duration_ms(name: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("KAIROS_WS_URL");
            env::remove_var("KAIROS_USER_ALIAS");
            env::remove_var("KAIROS_LANGUAGE");
            env::remove_var("KAIROS_MAX_RECONNECT_ATTEMPTS");
            env::remove_var("KAIROS_RECONNECT_DELAY_MS");
            env::remove_var("KAIROS_AFFECT_INTERVAL_MS");
            env::remove_var("KAIROS_CONFIDENCE_THRESHOLD");
            env::remove_var("KAIROS_ANSWER_GRACE_MS");
            env::remove_var("KAIROS_ANSWER_TIMEOUT_MS");
            env::remove_var("KAIROS_STORAGE_DIR");
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
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "ws://localhost:8000/ws/session/");
        assert_eq!(config.user_alias, "User");
        assert_eq!(config.language, "es");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.affect_interval, Duration::from_millis(3000));
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.answer_grace, Duration::from_millis(2500));
        assert_eq!(config.answer_timeout, Duration::from_millis(90_000));
        assert_eq!(config.storage_dir, PathBuf::from("./sessions"));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("KAIROS_WS_URL", "wss://lessons.example.com/ws/");
            env::set_var("KAIROS_USER_ALIAS", "Ada");
            env::set_var("KAIROS_LANGUAGE", "en");
            env::set_var("KAIROS_MAX_RECONNECT_ATTEMPTS", "2");
            env::set_var("KAIROS_RECONNECT_DELAY_MS", "500");
            env::set_var("KAIROS_CONFIDENCE_THRESHOLD", "0.75");
            env::set_var("KAIROS_STORAGE_DIR", "/var/lib/kairos");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "wss://lessons.example.com/ws/");
        assert_eq!(config.user_alias, "Ada");
        assert_eq!(config.language, "en");
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.confidence_threshold, 0.75);
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/kairos"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_invalid_reconnect_attempts() {
        clear_env_vars();
        unsafe {
            env::set_var("KAIROS_MAX_RECONNECT_ATTEMPTS", "many");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => {
                assert_eq!(var, "KAIROS_MAX_RECONNECT_ATTEMPTS")
            }
            _ => panic!("Expected InvalidValue for KAIROS_MAX_RECONNECT_ATTEMPTS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_threshold_out_of_range() {
        clear_env_vars();
        unsafe {
            env::set_var("KAIROS_CONFIDENCE_THRESHOLD", "1.5");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "KAIROS_CONFIDENCE_THRESHOLD");
                assert!(msg.contains("outside"));
            }
            _ => panic!("Expected InvalidValue for KAIROS_CONFIDENCE_THRESHOLD"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
