use chrono::Duration;
use std::collections::HashMap;
use thiserror::Error;

use crate::engine::{AggregationConfig, LedgerConfig, RollDetection};
use crate::portfolio::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: String,
    /// Write to stdout when unset.
    pub output_path: Option<String>,
    pub engine: EngineConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let input_path = env_map
            .get("INPUT_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("INPUT_PATH".to_string()))?;

        let output_path = env_map
            .get("OUTPUT_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let reject_negative_balance = match env_map
            .get("REJECT_NEGATIVE_BALANCE")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" => true,
            "false" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REJECT_NEGATIVE_BALANCE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let roll_enabled = match env_map
            .get("ROLL_DETECTION")
            .map(|s| s.as_str())
            .unwrap_or("on")
        {
            "on" => true,
            "off" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ROLL_DETECTION".to_string(),
                    format!("must be on or off, got {}", other),
                ))
            }
        };

        let roll_max_gap_secs = env_map
            .get("ROLL_MAX_GAP_SECS")
            .map(|s| s.as_str())
            .unwrap_or("86400")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "ROLL_MAX_GAP_SECS".to_string(),
                    "must be a non-negative number of seconds".to_string(),
                )
            })?;

        Ok(Config {
            input_path,
            output_path,
            engine: EngineConfig {
                ledger: LedgerConfig {
                    reject_negative_balance,
                },
                aggregation: AggregationConfig {
                    roll_detection: RollDetection {
                        enabled: roll_enabled,
                        max_gap: Duration::seconds(i64::from(roll_max_gap_secs)),
                    },
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("INPUT_PATH".to_string(), "/tmp/batch.json".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.input_path, "/tmp/batch.json");
        assert_eq!(config.output_path, None);
        assert!(!config.engine.ledger.reject_negative_balance);
        assert_eq!(
            config.engine.aggregation.roll_detection,
            RollDetection::default()
        );
    }

    #[test]
    fn test_missing_input_path() {
        let mut env_map = setup_required_env();
        env_map.remove("INPUT_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "INPUT_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_overrides() {
        let mut env_map = setup_required_env();
        env_map.insert("OUTPUT_PATH".to_string(), "/tmp/out.json".to_string());
        env_map.insert("REJECT_NEGATIVE_BALANCE".to_string(), "true".to_string());
        env_map.insert("ROLL_DETECTION".to_string(), "off".to_string());
        env_map.insert("ROLL_MAX_GAP_SECS".to_string(), "60".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.output_path.as_deref(), Some("/tmp/out.json"));
        assert!(config.engine.ledger.reject_negative_balance);
        let roll = &config.engine.aggregation.roll_detection;
        assert!(!roll.enabled);
        assert_eq!(roll.max_gap, Duration::seconds(60));
    }

    #[test]
    fn test_invalid_reject_negative_balance() {
        let mut env_map = setup_required_env();
        env_map.insert("REJECT_NEGATIVE_BALANCE".to_string(), "yes".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REJECT_NEGATIVE_BALANCE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_roll_detection() {
        let mut env_map = setup_required_env();
        env_map.insert("ROLL_DETECTION".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ROLL_DETECTION"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_roll_gap() {
        let mut env_map = setup_required_env();
        env_map.insert("ROLL_MAX_GAP_SECS".to_string(), "-5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ROLL_MAX_GAP_SECS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
