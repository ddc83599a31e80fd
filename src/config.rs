use std::env;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::HashAlgorithm;
use crate::encoding::KeyOrder;
use crate::error_handling::RetryConfig;
use crate::solver::SolverConfig;
use crate::types::Budget;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Challenge service
    pub access_token: String,
    pub problem_url: String,
    pub solution_url: String,

    // Search tuning
    pub workers: usize,
    pub chunk_size: u64,
    pub max_attempts: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub hash: HashAlgorithm,
    pub key_order: KeyOrder,

    // Error handling and recovery
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    // Monitoring and logging
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        let solver = SolverConfig::default();
        Self {
            access_token: String::new(),
            problem_url: "https://hackattic.com/challenges/mini_miner/problem".to_string(),
            solution_url: "https://hackattic.com/challenges/mini_miner/solve".to_string(),

            workers: solver.workers,
            chunk_size: solver.chunk_size,
            max_attempts: None,
            timeout_ms: None,
            hash: solver.hash,
            key_order: solver.key_order,

            max_retries: solver.max_retries,
            retry_delay_ms: 1000,

            log_level: "info".to_string(),
            metrics_enabled: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
    val.parse()
        .map_err(|_| ConfigError::InvalidEnvVar(name.to_string(), val))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Required configuration
        // `access_token` is the name older .env files use
        config.access_token = lookup("ACCESS_TOKEN")
            .or_else(|| lookup("access_token"))
            .ok_or_else(|| ConfigError::MissingEnvVar("ACCESS_TOKEN".to_string()))?;

        // Optional configuration with defaults
        if let Some(val) = lookup("PROBLEM_URL") {
            config.problem_url = val;
        }

        if let Some(val) = lookup("SOLUTION_URL") {
            config.solution_url = val;
        }

        if let Some(val) = lookup("MINER_WORKERS") {
            config.workers = parse_var("MINER_WORKERS", val)?;
        }

        if let Some(val) = lookup("MINER_CHUNK_SIZE") {
            config.chunk_size = parse_var("MINER_CHUNK_SIZE", val)?;
        }

        if let Some(val) = lookup("MINER_MAX_ATTEMPTS") {
            config.max_attempts = Some(parse_var("MINER_MAX_ATTEMPTS", val)?);
        }

        if let Some(val) = lookup("MINER_TIMEOUT_MS") {
            config.timeout_ms = Some(parse_var("MINER_TIMEOUT_MS", val)?);
        }

        if let Some(val) = lookup("HASH_ALGORITHM") {
            config.hash = parse_var("HASH_ALGORITHM", val)?;
        }

        if let Some(val) = lookup("KEY_ORDER") {
            config.key_order = parse_var("KEY_ORDER", val)?;
        }

        // Error handling
        if let Some(val) = lookup("MAX_RETRIES") {
            config.max_retries = parse_var("MAX_RETRIES", val)?;
        }

        if let Some(val) = lookup("RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_var("RETRY_DELAY_MS", val)?;
        }

        // Logging and metrics
        if let Some(val) = lookup("LOG_LEVEL") {
            config.log_level = val;
        }

        if let Some(val) = lookup("METRICS_ENABLED") {
            config.metrics_enabled = val == "1";
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.is_empty() {
            return Err(ConfigError::ValidationError("ACCESS_TOKEN is required".to_string()));
        }

        for (name, url) in [("PROBLEM_URL", &self.problem_url), ("SOLUTION_URL", &self.solution_url)] {
            if !url.starts_with("http") {
                return Err(ConfigError::ValidationError(format!("{name} must be a valid HTTP URL")));
            }
        }

        self.solver_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError("MINER_TIMEOUT_MS must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            workers: self.workers,
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            hash: self.hash,
            key_order: self.key_order,
        }
    }

    pub fn budget(&self) -> Budget {
        Budget {
            max_attempts: self.max_attempts,
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            retry_delay: self.get_retry_delay(),
            ..RetryConfig::default()
        }
    }

    pub fn get_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn requires_access_token() {
        assert_eq!(
            Config::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingEnvVar("ACCESS_TOKEN".to_string())
        );
    }

    #[test]
    fn accepts_lowercase_access_token() {
        let config = Config::from_lookup(lookup(&[("access_token", "legacy")])).unwrap();
        assert_eq!(config.access_token, "legacy");

        let config = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN", "primary"),
            ("access_token", "legacy"),
        ]))
        .unwrap();
        assert_eq!(config.access_token, "primary");
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ACCESS_TOKEN", "abc"),
            ("MINER_WORKERS", "3"),
            ("MINER_CHUNK_SIZE", "64"),
            ("MINER_MAX_ATTEMPTS", "1000"),
            ("MINER_TIMEOUT_MS", "2500"),
            ("HASH_ALGORITHM", "blake3"),
            ("KEY_ORDER", "insertion"),
            ("METRICS_ENABLED", "1"),
        ]))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 3);
        assert_eq!(config.hash, HashAlgorithm::Blake3);
        assert_eq!(config.key_order, KeyOrder::Insertion);
        assert!(config.metrics_enabled);
        assert_eq!(
            config.budget(),
            Budget {
                max_attempts: Some(1000),
                timeout: Some(Duration::from_millis(2500)),
            }
        );
        assert_eq!(config.solver_config().chunk_size, 64);
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[("ACCESS_TOKEN", "abc"), ("MINER_WORKERS", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnvVar("MINER_WORKERS".to_string(), "many".to_string())
        );

        let config = Config::from_lookup(lookup(&[("ACCESS_TOKEN", "abc"), ("MINER_WORKERS", "0")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let config = Config::from_lookup(lookup(&[("ACCESS_TOKEN", "abc"), ("PROBLEM_URL", "ftp://x")]))
            .unwrap();
        assert!(config.validate().is_err());
    }
}
