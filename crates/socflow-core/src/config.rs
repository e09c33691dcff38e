//! Engine configuration: retry budget, routing thresholds and timeouts
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SocflowError;

/// What a pipeline restart keeps after error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Clear every stage output and run the whole pipeline again
    #[default]
    Restart,
    /// Keep successful outputs; only stages with missing output run again
    Resume,
}

impl std::str::FromStr for RetryMode {
    type Err = SocflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restart" => Ok(RetryMode::Restart),
            "resume" => Ok(RetryMode::Resume),
            other => Err(SocflowError::Config(format!("unknown retry mode `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Error count at which error handling stops restarting the pipeline
    pub max_retries: usize,
    /// Overall confidence below which decisions go to human review
    pub confidence_threshold: f64,
    /// Stage runs allowed per pipeline attempt
    pub max_steps: usize,
    /// Per-stage wall clock limit; `None` disables it
    pub stage_timeout_ms: Option<u64>,
    /// Upper bound for a single telemetry call
    pub telemetry_timeout_ms: u64,
    pub retry_mode: RetryMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            confidence_threshold: 0.5,
            max_steps: 64,
            stage_timeout_ms: Some(120_000),
            telemetry_timeout_ms: 2_000,
            retry_mode: RetryMode::Restart,
        }
    }
}

impl EngineConfig {
    /// Parse from YAML; missing keys take their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, SocflowError> {
        let config: EngineConfig =
            serde_yaml::from_str(yaml).map_err(|e| SocflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, SocflowError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SocflowError::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    /// Apply `SOCFLOW_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, SocflowError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, SocflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SOCFLOW_MAX_RETRIES") {
            self.max_retries = parse_env("SOCFLOW_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("SOCFLOW_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env("SOCFLOW_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("SOCFLOW_STAGE_TIMEOUT_MS") {
            let ms: u64 = parse_env("SOCFLOW_STAGE_TIMEOUT_MS", &value)?;
            self.stage_timeout_ms = if ms == 0 { None } else { Some(ms) };
        }
        if let Some(value) = lookup("SOCFLOW_RETRY_MODE") {
            self.retry_mode = value.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), SocflowError> {
        if self.max_retries == 0 {
            return Err(SocflowError::Config("max_retries must be at least 1".to_string()));
        }
        if self.max_steps == 0 {
            return Err(SocflowError::Config("max_steps must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SocflowError::Config(format!(
                "confidence_threshold {} outside 0.0..=1.0",
                self.confidence_threshold
            )));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SocflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| SocflowError::Config(format!("{} has invalid value `{}`", key, value)))
}
