//! Server configuration: YAML file plus `SOCFLOW_*` environment overrides
use serde::{Deserialize, Serialize};

use socflow_core::{EngineConfig, SocflowError};
use socflow_stages::ExecutionMode;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8787";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub addr: String,
    pub engine: EngineConfig,
    pub execution_mode: ExecutionMode,
    /// Template catalog replacing the built-in one
    pub templates_path: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            engine: EngineConfig::default(),
            execution_mode: ExecutionMode::DryRun,
            templates_path: None,
        }
    }
}

impl ApiConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, SocflowError> {
        let config: ApiConfig = serde_yaml::from_str(yaml).map_err(|e| SocflowError::Config(e.to_string()))?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, SocflowError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SocflowError::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    /// `SOCFLOW_CONFIG` file (if set) with environment overrides on top
    pub fn from_env() -> Result<Self, SocflowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SocflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SOCFLOW_CONFIG") {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Some(addr) = lookup("SOCFLOW_ADDR") {
            config.addr = addr;
        }
        if let Some(mode) = lookup("SOCFLOW_EXECUTION_MODE") {
            config.execution_mode = mode.parse().map_err(|e| SocflowError::Config(format!("{}", e)))?;
        }
        if let Some(path) = lookup("SOCFLOW_TEMPLATES") {
            config.templates_path = Some(path);
        }
        config.engine = config.engine.with_overrides(&lookup)?;
        Ok(config)
    }
}
