use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// YAML 設定ファイルのルート。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub activation: ClientConfig,
}

/// ClientConfig は decision service への接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// 1 回の Activate 呼び出しの期限。null で無効化する。
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_timeout_ms() -> Option<u64> {
    Some(1000)
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn endpoint_uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// YAML を読み込み Config を返す。
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&data)?;
    validate(&config.activation)?;
    Ok(config)
}

/// 設定値のバリデーション。
pub fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::Validation("activation.host is required".into()));
    }
    if config.port == 0 {
        return Err(ConfigError::Validation(
            "activation.port must be between 1 and 65535".into(),
        ));
    }
    Ok(())
}
