use directory::config::Config as DirectoryConfig;
use reloader::config::{DebounceConfig, HaproxyConfig};
use serde::Deserialize;
use std::fs::File;
use url::Url;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

/// Everything has a default, so the sidecar runs without a config file.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub haproxy: HaproxyConfig,
    pub debounce: DebounceConfig,
    pub directory: DirectoryConfig,
    pub admin_listener: Option<Listener>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.validate()?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.haproxy.binary.as_os_str().is_empty() {
            return Err(ValidationError::EmptyBinary);
        }
        if self.haproxy.run_dir.as_os_str().is_empty() {
            return Err(ValidationError::EmptyRunDir);
        }
        if self.debounce.interval_ms == 0 {
            return Err(ValidationError::ZeroInterval);
        }
        if self.directory.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroPollInterval);
        }
        Url::parse(&self.directory.host)
            .map_err(|e| ValidationError::InvalidDirectoryHost(e.to_string()))?;

        if let Some(listener) = &self.admin_listener
            && listener.port == 0
        {
            return Err(ValidationError::InvalidPort);
        }
        if let Some(logging) = &self.common.logging {
            logging
                .sentry_dsn
                .parse::<sentry::types::Dsn>()
                .map_err(|e| ValidationError::InvalidSentryDsn(e.to_string()))?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] ValidationError),
}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("haproxy binary path is empty")]
    EmptyBinary,
    #[error("haproxy run directory is empty")]
    EmptyRunDir,
    #[error("debounce interval cannot be 0")]
    ZeroInterval,
    #[error("directory poll interval cannot be 0")]
    ZeroPollInterval,
    #[error("invalid directory host: {0}")]
    InvalidDirectoryHost(String),
    #[error("port cannot be 0")]
    InvalidPort,
    #[error("invalid sentry DSN: {0}")]
    InvalidSentryDsn(String),
}
