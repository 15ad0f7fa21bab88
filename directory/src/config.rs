use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the directory, e.g. `http://directory.internal:7000`
    pub host: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "http://127.0.0.1:7000".into(),
            poll_interval_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("host: http://dir:9000").unwrap();
        assert_eq!(config.host, "http://dir:9000");
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.request_timeout_ms, 5000);
    }
}
