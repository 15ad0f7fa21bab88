use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "haproxy.conf";
const PID_FILE_NAME: &str = "haproxy.pid";

/// Where the proxy binary lives and where its config and pid files go.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct HaproxyConfig {
    pub binary: PathBuf,
    pub run_dir: PathBuf,
}

impl HaproxyConfig {
    pub fn config_path(&self) -> PathBuf {
        self.run_dir.join(CONFIG_FILE_NAME)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.run_dir.join(PID_FILE_NAME)
    }
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        HaproxyConfig {
            binary: "/usr/sbin/haproxy".into(),
            run_dir: "/var/run/haproxy-sidecar".into(),
        }
    }
}

/// Quiet periods used to coalesce route updates.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
    /// Steady-state quiet period.
    pub interval_ms: u64,
    /// Quiet period for the first burst after connecting to the directory.
    pub directory_connect_interval_ms: u64,
}

impl DebounceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn directory_connect_interval(&self) -> Duration {
        Duration::from_millis(self.directory_connect_interval_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        DebounceConfig {
            interval_ms: 2000,
            directory_connect_interval_ms: 200,
        }
    }
}
