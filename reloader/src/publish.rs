//! Writes changed configurations to disk and asks the proxy to pick them up.

use crate::config::HaproxyConfig;
use crate::errors::{LaunchError, PublishError};
use crate::metrics_defs::{PUBLISH_UNCHANGED, RELOADS, RELOAD_DURATION, RELOAD_FAILURES};
use async_trait::async_trait;
use shared::{counter, histogram};
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;

#[cfg(unix)]
const CONFIG_MODE: u32 = 0o644;

/// Full command line for one proxy reload.
#[derive(Clone, Debug, PartialEq)]
pub struct ReloadCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ReloadCommand {
    /// `<binary> -f <config> -p <pid> [-sf <old pid>...]`. A running proxy is
    /// only asked to hand over when its pid file can be read.
    pub fn new(config: &HaproxyConfig) -> Self {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            config.config_path().into(),
            "-p".into(),
            config.pid_path().into(),
        ];

        if let Some(pids) = read_old_pids(&config.pid_path()) {
            args.push("-sf".into());
            args.extend(pids.into_iter().map(OsString::from));
        }

        ReloadCommand {
            program: config.binary.clone(),
            args,
        }
    }
}

fn read_old_pids(pid_path: &Path) -> Option<Vec<String>> {
    let contents = match fs::read_to_string(pid_path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::debug!(path = %pid_path.display(), error = %e, "No previous proxy pid");
            return None;
        }
    };

    let pids: Vec<String> = contents.split_whitespace().map(String::from).collect();
    (!pids.is_empty()).then_some(pids)
}

/// Starts the proxy and waits until it has taken over.
#[async_trait]
pub trait ProxyLauncher: Send + Sync {
    async fn launch(&self, command: &ReloadCommand) -> Result<(), LaunchError>;
}

/// Runs the proxy binary as a child process. With `daemon` in the rendered
/// config the parent exits as soon as the new workers are up.
pub struct ProcessLauncher;

#[async_trait]
impl ProxyLauncher for ProcessLauncher {
    async fn launch(&self, command: &ReloadCommand) -> Result<(), LaunchError> {
        let status = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(LaunchError::Exit {
                code: status.code(),
            })
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Identical to what is already published.
    Unchanged,
    Reloaded,
    /// The new config is on disk but the proxy could not be reloaded.
    ReloadFailed,
}

pub struct Publisher {
    config: HaproxyConfig,
    launcher: Arc<dyn ProxyLauncher>,
    published: Option<String>,
}

impl Publisher {
    pub fn new(config: HaproxyConfig, launcher: Arc<dyn ProxyLauncher>) -> Self {
        Publisher {
            config,
            launcher,
            published: None,
        }
    }

    pub fn published(&self) -> Option<&str> {
        self.published.as_deref()
    }

    /// Writes and reloads only if `rendered` differs from the last successfully
    /// written config. Only a failed write is an error: a failed reload is
    /// logged and retried by the next change.
    pub async fn publish(&mut self, rendered: &str) -> Result<PublishOutcome, PublishError> {
        if self.published.as_deref() == Some(rendered) {
            tracing::debug!("Rendered config unchanged, skipping reload");
            counter!(PUBLISH_UNCHANGED).increment(1);
            return Ok(PublishOutcome::Unchanged);
        }

        let config_path = self.config.config_path();
        write_config(&config_path, rendered).map_err(|source| PublishError::Write {
            path: config_path.clone(),
            source,
        })?;
        self.published = Some(rendered.to_string());
        tracing::info!(path = %config_path.display(), "Wrote new proxy config");

        let command = ReloadCommand::new(&self.config);
        tracing::info!(program = %command.program.display(), args = ?command.args, "Reloading proxy");

        let start = Instant::now();
        let result = self.launcher.launch(&command).await;
        histogram!(RELOAD_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                counter!(RELOADS).increment(1);
                Ok(PublishOutcome::Reloaded)
            }
            Err(e) => {
                tracing::error!(error = %e, "Proxy reload failed");
                counter!(RELOAD_FAILURES).increment(1);
                Ok(PublishOutcome::ReloadFailed)
            }
        }
    }
}

/// Replaces `path` atomically so the proxy never reads a partial file.
fn write_config(path: &Path, rendered: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    writeln!(tmp, "# generated {}", chrono::Utc::now().to_rfc3339())?;
    writeln!(tmp, "{rendered}")?;
    tmp.as_file().sync_all()?;
    // Temp files are created 0600; the proxy may run as another user.
    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(CONFIG_MODE))?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
