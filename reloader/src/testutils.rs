use crate::errors::LaunchError;
use crate::publish::{ProxyLauncher, ReloadCommand};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every reload instead of starting a proxy.
#[derive(Default)]
pub struct RecordingLauncher {
    commands: Mutex<Vec<ReloadCommand>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        RecordingLauncher {
            commands: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn commands(&self) -> Vec<ReloadCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProxyLauncher for RecordingLauncher {
    async fn launch(&self, command: &ReloadCommand) -> Result<(), LaunchError> {
        self.commands.lock().unwrap().push(command.clone());
        if self.fail {
            return Err(LaunchError::Exit { code: Some(1) });
        }
        Ok(())
    }
}
