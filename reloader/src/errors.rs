use std::io;
use std::path::PathBuf;

/// A rendered configuration could not be made durable. The proxy keeps
/// running on its previous configuration.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("could not write config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("could not start proxy: {0}")]
    Spawn(#[from] io::Error),
    #[error("proxy exited with status {code:?}")]
    Exit { code: Option<i32> },
}
