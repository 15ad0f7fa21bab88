//! Client side of the service directory: turns the directory's route feed into
//! a stream of [`DirectoryEvent`]s for the reloader.

pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod types;

pub use client::{DirectoryClient, DirectoryError};
pub use types::{DirectoryEvent, RawRoute, RouteUpdate};
