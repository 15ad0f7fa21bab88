//! Keeps an HAProxy configuration in sync with the routes announced by the
//! service directory.
//!
//! Directory events flow into a [`Controller`], which updates the
//! [`RouteTable`](route_table::RouteTable), debounces bursts of changes and,
//! once the routes have been quiet long enough, renders a new configuration
//! and reloads the proxy if the configuration actually changed.

pub mod config;
pub mod controller;
pub mod debounce;
pub mod errors;
pub mod metrics_defs;
pub mod publish;
pub mod render;
pub mod route_table;

#[cfg(test)]
mod testutils;

pub use controller::{Controller, Event};
pub use errors::{LaunchError, PublishError};
pub use publish::{ProcessLauncher, ProxyLauncher, PublishOutcome};
