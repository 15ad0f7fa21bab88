use serde::{Deserialize, Serialize};

/// One announced instance of a service, as published by the directory.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RawRoute {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Target scheme tag, e.g. `http`, `http2`, `tcp`.
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub owner: Option<String>,
}

impl RawRoute {
    pub fn new<H, S>(host: H, port: Option<u16>, scheme: S) -> Self
    where
        H: Into<String>,
        S: Into<String>,
    {
        RawRoute {
            host: host.into(),
            port,
            scheme: scheme.into(),
            path: String::new(),
            owner: None,
        }
    }

    pub fn with_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }
}

/// The full route list for one service address. Each update replaces
/// whatever was previously announced for the address.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RouteUpdate {
    pub address: String,
    #[serde(default)]
    pub routes: Vec<RawRoute>,
    /// Opaque to this crate and to the reloader; carried through as-is.
    #[serde(default)]
    pub policy: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DirectoryEvent {
    /// A connection to the directory was (re-)established.
    Connected,
    RouteUpdate(RouteUpdate),
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoutesSnapshot {
    pub services: Vec<RouteUpdate>,
}
