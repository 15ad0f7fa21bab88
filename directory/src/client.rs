const BASE_DELAY: u64 = 100;
const MAX_RETRIES: u32 = 3;

use crate::config::Config;
use crate::metrics_defs::{POLL_DURATION, POLL_FAILURES, ROUTE_UPDATES_EMITTED};
use crate::types::{DirectoryEvent, RouteUpdate, RoutesSnapshot};
use reqwest::{StatusCode, Url};
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior, sleep};

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("directory responded with {0}")]
    UnexpectedStatus(StatusCode),
}

/// Polls the directory for the complete route snapshot and translates the
/// differences between consecutive snapshots into [`DirectoryEvent`]s.
pub struct DirectoryClient {
    client: reqwest::Client,
    routes_url: Url,
    poll_interval: Duration,
    connected: bool,
    known: HashMap<String, RouteUpdate>,
}

impl DirectoryClient {
    pub fn new(config: &Config) -> Result<Self, DirectoryError> {
        let full_url = format!("{}/{}", config.host.trim_end_matches('/'), "routes");
        let routes_url =
            Url::parse(&full_url).map_err(|e| DirectoryError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(DirectoryClient {
            client,
            routes_url,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            connected: false,
            known: HashMap::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Polls until the receiving side of `tx` is dropped. Failed polls are
    /// logged and retried on the next tick.
    pub async fn run(mut self, tx: mpsc::Sender<DirectoryEvent>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if tx.is_closed() {
                tracing::info!("Event receiver dropped, stopping directory client");
                return;
            }

            let events = match self.poll().await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(url = %self.routes_url, error = %e, "Directory poll failed");
                    continue;
                }
            };

            for event in events {
                if tx.send(event).await.is_err() {
                    tracing::info!("Event receiver dropped, stopping directory client");
                    return;
                }
            }
        }
    }

    /// Fetches one snapshot and returns the events it implies.
    pub async fn poll(&mut self) -> Result<Vec<DirectoryEvent>, DirectoryError> {
        let start = Instant::now();

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if self.connected {
                    tracing::warn!("Lost connection to the directory");
                }
                self.connected = false;
                counter!(POLL_FAILURES).increment(1);
                return Err(e);
            }
        };

        histogram!(POLL_DURATION).record(start.elapsed().as_secs_f64());

        let events = self.apply_snapshot(snapshot);
        counter!(ROUTE_UPDATES_EMITTED).increment(
            events
                .iter()
                .filter(|e| matches!(e, DirectoryEvent::RouteUpdate(_)))
                .count() as u64,
        );
        Ok(events)
    }

    async fn fetch_snapshot(&self) -> Result<RoutesSnapshot, DirectoryError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let mut retries = 0;

        loop {
            let response = self.client.get(self.routes_url.clone()).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json::<RoutesSnapshot>().await?);
            }

            if RETRIABLE_STATUS_CODES.contains(&status) && retries < MAX_RETRIES {
                let retry_millis = BASE_DELAY * 2_u64.pow(retries);
                tracing::debug!(%status, retry_millis, "Retrying directory poll");
                sleep(Duration::from_millis(retry_millis)).await;
                retries += 1;
                continue;
            }

            return Err(DirectoryError::UnexpectedStatus(status));
        }
    }

    /// After a (re)connect every service is announced again; otherwise only
    /// changed services are. Services missing from the snapshot are announced
    /// with an empty route list.
    fn apply_snapshot(&mut self, snapshot: RoutesSnapshot) -> Vec<DirectoryEvent> {
        let mut events = Vec::new();
        let reconnected = !self.connected;

        if reconnected {
            tracing::info!(url = %self.routes_url, "Connected to the directory");
            self.connected = true;
            events.push(DirectoryEvent::Connected);
        }

        let mut seen = HashSet::new();
        for service in snapshot.services {
            seen.insert(service.address.clone());
            if reconnected || self.known.get(&service.address) != Some(&service) {
                self.known.insert(service.address.clone(), service.clone());
                events.push(DirectoryEvent::RouteUpdate(service));
            }
        }

        let mut removed: Vec<String> = self
            .known
            .keys()
            .filter(|address| !seen.contains(*address))
            .cloned()
            .collect();
        removed.sort();

        for address in removed {
            self.known.remove(&address);
            events.push(DirectoryEvent::RouteUpdate(RouteUpdate {
                address,
                routes: Vec::new(),
                policy: serde_json::Value::Null,
            }));
        }

        events
    }
}
