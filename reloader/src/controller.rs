//! Single-task event loop tying the route table, debounce and publisher together.

use crate::config::{DebounceConfig, HaproxyConfig};
use crate::debounce::{DebounceScheduler, TimerOutcome};
use crate::errors::PublishError;
use crate::metrics_defs::{RENDERS, ROUTE_UPDATES, ROUTED_SERVICES};
use crate::publish::{ProxyLauncher, PublishOutcome, Publisher};
use crate::render::render;
use crate::route_table::RouteTable;
use directory::{DirectoryEvent, RouteUpdate};
use shared::{counter, gauge};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug)]
pub enum Event {
    ConnectionOpened,
    RouteUpdated(RouteUpdate),
    TimerFired,
}

impl From<DirectoryEvent> for Event {
    fn from(event: DirectoryEvent) -> Self {
        match event {
            DirectoryEvent::Connected => Event::ConnectionOpened,
            DirectoryEvent::RouteUpdate(update) => Event::RouteUpdated(update),
        }
    }
}

/// Owns the route table, the debounce state and the published config.
///
/// All state is mutated from a single task, one event at a time, so nothing
/// here is synchronized. The reload is awaited inside that task: no further
/// event is handled until the proxy has taken over, which keeps reloads
/// strictly ordered. Handling events from several tasks would need locking
/// and an explicit reload queue.
pub struct Controller {
    routes: RouteTable,
    scheduler: DebounceScheduler,
    publisher: Publisher,
    // Set once a config has been written; read by the readiness probe.
    ready: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(
        haproxy: HaproxyConfig,
        debounce: &DebounceConfig,
        launcher: Arc<dyn ProxyLauncher>,
    ) -> Self {
        Controller {
            routes: RouteTable::new(),
            scheduler: DebounceScheduler::new(debounce, Instant::now()),
            publisher: Publisher::new(haproxy, launcher),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    /// Handles one event. Returns the publish outcome when the event caused a
    /// render, and an error when the rendered config could not be written.
    pub async fn dispatch(
        &mut self,
        event: Event,
        now: Instant,
    ) -> Result<Option<PublishOutcome>, PublishError> {
        match event {
            Event::ConnectionOpened => {
                tracing::info!("Directory connection opened");
                self.scheduler.on_connection_opened();
                Ok(None)
            }
            Event::RouteUpdated(update) => {
                self.routes
                    .update(&update.address, &update.routes, update.policy);
                counter!(ROUTE_UPDATES).increment(1);

                let deadline = self.scheduler.on_route_update(now);
                tracing::debug!(
                    address = %update.address,
                    delay_ms = deadline.duration_since(now).as_millis() as u64,
                    "Scheduled render"
                );
                Ok(None)
            }
            Event::TimerFired => match self.scheduler.on_timer(now) {
                TimerOutcome::Idle => Ok(None),
                TimerOutcome::Rearmed(deadline) => {
                    tracing::debug!(?deadline, "Routes still changing, render postponed");
                    Ok(None)
                }
                TimerOutcome::Render => self.render_and_publish().await.map(Some),
            },
        }
    }

    async fn render_and_publish(&mut self) -> Result<PublishOutcome, PublishError> {
        let rendered = render(&self.routes);
        counter!(RENDERS).increment(1);
        gauge!(ROUTED_SERVICES).set(self.routes.routed_services() as f64);

        let outcome = self.publisher.publish(&rendered).await?;
        self.ready.store(true, Ordering::Relaxed);
        Ok(outcome)
    }

    /// Processes directory events and timer deadlines until the event stream
    /// closes. Publish failures are logged and do not stop the loop.
    pub async fn run(mut self, mut events: mpsc::Receiver<DirectoryEvent>) {
        loop {
            let deadline = self.scheduler.deadline();

            let event = tokio::select! {
                biased;
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => Event::from(event),
                    None => {
                        tracing::info!("Directory event stream closed, stopping controller");
                        return;
                    }
                },
                _ = wait_until(deadline) => Event::TimerFired,
            };

            if let Err(e) = self.dispatch(event, Instant::now()).await {
                tracing::error!(error = %e, "Proxy is running on a stale config");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::RecordingLauncher;
    use directory::RawRoute;
    use std::fs;
    use std::path::Path;
    use tokio::time::{Duration, sleep};

    fn debounce_config() -> DebounceConfig {
        DebounceConfig {
            interval_ms: 2000,
            directory_connect_interval_ms: 200,
        }
    }

    fn controller(run_dir: &Path, launcher: Arc<RecordingLauncher>) -> Controller {
        let haproxy = HaproxyConfig {
            binary: "/usr/sbin/haproxy".into(),
            run_dir: run_dir.to_path_buf(),
        };
        Controller::new(haproxy, &debounce_config(), launcher)
    }

    fn update(address: &str, host: &str) -> RouteUpdate {
        RouteUpdate {
            address: address.to_string(),
            routes: vec![RawRoute::new(host, Some(80), "http")],
            policy: serde_json::Value::Null,
        }
    }

    fn written_config(run_dir: &Path) -> String {
        fs::read_to_string(run_dir.join("haproxy.conf")).unwrap()
    }

    #[tokio::test]
    async fn test_superseded_update_is_not_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut c = controller(dir.path(), launcher.clone());
        let start = Instant::now();

        // First render ends the connect window.
        c.dispatch(Event::RouteUpdated(update("//dir/other", "o")), start)
            .await
            .unwrap();
        let t0 = start + Duration::from_millis(200);
        assert_eq!(
            c.dispatch(Event::TimerFired, t0).await.unwrap(),
            Some(PublishOutcome::Reloaded)
        );

        c.dispatch(Event::RouteUpdated(update("//dir/svc1", "a")), t0)
            .await
            .unwrap();
        let second = t0 + Duration::from_millis(500);
        c.dispatch(Event::RouteUpdated(update("//dir/svc1", "b")), second)
            .await
            .unwrap();
        assert_eq!(c.deadline(), Some(second + Duration::from_secs(2)));

        let outcome = c
            .dispatch(Event::TimerFired, second + Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, Some(PublishOutcome::Reloaded));
        assert_eq!(launcher.commands().len(), 2);

        let config = written_config(dir.path());
        assert!(config.contains("server b_80 b:80"));
        assert!(!config.contains("server a_80"));
    }

    #[tokio::test]
    async fn test_connection_then_update_uses_connect_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(dir.path(), Arc::new(RecordingLauncher::default()));
        let now = Instant::now();

        c.dispatch(Event::ConnectionOpened, now).await.unwrap();
        c.dispatch(Event::RouteUpdated(update("//dir/svc1", "a")), now)
            .await
            .unwrap();

        assert_eq!(c.deadline(), Some(now + Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_unchanged_render_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut c = controller(dir.path(), launcher.clone());
        let mut now = Instant::now();

        for _ in 0..2 {
            c.dispatch(Event::RouteUpdated(update("//dir/svc1", "a")), now)
                .await
                .unwrap();
            now += Duration::from_secs(2);
            c.dispatch(Event::TimerFired, now).await.unwrap();
        }

        assert_eq!(launcher.commands().len(), 1);
        assert_eq!(c.routes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller(&dir.path().join("missing"), Arc::new(RecordingLauncher::default()));
        let ready = c.ready_flag();
        let now = Instant::now();

        c.dispatch(Event::RouteUpdated(update("//dir/svc1", "a")), now)
            .await
            .unwrap();
        let result = c
            .dispatch(Event::TimerFired, now + Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(PublishError::Write { .. })));
        assert!(!ready.load(Ordering::Relaxed));
        assert_eq!(c.publisher().published(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_coalesces_bursts() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let c = controller(dir.path(), launcher.clone());
        let ready = c.ready_flag();

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(c.run(rx));

        // First batch after connecting is rendered after the connect interval.
        tx.send(DirectoryEvent::Connected).await.unwrap();
        tx.send(DirectoryEvent::RouteUpdate(update("//dir/svc1", "a")))
            .await
            .unwrap();
        tx.send(DirectoryEvent::RouteUpdate(update("//dir/svc2", "b")))
            .await
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        assert!(launcher.commands().is_empty());
        assert!(!ready.load(Ordering::Relaxed));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(launcher.commands().len(), 1);
        assert!(ready.load(Ordering::Relaxed));

        // Steady state: updates 500ms apart are coalesced into one render.
        for host in ["c", "d", "e"] {
            tx.send(DirectoryEvent::RouteUpdate(update("//dir/svc1", host)))
                .await
                .unwrap();
            sleep(Duration::from_millis(500)).await;
        }

        sleep(Duration::from_millis(1400)).await;
        assert_eq!(launcher.commands().len(), 1);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(launcher.commands().len(), 2);

        let config = written_config(dir.path());
        assert!(config.contains("server e_80 e:80"));
        assert!(!config.contains("server c_80"));
        assert!(config.contains("backend BE_svc2"));

        drop(tx);
        handle.await.unwrap();
    }
}
