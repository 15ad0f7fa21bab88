//! Coalesces bursts of route updates into a single render.

use crate::config::DebounceConfig;
use tokio::time::{Duration, Instant};

/// What the controller should do when the armed deadline is reached.
#[derive(Debug, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Nothing changed since the last render.
    Idle,
    /// A newer mutation moved the quiet period; wait until the new deadline.
    Rearmed(Instant),
    /// The route table has been quiet long enough.
    Render,
}

/// Decides when route table changes are turned into a new configuration.
///
/// Every route update pushes the deadline out by the current interval, so a
/// burst of updates results in a single render once the burst has been quiet
/// for a whole interval. Until the first render after a directory connection
/// the shorter connect interval is used, which gets the first full batch of
/// routes into the proxy quickly.
#[derive(Debug)]
pub struct DebounceScheduler {
    pending: bool,
    last_mutation: Instant,
    interval: Duration,
    base_interval: Duration,
    connect_interval: Duration,
    deadline: Option<Instant>,
}

impl DebounceScheduler {
    pub fn new(config: &DebounceConfig, now: Instant) -> Self {
        let connect_interval = config.directory_connect_interval();

        DebounceScheduler {
            pending: false,
            last_mutation: now,
            interval: connect_interval,
            base_interval: config.interval(),
            connect_interval,
            deadline: Some(now + connect_interval),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Applies to the next mutation; an already armed deadline is left alone.
    pub fn on_connection_opened(&mut self) {
        self.interval = self.connect_interval;
    }

    /// Marks the table dirty and re-arms the deadline from `now`.
    pub fn on_route_update(&mut self, now: Instant) -> Instant {
        self.pending = true;
        self.last_mutation = now;
        let deadline = now + self.interval;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn on_timer(&mut self, now: Instant) -> TimerOutcome {
        self.deadline = None;

        if !self.pending {
            return TimerOutcome::Idle;
        }

        let elapsed = now.saturating_duration_since(self.last_mutation);
        if elapsed < self.interval {
            let deadline = now + (self.interval - elapsed);
            self.deadline = Some(deadline);
            return TimerOutcome::Rearmed(deadline);
        }

        self.pending = false;
        self.interval = self.base_interval;
        TimerOutcome::Render
    }
}
