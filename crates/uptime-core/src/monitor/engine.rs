use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::checker::{CheckError, CheckResult, HealthChecker};
use crate::config::{MonitorConfig, NotifyConfig};
use crate::monitor::state::{EndpointState, EndpointStatus};
use crate::notify::NotificationRequest;
use crate::retry::millis;
use crate::source::EndpointSource;

/// Slack on top of a check's retry budget before the scheduler gives up on it.
const CHECK_GRACE: Duration = Duration::from_secs(1);

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub added: usize,
    pub removed: usize,
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    pub transitions: usize,
}

/// Drives the monitoring loop: refresh the watch list, check every endpoint
/// concurrently, feed results into each endpoint's state machine, then sleep.
pub struct Scheduler {
    config: MonitorConfig,
    notify: NotifyConfig,
    source: Arc<dyn EndpointSource>,
    checker: Arc<dyn HealthChecker>,
    endpoints: HashMap<String, EndpointState>,
    notification_tx: Option<UnboundedSender<NotificationRequest>>,
    ticks: u64,
}

impl Scheduler {
    pub fn new(
        config: MonitorConfig,
        notify: NotifyConfig,
        source: Arc<dyn EndpointSource>,
        checker: Arc<dyn HealthChecker>,
        notification_tx: Option<UnboundedSender<NotificationRequest>>,
    ) -> Self {
        Self {
            config,
            notify,
            source,
            checker,
            endpoints: HashMap::new(),
            notification_tx,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn endpoint(&self, url: &str) -> Option<&EndpointState> {
        self.endpoints.get(url)
    }

    /// Snapshot of every tracked endpoint, sorted by URL.
    pub fn endpoints(&self) -> Vec<EndpointState> {
        let mut states: Vec<EndpointState> = self.endpoints.values().cloned().collect();
        states.sort_by(|a, b| a.endpoint().cmp(b.endpoint()));
        states
    }

    pub fn any_down(&self) -> bool {
        self.endpoints
            .values()
            .any(|s| s.status() == EndpointStatus::Down)
    }

    /// Longest a single endpoint check may take before it is counted as failed.
    pub fn check_budget(&self) -> Duration {
        self.config.check_policy().budget().saturating_add(CHECK_GRACE)
    }

    /// Re-read the endpoint source and reconcile the tracking table.
    ///
    /// Returns `(added, removed)`. A failed read keeps the current endpoints.
    pub async fn refresh_endpoints(&mut self) -> (usize, usize) {
        match self.source.read().await {
            Ok(urls) => self.apply_watch_list(urls),
            Err(e) => {
                warn!(error = %e, "Failed to read watch list, keeping previous endpoints");
                (0, 0)
            }
        }
    }

    fn apply_watch_list(&mut self, urls: BTreeSet<String>) -> (usize, usize) {
        let before = self.endpoints.len();
        self.endpoints.retain(|url, _| {
            let keep = urls.contains(url);
            if !keep {
                info!(url = %url, "Stopped monitoring endpoint");
            }
            keep
        });
        let removed = before - self.endpoints.len();

        let mut added = 0;
        for url in urls {
            if let Entry::Vacant(slot) = self.endpoints.entry(url) {
                info!(url = %slot.key(), "Started monitoring endpoint");
                let state = EndpointState::new(slot.key().clone())
                    .with_initial_down_alert(self.config.alert_on_initial_down);
                slot.insert(state);
                added += 1;
            }
        }

        (added, removed)
    }

    /// Run a single tick: refresh, check everything, apply results.
    ///
    /// Returns once every check of this tick has finished or exhausted its budget.
    pub async fn poll_once(&mut self) -> TickSummary {
        let started = Instant::now();
        self.ticks += 1;
        let (added, removed) = self.refresh_endpoints().await;

        let budget = self.check_budget();
        let max_attempts = self.config.check_policy().max_attempts();
        let concurrency = self.config.max_concurrent_checks.max(1);
        let checker = Arc::clone(&self.checker);
        let urls: Vec<String> = self.endpoints.keys().cloned().collect();
        let checked = urls.len();

        let checks = urls.into_iter().map(move |url| {
            let checker = Arc::clone(&checker);
            async move { bounded_check(checker, url, budget, max_attempts).await }
        });
        let mut results = stream::iter(checks).buffer_unordered(concurrency);

        let mut transitions = 0;
        while let Some(result) = results.next().await {
            if self.apply_result(&result) {
                transitions += 1;
            }
        }

        let up = self
            .endpoints
            .values()
            .filter(|s| s.status() == EndpointStatus::Up)
            .count();
        let summary = TickSummary {
            tick: self.ticks,
            added,
            removed,
            checked,
            up,
            down: checked - up,
            transitions,
        };

        info!(
            tick = summary.tick,
            endpoints = summary.checked,
            up = summary.up,
            down = summary.down,
            transitions = summary.transitions,
            elapsed_ms = millis(started.elapsed()),
            "Tick complete"
        );
        summary
    }

    /// Feed one result into its endpoint's state machine. Returns whether it
    /// produced a reportable transition.
    fn apply_result(&mut self, result: &CheckResult) -> bool {
        let Some(state) = self.endpoints.get_mut(&result.endpoint) else {
            debug!(url = %result.endpoint, "Dropping result for untracked endpoint");
            return false;
        };
        let Some(transition) = state.observe(result) else {
            return false;
        };

        let request = NotificationRequest::from_transition(&transition, &self.notify);
        match self.notification_tx {
            Some(ref tx) => {
                if tx.send(request).is_err() {
                    warn!(url = %transition.endpoint, "Notification channel closed, alert dropped");
                }
            }
            None => {
                debug!(url = %transition.endpoint, direction = %transition.direction, "Notifications disabled");
            }
        }
        true
    }

    /// Tick forever until `shutdown` resolves.
    ///
    /// Shutdown also cancels an in-flight tick; nothing is persisted, so the
    /// next start simply begins from a fresh watch-list read.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            down_interval_secs = self.config.down_interval.map(|d| d.as_secs()),
            watch_list = %self.config.watch_list.display(),
            "Starting scheduler"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = self.poll_once() => {}
                _ = &mut shutdown => break,
            }

            let delay = self.config.next_delay(self.any_down());
            debug!(delay_secs = delay.as_secs(), "Sleeping until next tick");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }

        info!(ticks = self.ticks, "Scheduler stopped");
    }
}

async fn bounded_check(
    checker: Arc<dyn HealthChecker>,
    url: String,
    budget: Duration,
    max_attempts: u32,
) -> CheckResult {
    match tokio::time::timeout(budget, checker.check(&url)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(url = %url, budget_ms = millis(budget), "Health check exceeded its budget");
            CheckResult::down(url, max_attempts, CheckError::timeout(budget)).with_elapsed(budget)
        }
    }
}
