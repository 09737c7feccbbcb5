use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// HTTP method used for reachability probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckMethod {
    Get,
    Head,
}

impl std::fmt::Display for CheckMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
        }
    }
}

/// Configuration for the scheduler and health checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Path of the watch-list file, re-read at the start of every tick.
    pub watch_list: PathBuf,
    /// Time between ticks (default: 300s).
    pub interval: Duration,
    /// Time between ticks while any endpoint is down. Falls back to `interval`.
    pub down_interval: Option<Duration>,
    /// Per-attempt HTTP request timeout.
    pub request_timeout: Duration,
    /// Additional attempts after the first failed probe.
    pub request_retries: u32,
    /// Base backoff between attempts (doubled each attempt). Zero disables it.
    pub retry_backoff: Duration,
    pub check_method: CheckMethod,
    /// First status code counted as a failure; everything below it is up.
    pub failure_status_threshold: u16,
    pub max_concurrent_checks: usize,
    /// Alert when an endpoint's very first result is down.
    pub alert_on_initial_down: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_list: PathBuf::from("watchlist.txt"),
            interval: Duration::from_secs(300),
            down_interval: None,
            request_timeout: Duration::from_secs(90),
            request_retries: 10,
            retry_backoff: Duration::ZERO,
            check_method: CheckMethod::Get,
            failure_status_threshold: 400,
            max_concurrent_checks: 16,
            alert_on_initial_down: false,
        }
    }
}

impl MonitorConfig {
    pub fn with_watch_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.watch_list = path.into();
        self
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval = Duration::from_secs(secs);
        self
    }

    pub fn with_down_interval(mut self, secs: u64) -> Self {
        self.down_interval = Some(Duration::from_secs(secs));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_request_retries(mut self, retries: u32) -> Self {
        self.request_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_check_method(mut self, method: CheckMethod) -> Self {
        self.check_method = method;
        self
    }

    pub fn with_failure_status_threshold(mut self, status: u16) -> Self {
        self.failure_status_threshold = status;
        self
    }

    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max.max(1);
        self
    }

    pub fn with_alert_on_initial_down(mut self, enabled: bool) -> Self {
        self.alert_on_initial_down = enabled;
        self
    }

    /// Retry policy applied to each endpoint probe.
    pub fn check_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.request_retries, self.request_timeout)
            .with_backoff(self.retry_backoff)
    }

    /// Delay before the next tick, given whether any endpoint is currently down.
    pub fn next_delay(&self, any_down: bool) -> Duration {
        match (any_down, self.down_interval) {
            (true, Some(down)) => down,
            _ => self.interval,
        }
    }
}

/// Who receives alerts and how they are addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub sender: String,
    pub recipients: Vec<String>,
    /// Name greeted in message bodies and prefixed to subjects.
    pub display_name: String,
    pub max_retries: u32,
    pub send_timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sender: "uptime-monitor@localhost".to_string(),
            recipients: Vec::new(),
            display_name: "Devs".to_string(),
            max_retries: 3,
            send_timeout: Duration::from_secs(30),
        }
    }
}

impl NotifyConfig {
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn delivery_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.send_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// Implicit TLS (usually port 465).
    Tls,
    /// No encryption. Only for local relays and tests.
    None,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
    /// Open a connection at startup to fail fast on bad host or credentials.
    pub verify_on_startup: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            security: SmtpSecurity::StartTls,
            verify_on_startup: true,
        }
    }
}

// Hand-written so the password never reaches the logs.
impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("security", &self.security)
            .field("verify_on_startup", &self.verify_on_startup)
            .finish()
    }
}
