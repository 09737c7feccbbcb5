use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checker::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Not checked yet. Left after the first result and never re-entered.
    Unknown,
    Up,
    Down,
}

impl EndpointStatus {
    pub fn can_transition_to(self, target: EndpointStatus) -> bool {
        matches!(
            (self, target),
            (EndpointStatus::Unknown, EndpointStatus::Up)
                | (EndpointStatus::Unknown, EndpointStatus::Down)
                | (EndpointStatus::Up, EndpointStatus::Down)
                | (EndpointStatus::Down, EndpointStatus::Up)
        )
    }

    pub fn from_check(succeeded: bool) -> Self {
        if succeeded {
            EndpointStatus::Up
        } else {
            EndpointStatus::Down
        }
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    WentDown,
    Recovered,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WentDown => write!(f, "went down"),
            Self::Recovered => write!(f, "recovered"),
        }
    }
}

/// A status change that must be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub endpoint: String,
    pub from: EndpointStatus,
    pub to: EndpointStatus,
    pub direction: Direction,
    pub at: DateTime<Utc>,
    pub attempts: u32,
    pub consecutive_failures: u32,
    pub status_code: Option<u16>,
    pub reason: Option<String>,
}

/// Availability state of one tracked endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointState {
    endpoint: String,
    status: EndpointStatus,
    consecutive_failures: u32,
    last_changed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    #[serde(skip)]
    alert_on_initial_down: bool,
}

impl EndpointState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            endpoint: endpoint.into(),
            status: EndpointStatus::Unknown,
            consecutive_failures: 0,
            last_changed_at: now,
            created_at: now,
            last_checked_at: None,
            last_status_code: None,
            last_error: None,
            alert_on_initial_down: false,
        }
    }

    pub fn with_initial_down_alert(mut self, enabled: bool) -> Self {
        self.alert_on_initial_down = enabled;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> EndpointStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.last_changed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn last_status_code(&self) -> Option<u16> {
        self.last_status_code
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Feed one check result into the state machine.
    ///
    /// Returns a transition only when the resolved status changed and the
    /// previous status was a real observation. The first result seeds the state
    /// silently, unless initial-down alerts are enabled and it is a failure.
    pub fn observe(&mut self, result: &CheckResult) -> Option<Transition> {
        let previous = self.status;
        let next = EndpointStatus::from_check(result.succeeded);

        if result.succeeded {
            self.consecutive_failures = 0;
            self.last_error = None;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_error = result.error.as_ref().map(ToString::to_string);
        }
        self.last_checked_at = Some(result.checked_at);
        self.last_status_code = result.status_code;

        if !previous.can_transition_to(next) {
            return None;
        }

        self.status = next;
        self.last_changed_at = result.checked_at;

        let notifiable = previous != EndpointStatus::Unknown
            || (self.alert_on_initial_down && next == EndpointStatus::Down);
        if !notifiable {
            debug!(endpoint = %self.endpoint, status = %next, "Seeded initial status");
            return None;
        }

        let direction = match next {
            EndpointStatus::Down => Direction::WentDown,
            _ => Direction::Recovered,
        };
        info!(
            endpoint = %self.endpoint,
            from = %previous,
            to = %next,
            consecutive_failures = self.consecutive_failures,
            "Endpoint {}",
            direction
        );

        Some(Transition {
            endpoint: self.endpoint.clone(),
            from: previous,
            to: next,
            direction,
            at: result.checked_at,
            attempts: result.attempts,
            consecutive_failures: self.consecutive_failures,
            status_code: result.status_code,
            reason: self.last_error.clone(),
        })
    }
}
