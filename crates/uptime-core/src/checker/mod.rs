mod http;

pub use http::{normalize_url, HttpChecker};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::retry::{millis, Transient};

/// Why a reachability probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckError {
    #[error("HTTP status {status}")]
    Status { status: u16 },
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Network error: {reason}")]
    Network { reason: String },
    #[error("Invalid URL: {reason}")]
    InvalidUrl { reason: String },
}

impl CheckError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: millis(after),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

impl Transient for CheckError {
    fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. })
    }
}

/// Outcome of one health check, after retries.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// The endpoint exactly as it appears in the watch list.
    pub endpoint: String,
    pub succeeded: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
    pub checked_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl CheckResult {
    pub fn up(endpoint: impl Into<String>, attempts: u32, status_code: u16) -> Self {
        Self {
            endpoint: endpoint.into(),
            succeeded: true,
            attempts,
            status_code: Some(status_code),
            error: None,
            checked_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn down(endpoint: impl Into<String>, attempts: u32, error: CheckError) -> Self {
        Self {
            endpoint: endpoint.into(),
            succeeded: false,
            attempts,
            status_code: error.status_code(),
            error: Some(error),
            checked_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Probes a single endpoint.
///
/// Implementations own their timeout and retry settings and must never fail:
/// every problem is folded into a failed [`CheckResult`].
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, url: &str) -> CheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_result_carries_status_code() {
        let result = CheckResult::down("https://a.example", 3, CheckError::Status { status: 503 });
        assert!(!result.succeeded);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn invalid_url_is_not_transient() {
        assert!(!CheckError::InvalidUrl { reason: "empty host".into() }.is_transient());
        assert!(CheckError::Network { reason: "refused".into() }.is_transient());
        assert!(CheckError::timeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn huge_timeout_saturates_instead_of_wrapping() {
        assert_eq!(
            CheckError::timeout(Duration::MAX),
            CheckError::Timeout { timeout_ms: u64::MAX }
        );
    }

    #[test]
    fn error_serializes_with_kind_tag() {
        let json = serde_json::to_value(CheckError::Status { status: 502 }).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["status"], 502);
    }
}
