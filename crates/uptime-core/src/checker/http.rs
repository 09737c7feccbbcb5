use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::{CheckError, CheckResult, HealthChecker};
use crate::config::{CheckMethod, MonitorConfig};
use crate::retry::{retry, AttemptError, RetryPolicy};

/// HTTP reachability checker with connection pooling and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: Client,
    policy: RetryPolicy,
    method: CheckMethod,
    failure_status_threshold: u16,
}

impl HttpChecker {
    pub fn new(
        policy: RetryPolicy,
        method: CheckMethod,
        failure_status_threshold: u16,
    ) -> reqwest::Result<Self> {
        let client = Self::build_client(policy.attempt_timeout)?;
        Ok(Self::with_client(client, policy, method, failure_status_threshold))
    }

    pub fn with_client(
        client: Client,
        policy: RetryPolicy,
        method: CheckMethod,
        failure_status_threshold: u16,
    ) -> Self {
        Self {
            client,
            policy,
            method,
            failure_status_threshold,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> reqwest::Result<Self> {
        Self::new(
            config.check_policy(),
            config.check_method,
            config.failure_status_threshold,
        )
    }

    pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("uptime-monitor/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn probe(&self, url: &Url, attempt: u32) -> Result<u16, CheckError> {
        let request = match self.method {
            CheckMethod::Get => self.client.get(url.clone()),
            CheckMethod::Head => self.client.head(url.clone()),
        };

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status < self.failure_status_threshold {
                    Ok(status)
                } else {
                    Err(CheckError::Status { status })
                }
            }
            Err(e) if e.is_timeout() => Err(CheckError::timeout(self.policy.attempt_timeout)),
            Err(e) => Err(CheckError::Network {
                reason: error_chain(&e),
            }),
        };

        if let Err(ref e) = outcome {
            warn!(url = %url, attempt, error = %e, "Health check attempt failed");
        }
        outcome
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self, url: &str) -> CheckResult {
        let started = Instant::now();

        let target = match normalize_url(url) {
            Ok(target) => target,
            Err(e) => {
                warn!(url, error = %e, "Skipping malformed watch list entry");
                return CheckResult::down(url, 1, e);
            }
        };

        let target = &target;
        let retried = retry(&self.policy, move |attempt| self.probe(target, attempt)).await;
        let elapsed = started.elapsed();

        match retried.outcome {
            Ok(status) => {
                debug!(url, status, attempts = retried.attempts, "Endpoint is up");
                CheckResult::up(url, retried.attempts, status).with_elapsed(elapsed)
            }
            Err(err) => {
                let error = match err {
                    AttemptError::Failed(e) => e,
                    AttemptError::TimedOut(after) => CheckError::timeout(after),
                };
                debug!(url, attempts = retried.attempts, error = %error, "Endpoint is down");
                CheckResult::down(url, retried.attempts, error).with_elapsed(elapsed)
            }
        }
    }
}

/// Turn a watch-list entry into a probe target.
///
/// Entries without a scheme are probed over plain HTTP. Only `http` and `https`
/// URLs with a host are accepted.
pub fn normalize_url(raw: &str) -> Result<Url, CheckError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CheckError::InvalidUrl {
            reason: "empty URL".to_string(),
        });
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|e| CheckError::InvalidUrl {
        reason: format!("{}: {}", raw, e),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CheckError::InvalidUrl {
                reason: format!("unsupported scheme '{}' in {}", other, raw),
            })
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CheckError::InvalidUrl {
            reason: format!("missing host in {}", raw),
        });
    }

    Ok(url)
}

fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = StdError::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker(retries: u32, timeout: Duration) -> HttpChecker {
        HttpChecker::new(RetryPolicy::new(retries, timeout), CheckMethod::Get, 400).unwrap()
    }

    #[tokio::test]
    async fn check_succeeds_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = checker(3, Duration::from_secs(5))
            .check(&format!("{}/health", server.uri()))
            .await;
        assert!(result.succeeded);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn check_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = checker(0, Duration::from_secs(5))
            .check(&format!("{}/old", server.uri()))
            .await;
        assert!(result.succeeded);
        assert_eq!(result.status_code, Some(200));
    }

    #[tokio::test]
    async fn perpetual_failure_uses_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&server)
            .await;

        let result = checker(3, Duration::from_secs(5))
            .check(&format!("{}/down", server.uri()))
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.error, Some(CheckError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result = checker(3, Duration::from_secs(5))
            .check(&format!("{}/flaky", server.uri()))
            .await;
        assert!(result.succeeded);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.status_code, Some(204));
    }

    #[tokio::test]
    async fn threshold_decides_what_counts_as_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let url = format!("{}/missing", server.uri());

        let strict = checker(0, Duration::from_secs(5));
        assert!(!strict.check(&url).await.succeeded);

        let lenient = HttpChecker::new(
            RetryPolicy::new(0, Duration::from_secs(5)),
            CheckMethod::Get,
            500,
        )
        .unwrap();
        assert!(lenient.check(&url).await.succeeded);
    }

    #[tokio::test]
    async fn head_method_is_used_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let head = HttpChecker::new(
            RetryPolicy::new(0, Duration::from_secs(5)),
            CheckMethod::Head,
            400,
        )
        .unwrap();
        assert!(head.check(&format!("{}/", server.uri())).await.succeeded);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let result = checker(1, Duration::from_millis(200))
            .check(&format!("{}/slow", server.uri()))
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 2);
        assert!(matches!(result.error, Some(CheckError::Timeout { .. })));
        assert!(result.elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let result = checker(2, Duration::from_secs(2))
            .check("http://127.0.0.1:1/")
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 3);
        assert!(matches!(result.error, Some(CheckError::Network { .. })));
    }

    #[tokio::test]
    async fn malformed_entry_fails_without_retrying() {
        let result = checker(5, Duration::from_secs(1)).check("ftp://files.example").await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 1);
        assert!(matches!(result.error, Some(CheckError::InvalidUrl { .. })));
    }

    #[test]
    fn normalize_adds_missing_scheme() {
        let url = normalize_url("example.com/status").unwrap();
        assert_eq!(url.as_str(), "http://example.com/status");
    }

    #[test]
    fn normalize_keeps_https() {
        let url = normalize_url("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_url("").is_err());
        assert!(normalize_url("http://").is_err());
        assert!(normalize_url("mailto://someone").is_err());
        assert!(normalize_url("http://exa mple.com").is_err());
    }
}
