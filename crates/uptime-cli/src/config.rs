//! Environment-driven configuration.
//!
//! Every key has a default, so an empty environment yields a usable (if
//! recipient-less) monitor. A `.env` file is loaded into the process
//! environment before this runs. Example:
//!
//! ```text
//! WATCH_LIST_PATH=/etc/uptime/watchlist.txt
//! MONITOR_INTERVAL=60
//! DOWN_MONITOR_INTERVAL=20
//! REQUEST_TIMEOUT=10
//! REQUEST_RETRIES=2
//! EMAIL_SENDER="Uptime <uptime@example.com>"
//! EMAIL_RECIPIENTS=oncall@example.com,ops@example.com
//! SMTP_HOST=smtp.example.com
//! SMTP_USERNAME=uptime
//! SMTP_PASSWORD=secret
//! NAME=Ops
//! LOG_FORMAT=json
//! ```

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use uptime_core::notify::parse_mailbox;
use uptime_core::{CheckMethod, MonitorConfig, NotifyConfig, NotifyError, SmtpConfig, SmtpSecurity};

/// Longest accepted per-attempt timeout, for both checks and deliveries.
const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Invalid address in {key}: {source}")]
    InvalidAddress {
        key: &'static str,
        #[source]
        source: NotifyError,
    },
    #[error("SMTP_USERNAME and SMTP_PASSWORD must be set together")]
    IncompleteCredentials,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
    pub smtp: SmtpConfig,
    pub log_format: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let mut monitor = MonitorConfig::default()
            .with_interval(env.positive_secs("MONITOR_INTERVAL", 300)?)
            .with_request_timeout(Duration::from_secs(env.timeout_secs("REQUEST_TIMEOUT", 90)?))
            .with_request_retries(env.parse("REQUEST_RETRIES", 10)?)
            .with_retry_backoff(Duration::from_millis(env.parse("RETRY_BACKOFF_MS", 0)?))
            .with_check_method(env.check_method()?)
            .with_failure_status_threshold(env.status_threshold()?)
            .with_alert_on_initial_down(env.flag("ALERT_ON_INITIAL_DOWN", false)?);
        if let Some(path) = env.get("WATCH_LIST_PATH") {
            monitor = monitor.with_watch_list(path);
        }
        if env.get("DOWN_MONITOR_INTERVAL").is_some() {
            monitor = monitor.with_down_interval(env.positive_secs("DOWN_MONITOR_INTERVAL", 0)?);
        }
        let max_concurrent: usize = env.parse("MAX_CONCURRENT_CHECKS", 16)?;
        if max_concurrent == 0 {
            return Err(env.invalid("MAX_CONCURRENT_CHECKS", "must be at least 1"));
        }
        monitor = monitor.with_max_concurrent_checks(max_concurrent);

        let mut notify = NotifyConfig::default().with_max_retries(env.parse("NOTIFY_RETRIES", 3)?);
        notify.send_timeout = Duration::from_secs(env.timeout_secs("NOTIFY_TIMEOUT", 30)?);
        if let Some(sender) = env.get("EMAIL_SENDER") {
            notify = notify.with_sender(sender);
        }
        if let Some(name) = env.get("NAME") {
            notify = notify.with_display_name(name);
        }
        if let Some(list) = env.get("EMAIL_RECIPIENTS") {
            notify = notify.with_recipients(split_recipients(&list));
        }

        let mut smtp = SmtpConfig {
            username: env.get("SMTP_USERNAME"),
            password: env.get("SMTP_PASSWORD"),
            port: env.parse("SMTP_PORT", 587)?,
            security: env.smtp_security()?,
            verify_on_startup: env.flag("SMTP_VERIFY", true)?,
            ..SmtpConfig::default()
        };
        if let Some(host) = env.get("SMTP_HOST") {
            smtp.host = host;
        }

        let log_format = env.get("LOG_FORMAT").unwrap_or_else(|| "pretty".into());

        let config = Self {
            monitor,
            notify,
            smtp,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_mailbox(&self.notify.sender).map_err(|source| ConfigError::InvalidAddress {
            key: "EMAIL_SENDER",
            source,
        })?;
        for recipient in &self.notify.recipients {
            parse_mailbox(recipient).map_err(|source| ConfigError::InvalidAddress {
                key: "EMAIL_RECIPIENTS",
                source,
            })?;
        }

        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            return Err(ConfigError::IncompleteCredentials);
        }

        match self.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "must be 'pretty' or 'json'".into(),
                });
            }
        }

        Ok(())
    }
}

fn split_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key,
            value: self.get(key).unwrap_or_default(),
            reason: reason.into(),
        }
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
        }
    }

    fn positive_secs(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(self.invalid(key, "must be greater than zero")),
            secs => Ok(secs),
        }
    }

    fn timeout_secs(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        let secs = self.positive_secs(key, default)?;
        if secs > MAX_TIMEOUT_SECS {
            return Err(self.invalid(key, format!("must be at most {}", MAX_TIMEOUT_SECS)));
        }
        Ok(secs)
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(self.invalid(key, "expected true or false")),
        }
    }

    fn check_method(&self) -> Result<CheckMethod, ConfigError> {
        match self.get("CHECK_METHOD").map(|v| v.to_ascii_uppercase()).as_deref() {
            None | Some("GET") => Ok(CheckMethod::Get),
            Some("HEAD") => Ok(CheckMethod::Head),
            Some(_) => Err(self.invalid("CHECK_METHOD", "must be GET or HEAD")),
        }
    }

    fn status_threshold(&self) -> Result<u16, ConfigError> {
        let status: u16 = self.parse("FAILURE_STATUS_THRESHOLD", 400)?;
        if !(200..=600).contains(&status) {
            return Err(self.invalid("FAILURE_STATUS_THRESHOLD", "must be between 200 and 600"));
        }
        Ok(status)
    }

    fn smtp_security(&self) -> Result<SmtpSecurity, ConfigError> {
        match self.get("SMTP_SECURITY").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("starttls") => Ok(SmtpSecurity::StartTls),
            Some("tls") => Ok(SmtpSecurity::Tls),
            Some("none") => Ok(SmtpSecurity::None),
            Some(_) => Err(self.invalid("SMTP_SECURITY", "must be starttls, tls or none")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.monitor.watch_list, PathBuf::from("watchlist.txt"));
        assert_eq!(config.monitor.interval, Duration::from_secs(300));
        assert_eq!(config.monitor.down_interval, None);
        assert_eq!(config.monitor.request_timeout, Duration::from_secs(90));
        assert_eq!(config.monitor.request_retries, 10);
        assert_eq!(config.monitor.check_method, CheckMethod::Get);
        assert_eq!(config.monitor.failure_status_threshold, 400);
        assert!(!config.monitor.alert_on_initial_down);
        assert_eq!(config.notify.display_name, "Devs");
        assert!(config.notify.recipients.is_empty());
        assert_eq!(config.smtp.host, "localhost");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.security, SmtpSecurity::StartTls);
        assert!(config.smtp.verify_on_startup);
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn full_environment() {
        let config = load(&[
            ("WATCH_LIST_PATH", "/tmp/list.txt"),
            ("MONITOR_INTERVAL", "60"),
            ("DOWN_MONITOR_INTERVAL", "20"),
            ("REQUEST_TIMEOUT", "10"),
            ("REQUEST_RETRIES", "2"),
            ("RETRY_BACKOFF_MS", "250"),
            ("CHECK_METHOD", "head"),
            ("FAILURE_STATUS_THRESHOLD", "500"),
            ("MAX_CONCURRENT_CHECKS", "4"),
            ("NOTIFY_RETRIES", "5"),
            ("NOTIFY_TIMEOUT", "15"),
            ("EMAIL_SENDER", "Uptime <uptime@example.com>"),
            ("EMAIL_RECIPIENTS", "a@x.com, b@x.com,,"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "465"),
            ("SMTP_USERNAME", "uptime"),
            ("SMTP_PASSWORD", "secret"),
            ("SMTP_SECURITY", "TLS"),
            ("SMTP_VERIFY", "false"),
            ("ALERT_ON_INITIAL_DOWN", "yes"),
            ("NAME", "Ops"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.monitor.watch_list, PathBuf::from("/tmp/list.txt"));
        assert_eq!(config.monitor.interval, Duration::from_secs(60));
        assert_eq!(config.monitor.down_interval, Some(Duration::from_secs(20)));
        assert_eq!(config.monitor.request_timeout, Duration::from_secs(10));
        assert_eq!(config.monitor.request_retries, 2);
        assert_eq!(config.monitor.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.monitor.check_method, CheckMethod::Head);
        assert_eq!(config.monitor.failure_status_threshold, 500);
        assert_eq!(config.monitor.max_concurrent_checks, 4);
        assert!(config.monitor.alert_on_initial_down);
        assert_eq!(config.notify.max_retries, 5);
        assert_eq!(config.notify.send_timeout, Duration::from_secs(15));
        assert_eq!(config.notify.sender, "Uptime <uptime@example.com>");
        assert_eq!(config.notify.recipients, vec!["a@x.com", "b@x.com"]);
        assert_eq!(config.notify.display_name, "Ops");
        assert_eq!(config.smtp.host, "smtp.example.com");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.security, SmtpSecurity::Tls);
        assert!(!config.smtp.verify_on_startup);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("MONITOR_INTERVAL", "  "), ("NAME", "")]).unwrap();
        assert_eq!(config.monitor.interval, Duration::from_secs(300));
        assert_eq!(config.notify.display_name, "Devs");
    }

    #[test]
    fn rejects_zero_interval() {
        let err = load(&[("MONITOR_INTERVAL", "0")]).unwrap_err();
        assert!(err.to_string().contains("MONITOR_INTERVAL"), "{}", err);

        let err = load(&[("DOWN_MONITOR_INTERVAL", "0")]).unwrap_err();
        assert!(err.to_string().contains("DOWN_MONITOR_INTERVAL"), "{}", err);
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let err = load(&[("REQUEST_TIMEOUT", "ninety")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REQUEST_TIMEOUT", .. }));
    }

    #[test]
    fn rejects_oversized_timeouts() {
        let err = load(&[("REQUEST_TIMEOUT", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REQUEST_TIMEOUT", .. }));
        assert!(err.to_string().contains("at most 3600"), "{}", err);

        let err = load(&[("NOTIFY_TIMEOUT", "3601")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "NOTIFY_TIMEOUT", .. }));

        assert!(load(&[("REQUEST_TIMEOUT", "3600")]).is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(load(&[("FAILURE_STATUS_THRESHOLD", "199")]).is_err());
        assert!(load(&[("FAILURE_STATUS_THRESHOLD", "601")]).is_err());
        assert!(load(&[("FAILURE_STATUS_THRESHOLD", "600")]).is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = load(&[("MAX_CONCURRENT_CHECKS", "0")]).unwrap_err();
        assert!(err.to_string().contains("at least 1"), "{}", err);
    }

    #[test]
    fn rejects_unknown_enums() {
        assert!(load(&[("CHECK_METHOD", "POST")]).is_err());
        assert!(load(&[("SMTP_SECURITY", "ssl")]).is_err());
        assert!(load(&[("SMTP_VERIFY", "maybe")]).is_err());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let err = load(&[("EMAIL_RECIPIENTS", "a@x.com,not-an-address")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { key: "EMAIL_RECIPIENTS", .. }));
    }

    #[test]
    fn rejects_invalid_sender() {
        let err = load(&[("EMAIL_SENDER", "nobody")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { key: "EMAIL_SENDER", .. }));
    }

    #[test]
    fn rejects_half_credentials() {
        let err = load(&[("SMTP_USERNAME", "uptime")]).unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteCredentials));
    }

    #[test]
    fn rejects_invalid_log_format() {
        let err = load(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"), "{}", err);
    }

    #[test]
    fn password_is_masked_in_debug_output() {
        let config = load(&[("SMTP_USERNAME", "uptime"), ("SMTP_PASSWORD", "hunter2")]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
    }
}
