#![forbid(unsafe_code)]

pub mod checker;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod source;

pub use checker::{CheckError, CheckResult, HealthChecker, HttpChecker};
pub use config::{CheckMethod, MonitorConfig, NotifyConfig, SmtpConfig, SmtpSecurity};
pub use monitor::{
    Direction, EndpointState, EndpointStatus, Scheduler, TickSummary, Transition,
};
pub use notify::{
    notification_channel, MailTransport, NotificationDispatcher, NotificationRequest, Notifier,
    NotifyError, SmtpMailer,
};
pub use retry::{retry, AttemptError, Retried, RetryPolicy, Transient};
pub use source::{EndpointSource, SourceError, WatchListFile};
