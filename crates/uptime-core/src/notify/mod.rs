//! Availability alerts.
//!
//! The scheduler turns every reportable [`Transition`] into a
//! [`NotificationRequest`] and pushes it through an mpsc channel. The
//! [`NotificationDispatcher`] reads from that channel and hands each request to
//! a [`Notifier`], which delivers it over a [`MailTransport`] with bounded
//! retries. Delivery failures are logged and never reach the scheduler.

mod message;
mod smtp;

pub use message::{compose_body, compose_subject};
pub use smtp::{parse_mailbox, SmtpMailer};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::NotifyConfig;
use crate::monitor::state::{Direction, Transition};
use crate::retry::{retry, RetryPolicy, Transient};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid email address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("Failed to build message: {0}")]
    Message(String),
    #[error("Mail transport error: {reason}")]
    Transport { reason: String, permanent: bool },
    #[error("No recipients configured")]
    NoRecipients,
}

impl Transient for NotifyError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { permanent: false, .. })
    }
}

/// One alert email, ready to send.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub endpoint: String,
    pub direction: Direction,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn from_transition(transition: &Transition, config: &NotifyConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: transition.endpoint.clone(),
            direction: transition.direction,
            recipients: config.recipients.clone(),
            subject: compose_subject(transition, &config.display_name),
            body: compose_body(transition, &config.display_name),
            timestamp: transition.at,
        }
    }
}

/// Something that can put a message in front of its recipients, usually SMTP.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Delivers notification requests with bounded retries.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn from_config(transport: Arc<dyn MailTransport>, config: &NotifyConfig) -> Self {
        Self::new(transport, config.delivery_policy())
    }

    /// Send `request`, returning whether it was delivered.
    pub async fn notify(&self, request: &NotificationRequest) -> bool {
        if request.recipients.is_empty() {
            warn!(
                id = %request.id,
                endpoint = %request.endpoint,
                "Dropping notification: {}",
                NotifyError::NoRecipients
            );
            return false;
        }

        let retried = retry(&self.policy, move |attempt| self.attempt(request, attempt)).await;

        match retried.outcome {
            Ok(()) => {
                info!(
                    id = %request.id,
                    endpoint = %request.endpoint,
                    direction = %request.direction,
                    recipients = request.recipients.len(),
                    attempts = retried.attempts,
                    "Notification delivered"
                );
                true
            }
            Err(e) => {
                error!(
                    id = %request.id,
                    endpoint = %request.endpoint,
                    attempts = retried.attempts,
                    error = %e,
                    "Notification delivery failed"
                );
                false
            }
        }
    }

    async fn attempt(&self, request: &NotificationRequest, attempt: u32) -> Result<(), NotifyError> {
        let result = self.transport.send(request).await;
        if let Err(ref e) = result {
            warn!(id = %request.id, attempt, error = %e, "Notification attempt failed");
        }
        result
    }
}

/// Background task that delivers queued notifications one at a time.
pub struct NotificationDispatcher {
    rx: mpsc::UnboundedReceiver<NotificationRequest>,
    notifier: Notifier,
}

impl NotificationDispatcher {
    pub fn new(rx: mpsc::UnboundedReceiver<NotificationRequest>, notifier: Notifier) -> Self {
        Self { rx, notifier }
    }

    /// Run the dispatcher loop. Returns when all senders are dropped.
    pub async fn run(mut self) {
        debug!("Notification dispatcher started");

        while let Some(request) = self.rx.recv().await {
            self.notifier.notify(&request).await;
        }

        debug!("Notification dispatcher shutting down");
    }
}

pub fn notification_channel() -> (
    mpsc::UnboundedSender<NotificationRequest>,
    mpsc::UnboundedReceiver<NotificationRequest>,
) {
    mpsc::unbounded_channel()
}
