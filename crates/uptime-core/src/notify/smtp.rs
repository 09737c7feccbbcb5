use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use super::{MailTransport, NotificationRequest, NotifyError};
use crate::config::{SmtpConfig, SmtpSecurity};

/// SMTP delivery through a pooled, optionally authenticated relay connection.
///
/// Recipients go in `Bcc` and the sender in `To`, so nobody sees the rest of
/// the distribution list.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, sender: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let from = parse_mailbox(sender)?;

        let builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(transport_error)?
            }
            SmtpSecurity::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(transport_error)?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host.clone(),
        })
    }

    /// Open a connection (and authenticate, when credentials are set).
    pub async fn verify(&self) -> Result<(), NotifyError> {
        match self.transport.test_connection().await {
            Ok(true) => {
                info!(host = %self.host, "SMTP connection verified");
                Ok(())
            }
            Ok(false) => Err(NotifyError::Transport {
                reason: format!("{} rejected the connection test", self.host),
                permanent: true,
            }),
            Err(e) => Err(transport_error(e)),
        }
    }

    pub fn build_message(&self, request: &NotificationRequest) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.from.clone())
            .subject(request.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &request.recipients {
            builder = builder.bcc(parse_mailbox(recipient)?);
        }

        builder
            .body(request.body.clone())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let message = self.build_message(request)?;
        let response = self.transport.send(message).await.map_err(transport_error)?;
        debug!(id = %request.id, code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

pub fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.trim().parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

fn transport_error(e: lettre::transport::smtp::Error) -> NotifyError {
    NotifyError::Transport {
        permanent: e.is_permanent(),
        reason: e.to_string(),
    }
}
