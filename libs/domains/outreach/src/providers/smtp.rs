//! SMTP transport using lettre.

use super::{EmailContent, SentEmail, TransportConnector, TransportSession};
use crate::error::{OutreachError, OutreachResult};
use crate::models::{SenderIdentity, TlsMode};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

/// Opens one authenticated SMTP session per sender identity.
#[derive(Debug, Clone, Default)]
pub struct SmtpConnector;

impl SmtpConnector {
    pub fn new() -> Self {
        Self
    }

    /// Build the SMTP transport for an identity.
    fn build_transport(
        identity: &SenderIdentity,
    ) -> OutreachResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = match identity.tls {
            TlsMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&identity.host)
                    .map_err(|e| OutreachError::setup(&identity.email, e))?
            }
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&identity.host)
                .map_err(|e| OutreachError::setup(&identity.email, e))?,
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&identity.host),
        };

        let mut builder = builder
            .port(identity.port)
            // One connection per sender, reused for the whole batch.
            .pool_config(PoolConfig::new().max_size(1));

        if !identity.secret.is_empty() {
            builder = builder.credentials(Credentials::new(
                identity.username.clone(),
                identity.secret.clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl TransportConnector for SmtpConnector {
    async fn connect(&self, identity: &SenderIdentity) -> OutreachResult<Box<dyn TransportSession>> {
        debug!(
            sender = %identity.email,
            host = %identity.host,
            port = identity.port,
            tls = ?identity.tls,
            "Opening SMTP session"
        );

        let transport = Self::build_transport(identity)?;

        // Connects and authenticates, so bad credentials fail the batch up front.
        let connected = transport
            .test_connection()
            .await
            .map_err(|e| OutreachError::setup(&identity.email, e))?;
        if !connected {
            return Err(OutreachError::setup(
                &identity.email,
                "server did not accept the connection",
            ));
        }

        let from = sender_mailbox(identity)?;
        info!(sender = %identity.email, host = %identity.host, "SMTP session ready");

        Ok(Box::new(SmtpSession {
            transport: Some(transport),
            from,
        }))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

fn sender_mailbox(identity: &SenderIdentity) -> OutreachResult<Mailbox> {
    let address: Address = identity
        .email
        .parse()
        .map_err(|e| OutreachError::setup(&identity.email, format!("invalid from address: {}", e)))?;
    Ok(Mailbox::new(identity.name.clone(), address))
}

fn message_id(message: &Message) -> Option<String> {
    message
        .headers()
        .get_raw("Message-ID")
        .map(|id| id.trim().to_string())
}

struct SmtpSession {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpSession {
    /// Build a plain-text lettre Message from EmailContent.
    fn build_message(&self, email: &EmailContent) -> OutreachResult<Message> {
        let to: Mailbox = email
            .to_email
            .parse()
            .map_err(|e| OutreachError::send(&email.to_email, format!("invalid to address: {}", e)))?;

        Message::builder()
            // Generated locally so the id is known whether or not the server echoes one.
            .message_id(None)
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.text_body.clone())
            .map_err(|e| OutreachError::send(&email.to_email, e))
    }
}

#[async_trait]
impl TransportSession for SmtpSession {
    async fn send(&mut self, email: &EmailContent) -> OutreachResult<SentEmail> {
        let message = self.build_message(email)?;
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| OutreachError::send(&email.to_email, "session already closed"))?;

        let message_id = message_id(&message);
        let response = transport
            .send(message)
            .await
            .map_err(|e| OutreachError::send(&email.to_email, e))?;
        debug!(to = %email.to_email, code = %response.code(), "SMTP server accepted message");

        Ok(SentEmail { message_id })
    }

    async fn close(&mut self) {
        // Dropping the transport drops its pooled connection.
        if self.transport.take().is_some() {
            debug!(sender = %self.from, "SMTP session closed");
        }
    }
}
