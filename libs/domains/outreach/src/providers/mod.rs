//! Outbound transports.
//!
//! A [`TransportConnector`] opens one [`TransportSession`] per sender identity. The session
//! lives for the sender's whole batch and is closed exactly once when the batch ends.

mod brevo;
mod log;
pub mod mock;
mod smtp;

pub use brevo::{BrevoConfig, BrevoConnector};
pub use log::LogConnector;
pub use mock::MockConnector;
pub use smtp::SmtpConnector;

use crate::error::OutreachResult;
use crate::models::SenderIdentity;
use async_trait::async_trait;

/// Provider acknowledgement for a sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
}

/// A rendered message ready for one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailContent {
    pub to_email: String,
    pub subject: String,
    pub text_body: String,
}

/// Opens authenticated sessions for sender identities.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connect and authenticate as `identity`.
    ///
    /// An error here abandons the sender's whole batch.
    async fn connect(&self, identity: &SenderIdentity) -> OutreachResult<Box<dyn TransportSession>>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// An open outbound session owned by one sender.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportSession: Send {
    /// Transmit one message. An error only affects this recipient.
    async fn send(&mut self, email: &EmailContent) -> OutreachResult<SentEmail>;

    /// Release the session.
    async fn close(&mut self);
}
