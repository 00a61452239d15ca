//! Dry-run transport that writes messages to the log instead of sending them.

use super::{EmailContent, SentEmail, TransportConnector, TransportSession};
use crate::error::OutreachResult;
use crate::models::SenderIdentity;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LogConnector;

impl LogConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for LogConnector {
    async fn connect(&self, identity: &SenderIdentity) -> OutreachResult<Box<dyn TransportSession>> {
        info!(sender = %identity.email, "[dry-run] Session opened");
        Ok(Box::new(LogSession {
            sender: identity.email.clone(),
            sequence: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

struct LogSession {
    sender: String,
    sequence: u64,
}

#[async_trait]
impl TransportSession for LogSession {
    async fn send(&mut self, email: &EmailContent) -> OutreachResult<SentEmail> {
        self.sequence += 1;
        info!(
            from = %self.sender,
            to = %email.to_email,
            subject = %email.subject,
            "[dry-run] Would send email\n{}",
            email.text_body
        );
        Ok(SentEmail {
            message_id: Some(format!("dry-run-{}-{}", self.sender, self.sequence)),
        })
    }

    async fn close(&mut self) {
        info!(sender = %self.sender, messages = self.sequence, "[dry-run] Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_session_never_fails() {
        let identity = SenderIdentity::new("s@example.com", "", "");
        let mut session = LogConnector::new().connect(&identity).await.unwrap();
        let email = EmailContent {
            to_email: "r@example.com".into(),
            subject: "Hi".into(),
            text_body: "Body".into(),
        };
        let first = session.send(&email).await.unwrap();
        let second = session.send(&email).await.unwrap();
        assert_eq!(first.message_id.as_deref(), Some("dry-run-s@example.com-1"));
        assert_ne!(first.message_id, second.message_id);
        session.close().await;
    }
}
