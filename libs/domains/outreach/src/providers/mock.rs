//! In-memory transport for tests.
//!
//! Records every message and every session lifecycle event, and can be told to fail
//! connecting for given senders or sending to given recipients.

use super::{EmailContent, SentEmail, TransportConnector, TransportSession};
use crate::error::{OutreachError, OutreachResult};
use crate::models::SenderIdentity;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A message captured by the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEmail {
    pub from: String,
    pub email: EmailContent,
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<RecordedEmail>,
    opened: Vec<String>,
    closed: Vec<String>,
}

/// Mock connector that captures sent emails.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    refuse_senders: Arc<HashSet<String>>,
    reject_recipients: Arc<HashSet<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `connect` for these sender addresses.
    pub fn refusing_senders<I, S>(mut self, senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refuse_senders = Arc::new(senders.into_iter().map(Into::into).collect());
        self
    }

    /// Fail `send` for these recipient addresses.
    pub fn rejecting_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reject_recipients = Arc::new(recipients.into_iter().map(Into::into).collect());
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Get all sent emails, in send order.
    pub fn sent(&self) -> Vec<RecordedEmail> {
        self.with_state(|s| s.sent.clone())
    }

    /// Addresses of sent emails, in send order.
    pub fn sent_to(&self) -> Vec<String> {
        self.with_state(|s| s.sent.iter().map(|r| r.email.to_email.clone()).collect())
    }

    /// Check if an email was sent to a specific address.
    pub fn was_sent_to(&self, address: &str) -> bool {
        self.with_state(|s| s.sent.iter().any(|r| r.email.to_email == address))
    }

    /// Senders whose sessions were opened, in order.
    pub fn opened(&self) -> Vec<String> {
        self.with_state(|s| s.opened.clone())
    }

    /// Senders whose sessions were closed, in order.
    pub fn closed(&self) -> Vec<String> {
        self.with_state(|s| s.closed.clone())
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(&self, identity: &SenderIdentity) -> OutreachResult<Box<dyn TransportSession>> {
        if self.refuse_senders.contains(&identity.email) {
            return Err(OutreachError::setup(&identity.email, "535 authentication failed"));
        }
        self.with_state(|s| s.opened.push(identity.email.clone()));
        Ok(Box::new(MockSession {
            connector: self.clone(),
            sender: identity.email.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    connector: MockConnector,
    sender: String,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send(&mut self, email: &EmailContent) -> OutreachResult<SentEmail> {
        if self.connector.reject_recipients.contains(&email.to_email) {
            return Err(OutreachError::send(&email.to_email, "550 mailbox unavailable"));
        }
        let sequence = self.connector.with_state(|s| {
            s.sent.push(RecordedEmail {
                from: self.sender.clone(),
                email: email.clone(),
            });
            s.sent.len()
        });
        Ok(SentEmail {
            message_id: Some(format!("mock-{}", sequence)),
        })
    }

    async fn close(&mut self) {
        self.connector.with_state(|s| s.closed.push(self.sender.clone()));
    }
}
