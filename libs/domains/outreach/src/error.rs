//! Error types for the outreach domain.

use thiserror::Error;

/// Result type for outreach operations.
pub type OutreachResult<T> = Result<T, OutreachError>;

/// Errors that can occur while preparing or running a campaign.
///
/// Only [`OutreachError::Configuration`] ever escapes [`crate::CampaignRun::execute`];
/// transport errors are captured into the run summary.
#[derive(Debug, Error)]
pub enum OutreachError {
    /// Missing recipients, empty sender pool, delay below the configured minimum.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A sender could not open or authenticate its transport session.
    #[error("Transport setup failed for {sender}: {reason}")]
    TransportSetup { sender: String, reason: String },

    /// A single message could not be transmitted over a working session.
    #[error("Failed to send to {recipient}: {reason}")]
    RecipientSend { recipient: String, reason: String },

    /// Recipient data could not be read.
    #[error("Recipient source error: {0}")]
    Source(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OutreachError {
    pub fn configuration(message: impl Into<String>) -> Self {
        OutreachError::Configuration(message.into())
    }

    pub fn setup(sender: impl Into<String>, reason: impl ToString) -> Self {
        OutreachError::TransportSetup {
            sender: sender.into(),
            reason: reason.to_string(),
        }
    }

    pub fn send(recipient: impl Into<String>, reason: impl ToString) -> Self {
        OutreachError::RecipientSend {
            recipient: recipient.into(),
            reason: reason.to_string(),
        }
    }

    /// The bare cause, without the "who" prefix the `Display` impl adds.
    pub fn reason(&self) -> String {
        match self {
            OutreachError::TransportSetup { reason, .. }
            | OutreachError::RecipientSend { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for OutreachError {
    fn from(err: serde_json::Error) -> Self {
        OutreachError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<tokio::task::JoinError> for OutreachError {
    fn from(err: tokio::task::JoinError) -> Self {
        OutreachError::Internal(format!("Sender task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strips_context() {
        let err = OutreachError::send("x@y.com", "550 mailbox unavailable");
        assert_eq!(err.reason(), "550 mailbox unavailable");
        assert_eq!(
            err.to_string(),
            "Failed to send to x@y.com: 550 mailbox unavailable"
        );
    }

    #[test]
    fn test_configuration_display() {
        let err = OutreachError::configuration("sender pool is empty");
        assert_eq!(err.to_string(), "Configuration error: sender pool is empty");
        assert_eq!(err.reason(), "Configuration error: sender pool is empty");
    }
}
