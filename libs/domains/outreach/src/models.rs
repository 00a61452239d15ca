//! Data models for the outreach domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Inputs
// ============================================================================

/// One row of recipient data, keyed by column name.
///
/// The engine only reads the columns named by a [`ColumnMapping`]; everything else
/// rides along untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    fields: BTreeMap<String, String>,
}

impl Recipient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a field.
    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Raw value of a column, if the row has it.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Trimmed address from `column`; empty when the column is missing or blank.
    pub fn address<'a>(&'a self, column: &str) -> &'a str {
        self.field(column).map(str::trim).unwrap_or_default()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl<K, V> FromIterator<(K, V)> for Recipient
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Which recipient columns hold the address, name and company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub address: String,
    pub name: Option<String>,
    pub company: Option<String>,
}

impl ColumnMapping {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            company: None,
        }
    }

    pub fn with_name(mut self, column: impl Into<String>) -> Self {
        self.name = Some(column.into());
        self
    }

    pub fn with_company(mut self, column: impl Into<String>) -> Self {
        self.company = Some(column.into());
        self
    }
}

/// How an SMTP session is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    StartTls,
    Implicit,
    None,
}

/// An address used as `From`, plus the credentials to open its outbound session.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub email: String,
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub tls: TlsMode,
}

impl SenderIdentity {
    /// Identity with STARTTLS on port 587, logging in with the address itself.
    pub fn new(
        email: impl Into<String>,
        host: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let email = email.into();
        Self {
            username: email.clone(),
            email,
            name: None,
            host: host.into(),
            port: 587,
            secret: secret.into(),
            tls: TlsMode::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }
}

impl fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Subject and body templates shared by every recipient of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent { message_id: Option<String> },
    SkippedDuplicate,
    SkippedEmptyAddress,
    Failed { reason: String },
}

impl DispatchStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchStatus::Sent { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DispatchStatus::SkippedDuplicate | DispatchStatus::SkippedEmptyAddress
        )
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Sent { .. } => write!(f, "sent"),
            DispatchStatus::SkippedDuplicate => write!(f, "skipped-duplicate"),
            DispatchStatus::SkippedEmptyAddress => write!(f, "skipped-empty-address"),
            DispatchStatus::Failed { reason } => write!(f, "failed({})", reason),
        }
    }
}

/// Per-recipient result, tagged with the recipient's position in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// 0-based index of the recipient in the run's input order.
    pub position: usize,
    /// Trimmed address (empty for `SkippedEmptyAddress`).
    pub address: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
}

/// Live notification emitted as each outcome is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeEvent {
    pub sender_index: usize,
    pub sender: String,
    pub outcome: DispatchOutcome,
}

/// Everything one sender did during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderReport {
    pub sender_index: usize,
    pub sender: String,
    /// Set when the session could not be opened; `outcomes` is then empty.
    pub setup_error: Option<String>,
    /// Set when a stop signal ended the batch early.
    pub cancelled: bool,
    pub outcomes: Vec<DispatchOutcome>,
}

impl SenderReport {
    pub fn new(sender_index: usize, sender: impl Into<String>) -> Self {
        Self {
            sender_index,
            sender: sender.into(),
            setup_error: None,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.count(DispatchStatus::is_sent)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, DispatchStatus::Failed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(DispatchStatus::is_skip)
    }

    fn count(&self, pred: impl Fn(&DispatchStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Result of one campaign run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub run_id: Uuid,
    pub total_sent: usize,
    pub total_recipients: usize,
    pub senders: Vec<SenderReport>,
    /// True when a stop signal ended the run before every batch was drained.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CampaignSummary {
    /// All outcomes across senders, ordered by input position.
    pub fn outcomes(&self) -> Vec<&DispatchOutcome> {
        let mut outcomes: Vec<_> = self.senders.iter().flat_map(|s| &s.outcomes).collect();
        outcomes.sort_by_key(|o| o.position);
        outcomes
    }

    pub fn failed_count(&self) -> usize {
        self.senders.iter().map(SenderReport::failed_count).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.senders.iter().map(SenderReport::skipped_count).sum()
    }

    /// Senders whose transport could not be opened.
    pub fn failed_senders(&self) -> impl Iterator<Item = &SenderReport> {
        self.senders.iter().filter(|s| s.setup_error.is_some())
    }

    /// Fraction of recipients successfully contacted.
    pub fn progress(&self) -> f64 {
        if self.total_recipients == 0 {
            return 0.0;
        }
        self.total_sent as f64 / self.total_recipients as f64
    }
}
