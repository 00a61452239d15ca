//! Outreach Domain
//!
//! Personalized plain-text outreach to a list of recipients through a pool of sender
//! accounts.
//!
//! # Features
//!
//! - `{name}`-style placeholder templates with graceful fallback
//! - Round-robin distribution of recipients across up to N sender accounts
//! - Run-scoped duplicate suppression shared by all senders
//! - Per-sender pacing between send attempts
//! - Aggregate progress reporting and per-recipient outcomes
//! - SMTP, Brevo HTTP API and dry-run transports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   CampaignRun   │  ← Validates, allocates, schedules senders
//! └────────┬────────┘
//!          │ round-robin buckets
//! ┌────────▼────────┐
//! │  SenderSession  │  ← One per sender: skip / render / send / pace
//! └────────┬────────┘
//!          │ shared: DedupLedger, ProgressAggregator
//! ┌────────▼────────┐
//! │ TransportSession│  ← SMTP, Brevo, dry-run log
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_outreach::{CampaignOptions, CampaignRun, ColumnMapping, MessageTemplate};
//! use domain_outreach::providers::SmtpConnector;
//!
//! let summary = CampaignRun::new(Arc::new(SmtpConnector::new()), CampaignOptions::default())
//!     .execute(recipients, &senders, &template, &ColumnMapping::new("email"))
//!     .await?;
//!
//! println!("Sent {} / {}", summary.total_sent, summary.total_recipients);
//! ```

pub mod allocator;
pub mod campaign;
pub mod context;
pub mod error;
pub mod ledger;
pub mod models;
pub mod progress;
pub mod providers;
pub mod session;
pub mod templates;

// Re-export commonly used types
pub use allocator::allocate;
pub use campaign::{CampaignOptions, CampaignRun, DispatchMode, preview};
pub use context::{COMPANY_FALLBACK, NAME_FALLBACK, resolve, resolve_mapped};
pub use error::{OutreachError, OutreachResult};
pub use ledger::{Claim, ClaimTicket, DedupLedger};
pub use models::{
    CampaignSummary, ColumnMapping, DispatchOutcome, DispatchStatus, MessageTemplate,
    OutcomeEvent, Recipient, SenderIdentity, SenderReport, TlsMode,
};
pub use progress::{ProgressAggregator, ProgressSink, ProgressUpdate};
pub use providers::{TransportConnector, TransportSession};
pub use templates::{RenderContext, RenderedMessage, render, render_message};
