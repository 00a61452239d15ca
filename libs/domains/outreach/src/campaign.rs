//! Campaign run orchestration.
//!
//! A [`CampaignRun`] validates its inputs, splits recipients round-robin across the sender
//! pool, and drives one [`SenderSession`] per sender, either one after another or as
//! concurrent tasks. The dedup ledger and progress counter live exactly as long as the run.

use crate::allocator::allocate;
use crate::context::resolve_mapped;
use crate::error::{OutreachError, OutreachResult};
use crate::models::{
    CampaignSummary, ColumnMapping, MessageTemplate, OutcomeEvent, Recipient, SenderIdentity,
    SenderReport,
};
use crate::progress::{ProgressAggregator, ProgressSink};
use crate::providers::TransportConnector;
use crate::session::{RunContext, SenderSession};
use crate::templates::{RenderedMessage, render_message};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// How sender batches are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Drain one sender's batch completely before starting the next.
    #[default]
    Sequential,
    /// One task per sender; pacing stays local to each sender.
    Concurrent,
}

/// Knobs for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignOptions {
    /// Pause after each send attempt, per sender.
    pub delay: Duration,
    /// Smallest acceptable `delay`.
    pub min_delay: Duration,
    pub mode: DispatchMode,
}

impl Default for CampaignOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            min_delay: Duration::ZERO,
            mode: DispatchMode::default(),
        }
    }
}

impl CampaignOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One execution of the dispatch engine over one recipient list.
pub struct CampaignRun {
    connector: Arc<dyn TransportConnector>,
    options: CampaignOptions,
    progress_sink: Option<Arc<dyn ProgressSink>>,
    events: Option<mpsc::UnboundedSender<OutcomeEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CampaignRun {
    pub fn new(connector: Arc<dyn TransportConnector>, options: CampaignOptions) -> Self {
        Self {
            connector,
            options,
            progress_sink: None,
            events: None,
            shutdown: None,
        }
    }

    /// Receive a progress update after every successful send.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Receive every outcome as it is produced.
    pub fn with_outcome_channel(mut self, events: mpsc::UnboundedSender<OutcomeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop all senders between recipients once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the campaign to completion.
    ///
    /// Only configuration problems are returned as errors, and they are detected before any
    /// transport is touched. Sender setup failures and per-recipient failures are part of
    /// the returned summary.
    pub async fn execute(
        self,
        recipients: Vec<Recipient>,
        senders: &[SenderIdentity],
        template: &MessageTemplate,
        columns: &ColumnMapping,
    ) -> OutreachResult<CampaignSummary> {
        self.validate(&recipients, senders, columns)?;

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let clock = Instant::now();
        let total_recipients = recipients.len();
        let mode = self.options.mode;

        let span = info_span!(
            "campaign_run",
            %run_id,
            recipients = total_recipients,
            senders = senders.len(),
            transport = self.connector.name(),
            ?mode,
        );

        async move {
            info!(delay_ms = self.options.delay.as_millis() as u64, "Starting campaign run");

            let buckets = allocate(recipients, senders.len())?;

            let mut context = RunContext::new(
                template.clone(),
                columns.clone(),
                self.options.delay,
                total_recipients,
            );
            if let Some(sink) = &self.progress_sink {
                context.progress =
                    ProgressAggregator::new(total_recipients).with_sink(Arc::clone(sink));
            }
            context.events = self.events.clone();
            let run = Arc::new(context);

            let sessions: Vec<_> = senders
                .iter()
                .cloned()
                .enumerate()
                .zip(buckets)
                .map(|((index, identity), bucket)| {
                    let mut session = SenderSession::new(
                        index,
                        identity,
                        Arc::clone(&self.connector),
                        Arc::clone(&run),
                    );
                    if let Some(shutdown) = &self.shutdown {
                        session = session.with_shutdown(shutdown.clone());
                    }
                    (session, bucket)
                })
                .collect();

            let reports = match mode {
                DispatchMode::Sequential => run_sequential(sessions).await,
                DispatchMode::Concurrent => run_concurrent(sessions, senders).await,
            };

            let summary = CampaignSummary {
                run_id,
                total_sent: run.progress.sent(),
                total_recipients,
                cancelled: reports.iter().any(|r| r.cancelled),
                senders: reports,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
            };

            info!(
                sent = summary.total_sent,
                failed = summary.failed_count(),
                skipped = summary.skipped_count(),
                failed_senders = summary.failed_senders().count(),
                cancelled = summary.cancelled,
                duration_ms = summary.duration_ms,
                "Campaign run finished"
            );

            Ok(summary)
        }
        .instrument(span)
        .await
    }

    fn validate(
        &self,
        recipients: &[Recipient],
        senders: &[SenderIdentity],
        columns: &ColumnMapping,
    ) -> OutreachResult<()> {
        if recipients.is_empty() {
            return Err(OutreachError::configuration("no recipients to contact"));
        }
        if senders.is_empty() {
            return Err(OutreachError::configuration("the sender pool is empty"));
        }
        if columns.address.trim().is_empty() {
            return Err(OutreachError::configuration("no address column selected"));
        }
        if self.options.delay < self.options.min_delay {
            return Err(OutreachError::configuration(format!(
                "delay of {:?} is below the minimum of {:?}",
                self.options.delay, self.options.min_delay
            )));
        }
        Ok(())
    }
}

async fn run_sequential(sessions: Vec<(SenderSession, Vec<(usize, Recipient)>)>) -> Vec<SenderReport> {
    let mut reports = Vec::with_capacity(sessions.len());
    for (session, bucket) in sessions {
        reports.push(session.run(bucket).await);
    }
    reports
}

async fn run_concurrent(
    sessions: Vec<(SenderSession, Vec<(usize, Recipient)>)>,
    senders: &[SenderIdentity],
) -> Vec<SenderReport> {
    let handles: Vec<_> = sessions
        .into_iter()
        .map(|(session, bucket)| tokio::spawn(session.run(bucket)))
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (index, (handle, identity)) in handles.into_iter().zip(senders).enumerate() {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                let err = OutreachError::from(e);
                error!(sender_index = index, error = %err, "Sender task did not complete");
                let mut report = SenderReport::new(index, identity.email.clone());
                report.setup_error = Some(err.to_string());
                reports.push(report);
            }
        }
    }
    reports
}

/// Render what `recipient` would receive, without contacting any transport.
pub fn preview(
    recipient: &Recipient,
    template: &MessageTemplate,
    columns: &ColumnMapping,
) -> RenderedMessage {
    render_message(template, &resolve_mapped(recipient, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockConnector;

    fn columns() -> ColumnMapping {
        ColumnMapping::new("email").with_name("name").with_company("company")
    }

    fn template() -> MessageTemplate {
        MessageTemplate::new("Hello {company}", "Hi {name}")
    }

    fn pool(n: usize) -> Vec<SenderIdentity> {
        (0..n)
            .map(|i| SenderIdentity::new(format!("sender{}@example.com", i), "smtp.example.com", "pw"))
            .collect()
    }

    fn recipients(addresses: &[&str]) -> Vec<Recipient> {
        addresses
            .iter()
            .map(|a| Recipient::new().with_field("email", *a))
            .collect()
    }

    fn run(connector: &MockConnector) -> CampaignRun {
        CampaignRun::new(
            Arc::new(connector.clone()),
            CampaignOptions::default().with_delay(Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_empty_recipients_is_configuration_error() {
        let connector = MockConnector::new();
        let err = run(&connector)
            .execute(Vec::new(), &pool(1), &template(), &columns())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
        assert!(connector.opened().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_is_configuration_error() {
        let connector = MockConnector::new();
        let err = run(&connector)
            .execute(recipients(&["a@x.com"]), &[], &template(), &columns())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
        assert!(connector.opened().is_empty());
    }

    #[tokio::test]
    async fn test_delay_below_minimum_is_configuration_error() {
        let connector = MockConnector::new();
        let options = CampaignOptions::default()
            .with_delay(Duration::from_millis(500))
            .with_min_delay(Duration::from_secs(1));
        let err = CampaignRun::new(Arc::new(connector.clone()), options)
            .execute(recipients(&["a@x.com"]), &pool(1), &template(), &columns())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("minimum"));
        assert!(connector.opened().is_empty());
    }

    #[tokio::test]
    async fn test_blank_address_column_is_configuration_error() {
        let connector = MockConnector::new();
        let err = run(&connector)
            .execute(
                recipients(&["a@x.com"]),
                &pool(1),
                &template(),
                &ColumnMapping::new(" "),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_sequential_run_drains_senders_in_pool_order() {
        let connector = MockConnector::new();
        let summary = run(&connector)
            .execute(
                recipients(&["a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com"]),
                &pool(2),
                &template(),
                &columns(),
            )
            .await
            .unwrap();

        assert_eq!(summary.total_sent, 5);
        assert_eq!(summary.total_recipients, 5);
        assert!(!summary.cancelled);
        assert_eq!(
            connector.sent_to(),
            vec!["a@x.com", "c@x.com", "e@x.com", "b@x.com", "d@x.com"]
        );
        assert_eq!(
            connector.opened(),
            vec!["sender0@example.com", "sender1@example.com"]
        );
    }

    #[tokio::test]
    async fn test_progress_sink_sees_each_send() {
        let connector = MockConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(move |update: crate::ProgressUpdate| {
            let _ = tx.send(update.fraction());
        });

        let summary = run(&connector)
            .with_progress_sink(sink)
            .execute(
                recipients(&["a@x.com", " ", "b@x.com", "c@x.com"]),
                &pool(1),
                &template(),
                &columns(),
            )
            .await
            .unwrap();

        let mut fractions = Vec::new();
        while let Ok(f) = rx.try_recv() {
            fractions.push(f);
        }
        assert_eq!(fractions, vec![0.25, 0.5, 0.75]);
        assert_eq!(summary.total_sent, 3);
        assert_eq!(summary.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_preview_renders_without_transport() {
        let recipient = Recipient::new()
            .with_field("email", "ada@example.com")
            .with_field("company", "Analytical Engines");
        let rendered = preview(&recipient, &template(), &columns());
        assert_eq!(rendered.subject, "Hello Analytical Engines");
        assert_eq!(rendered.body, "Hi there");
    }
}
