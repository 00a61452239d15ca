//! One sender working through its bucket of recipients.
//!
//! For each recipient, in bucket order:
//!
//! 1. blank address: `SkippedEmptyAddress`
//! 2. address already delivered in this run: `SkippedDuplicate`. If another sender is
//!    mid-send to the same address, wait for that attempt and re-check
//! 3. render subject and body, then send over the sender's open session
//! 4. success commits the address to the ledger and bumps progress; failure releases the
//!    claim, is recorded, and the batch carries on
//!
//! After every send attempt the session waits the pacing delay before touching the next
//! recipient. Skips do not pace. The stop signal is checked between recipients and
//! interrupts the pacing delay, never an in-flight send.

use crate::context::resolve_mapped;
use crate::ledger::{Claim, DedupLedger};
use crate::models::{
    ColumnMapping, DispatchOutcome, DispatchStatus, MessageTemplate, OutcomeEvent, Recipient,
    SenderIdentity, SenderReport,
};
use crate::progress::ProgressAggregator;
use crate::providers::{EmailContent, TransportConnector, TransportSession};
use crate::templates::render_message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span, warn};

/// State shared by every sender session of one run.
#[derive(Debug)]
pub struct RunContext {
    pub template: MessageTemplate,
    pub columns: ColumnMapping,
    pub delay: Duration,
    pub ledger: DedupLedger,
    pub progress: ProgressAggregator,
    pub events: Option<mpsc::UnboundedSender<OutcomeEvent>>,
}

impl RunContext {
    pub fn new(
        template: MessageTemplate,
        columns: ColumnMapping,
        delay: Duration,
        total_recipients: usize,
    ) -> Self {
        Self {
            template,
            columns,
            delay,
            ledger: DedupLedger::new(),
            progress: ProgressAggregator::new(total_recipients),
            events: None,
        }
    }
}

/// Drives one sender identity through its bucket.
pub struct SenderSession {
    index: usize,
    identity: SenderIdentity,
    connector: Arc<dyn TransportConnector>,
    run: Arc<RunContext>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SenderSession {
    pub fn new(
        index: usize,
        identity: SenderIdentity,
        connector: Arc<dyn TransportConnector>,
        run: Arc<RunContext>,
    ) -> Self {
        Self {
            index,
            identity,
            connector,
            run,
            shutdown: None,
        }
    }

    /// Stop between recipients once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Open the transport, process `batch`, and close the transport.
    ///
    /// `batch` items carry their position in the run's input. Never fails: a transport that
    /// cannot be opened is reported through [`SenderReport::setup_error`].
    pub async fn run(mut self, batch: Vec<(usize, Recipient)>) -> SenderReport {
        let span = info_span!(
            "sender_batch",
            sender_index = self.index,
            sender = %self.identity.email,
            transport = self.connector.name(),
        );

        async move {
            let mut report = SenderReport::new(self.index, self.identity.email.clone());

            if batch.is_empty() {
                debug!("Empty bucket, not opening a session");
                return report;
            }
            if self.is_cancelled() {
                report.cancelled = true;
                return report;
            }

            info!(recipients = batch.len(), "Starting sender batch");

            let mut session = match self.connector.connect(&self.identity).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, abandoned = batch.len(), "Sender batch abandoned");
                    report.setup_error = Some(e.reason());
                    return report;
                }
            };

            self.drive(session.as_mut(), batch, &mut report).await;
            session.close().await;

            info!(
                sent = report.sent_count(),
                failed = report.failed_count(),
                skipped = report.skipped_count(),
                cancelled = report.cancelled,
                "Sender batch finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Process `batch` over an already open session.
    async fn drive(
        &mut self,
        session: &mut dyn TransportSession,
        batch: Vec<(usize, Recipient)>,
        report: &mut SenderReport,
    ) {
        let mut pace_before_next = false;

        for (position, recipient) in batch {
            if pace_before_next && !self.pause().await {
                report.cancelled = true;
                break;
            }
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let (outcome, attempted) = self.process(session, position, &recipient).await;
            pace_before_next = attempted;
            self.publish(&outcome);
            report.outcomes.push(outcome);
        }
    }

    /// Handle one recipient. The flag is `true` when a send was attempted.
    async fn process(
        &self,
        session: &mut dyn TransportSession,
        position: usize,
        recipient: &Recipient,
    ) -> (DispatchOutcome, bool) {
        let run = &self.run;
        let address = recipient.address(&run.columns.address).to_string();
        let outcome = |status| DispatchOutcome {
            position,
            address: address.clone(),
            status,
        };

        if address.is_empty() {
            debug!(position, "Skipping recipient without address");
            return (outcome(DispatchStatus::SkippedEmptyAddress), false);
        }
        let ticket = match run.ledger.claim(&address).await {
            Claim::Acquired(ticket) => ticket,
            Claim::AlreadySent => {
                debug!(position, to = %address, "Skipping duplicate recipient");
                return (outcome(DispatchStatus::SkippedDuplicate), false);
            }
        };

        let context = resolve_mapped(recipient, &run.columns);
        let rendered = render_message(&run.template, &context);
        let email = EmailContent {
            to_email: address.clone(),
            subject: rendered.subject,
            text_body: rendered.body,
        };

        let status = match session.send(&email).await {
            Ok(sent) => {
                ticket.commit();
                let progress = run.progress.record_sent();
                info!(
                    to = %address,
                    message_id = ?sent.message_id,
                    sent = progress.sent,
                    total = progress.total,
                    "Email sent"
                );
                DispatchStatus::Sent {
                    message_id: sent.message_id,
                }
            }
            Err(e) => {
                drop(ticket);
                warn!(to = %address, error = %e, "Email failed");
                DispatchStatus::Failed { reason: e.reason() }
            }
        };

        (outcome(status), true)
    }

    /// Wait out the pacing delay. Returns `false` if the stop signal arrived meanwhile.
    async fn pause(&mut self) -> bool {
        if self.run.delay.is_zero() {
            return true;
        }

        let Some(shutdown) = self.shutdown.as_mut() else {
            tokio::time::sleep(self.run.delay).await;
            return true;
        };

        let sleep = tokio::time::sleep(self.run.delay);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => true,
            stopped = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                if stopped {
                    false
                } else {
                    // Stop handle dropped without signalling; keep pacing.
                    sleep.await;
                    true
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn publish(&self, outcome: &DispatchOutcome) {
        if let Some(events) = &self.run.events {
            // A closed channel only means nobody is watching.
            let _ = events.send(OutcomeEvent {
                sender_index: self.index,
                sender: self.identity.email.clone(),
                outcome: outcome.clone(),
            });
        }
    }
}
