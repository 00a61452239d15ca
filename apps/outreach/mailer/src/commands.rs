//! `send` and `preview` subcommands.

use crate::config::{Config, Overrides};
use crate::source::RecipientTable;
use clap::Args;
use core_config::dispatch::TransportKind;
use domain_outreach::{
    CampaignRun, CampaignSummary, ColumnMapping, MessageTemplate, OutcomeEvent, ProgressUpdate,
    RenderedMessage,
};
use eyre::{Result, WrapErr, bail, eyre};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

pub const DEFAULT_SUBJECT: &str = "Exploring opportunities to contribute at your startup";

pub const DEFAULT_BODY: &str = "Hi {name},\n\n\
I came across {company} and really liked the problem you're solving.\n\
I'm a final-year student exploring opportunities at fast-moving startups.\n\n\
- Add 1-2 highlights here\n\
- Add 1-2 relevant skills here\n\n\
Would love to connect and explore if I can add value.\n\n\
Best,\nYour Name";

const PREVIEW_SENDER: &str = "example@example.com";

/// Which CSV columns feed the address and placeholders.
#[derive(Debug, Clone, Args)]
pub struct ColumnArgs {
    /// CSV file with one recipient per row
    pub csv: PathBuf,

    /// Column holding the recipient address
    #[arg(long, default_value = "email")]
    pub email_column: String,

    /// Column used for {name}
    #[arg(long)]
    pub name_column: Option<String>,

    /// Column used for {company}
    #[arg(long)]
    pub company_column: Option<String>,
}

impl ColumnArgs {
    pub fn mapping(&self) -> ColumnMapping {
        ColumnMapping {
            address: self.email_column.clone(),
            name: self.name_column.clone(),
            company: self.company_column.clone(),
        }
    }
}

/// Subject and body templates, inline or from files.
#[derive(Debug, Clone, Default, Args)]
pub struct TemplateArgs {
    /// Subject template; placeholders such as {name} and {company} are filled per row
    #[arg(long, conflicts_with = "subject_file")]
    pub subject: Option<String>,

    /// Read the subject template from a file
    #[arg(long)]
    pub subject_file: Option<PathBuf>,

    /// Body template
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the body template from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,
}

impl TemplateArgs {
    pub fn load(&self) -> Result<MessageTemplate> {
        let subject = pick(&self.subject, &self.subject_file, DEFAULT_SUBJECT)?;
        let body = pick(&self.body, &self.body_file, DEFAULT_BODY)?;
        // Newlines in a subject would break the header.
        Ok(MessageTemplate::new(subject.trim(), body))
    }
}

fn pick(inline: &Option<String>, file: &Option<PathBuf>, default: &str) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => read_template(path),
        (None, None) => Ok(default.to_string()),
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read template {}", path.display()))
}

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub columns: ColumnArgs,

    #[command(flatten)]
    pub template: TemplateArgs,

    /// Seconds to wait after each send attempt (overrides OUTREACH_DELAY_SECS)
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Run sender accounts in parallel instead of one after another
    #[arg(long)]
    pub concurrent: bool,

    /// Transport: smtp, brevo or log (dry run)
    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl SendArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            delay_secs: self.delay,
            concurrent: self.concurrent,
            transport: self.transport,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub columns: ColumnArgs,

    #[command(flatten)]
    pub template: TemplateArgs,

    /// Zero-based data row to render
    #[arg(short, long, default_value_t = 0)]
    pub row: usize,

    /// Print the preview as JSON
    #[arg(long)]
    pub json: bool,
}

/// Send the campaign, stopping between recipients once `shutdown` flips.
pub async fn send(
    config: &Config,
    args: &SendArgs,
    shutdown: watch::Receiver<bool>,
) -> Result<CampaignSummary> {
    let columns = args.columns.mapping();
    let template = args.template.load()?;
    let table = RecipientTable::from_path(&args.columns.csv)?;
    table.check_columns(&columns)?;

    if config.senders.is_empty() {
        bail!("No sender accounts configured; set OUTREACH_SENDER_1_EMAIL and OUTREACH_SENDER_1_PASSWORD");
    }
    let senders = config.sender_identities();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_outcomes(events_rx, !args.json));

    let run = CampaignRun::new(config.connector()?, config.campaign_options()?)
        .with_progress_sink(Arc::new(|update: ProgressUpdate| {
            info!(
                sent = update.sent,
                total = update.total,
                percent = (update.fraction() * 100.0).round() as u64,
                "Progress"
            );
        }))
        .with_outcome_channel(events_tx)
        .with_shutdown(shutdown);

    let summary = run
        .execute(table.rows, &senders, &template, &columns)
        .await?;

    printer.await.map_err(|e| eyre!("Outcome printer failed: {}", e))?;
    Ok(summary)
}

async fn print_outcomes(mut events: mpsc::UnboundedReceiver<OutcomeEvent>, enabled: bool) {
    while let Some(event) = events.recv().await {
        if enabled {
            println!(
                "[{}] #{} {} {}",
                event.sender, event.outcome.position, event.outcome.address, event.outcome.status
            );
        }
    }
}

/// Human-readable run summary.
pub fn format_summary(summary: &CampaignSummary) -> String {
    let mut out = format!(
        "Sent {} / {} emails successfully.",
        summary.total_sent, summary.total_recipients
    );
    if summary.failed_count() > 0 {
        out.push_str(&format!(" {} failed.", summary.failed_count()));
    }
    if summary.skipped_count() > 0 {
        out.push_str(&format!(" {} skipped.", summary.skipped_count()));
    }
    for sender in summary.failed_senders() {
        if let Some(reason) = &sender.setup_error {
            out.push_str(&format!("\nSender {} could not connect: {}", sender.sender, reason));
        }
    }
    if summary.cancelled {
        out.push_str("\nStopped before all recipients were processed.");
    }
    out
}

/// One rendered message, as the recipient would see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Preview {
    pub fn to_text(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            self.from, self.to, self.subject, self.body
        )
    }
}

pub fn preview(config: &Config, args: &PreviewArgs) -> Result<Preview> {
    let columns = args.columns.mapping();
    let template = args.template.load()?;
    let table = RecipientTable::from_path(&args.columns.csv)?;
    table.check_columns(&columns)?;
    render_row(config, &table, &columns, &template, args.row)
}

fn render_row(
    config: &Config,
    table: &RecipientTable,
    columns: &ColumnMapping,
    template: &MessageTemplate,
    row: usize,
) -> Result<Preview> {
    let recipient = table.rows.get(row).ok_or_else(|| {
        eyre!("Row {} does not exist; the file has {} data rows", row, table.len())
    })?;

    let RenderedMessage { subject, body } = domain_outreach::preview(recipient, template, columns);
    let from = config
        .senders
        .accounts
        .first()
        .map(|a| a.email.clone())
        .unwrap_or_else(|| PREVIEW_SENDER.to_string());

    Ok(Preview {
        from,
        to: recipient.address(&columns.address).to_string(),
        subject,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Environment;
    use core_config::dispatch::DispatchConfig;
    use core_config::senders::{SenderAccountConfig, SenderPoolConfig};
    use std::io::Write;

    fn config(accounts: Vec<SenderAccountConfig>) -> Config {
        Config {
            environment: Environment::Development,
            senders: SenderPoolConfig::new(accounts).unwrap(),
            dispatch: DispatchConfig {
                delay_secs: 0.0,
                transport: TransportKind::Log,
                ..Default::default()
            },
        }
    }

    fn columns() -> ColumnMapping {
        ColumnMapping::new("Email")
            .with_name("Name")
            .with_company("Company")
    }

    fn table() -> RecipientTable {
        RecipientTable::from_reader(
            "Email,Name,Company\nada@x.com,Ada,Engines\n grace@x.com ,,\n".as_bytes(),
        )
        .unwrap()
    }

    fn write_csv(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "outreach-mailer-test-{}-{}.csv",
            std::process::id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_default_template_uses_both_placeholders() {
        let template = TemplateArgs::default().load().unwrap();
        assert_eq!(template.subject, DEFAULT_SUBJECT);
        assert!(template.body.starts_with("Hi {name},"));
        assert!(template.body.contains("{company}"));
    }

    #[test]
    fn test_inline_template_wins() {
        let args = TemplateArgs {
            subject: Some("Hello {company}\n".to_string()),
            body: Some("Hi {name}".to_string()),
            ..Default::default()
        };
        let template = args.load().unwrap();
        assert_eq!(template.subject, "Hello {company}");
        assert_eq!(template.body, "Hi {name}");
    }

    #[test]
    fn test_missing_template_file_is_an_error() {
        let args = TemplateArgs {
            body_file: Some(PathBuf::from("/nonexistent/body.txt")),
            ..Default::default()
        };
        assert!(args.load().is_err());
    }

    #[test]
    fn test_preview_renders_selected_row() {
        let template = TemplateArgs::default().load().unwrap();
        let config = config(vec![SenderAccountConfig::new("me@x.com", "pw")]);

        let preview = render_row(&config, &table(), &columns(), &template, 0).unwrap();
        assert_eq!(preview.from, "me@x.com");
        assert_eq!(preview.to, "ada@x.com");
        assert!(preview.body.starts_with("Hi Ada,"));
        assert!(preview.body.contains("I came across Engines"));
    }

    #[test]
    fn test_preview_falls_back_without_senders_or_fields() {
        let template = MessageTemplate::new("For {company}", "Hi {name}");
        let preview = render_row(&config(vec![]), &table(), &columns(), &template, 1).unwrap();
        assert_eq!(preview.from, PREVIEW_SENDER);
        assert_eq!(preview.to, "grace@x.com");
        assert_eq!(preview.subject, "For your company");
        assert_eq!(preview.body, "Hi there");
        assert!(preview.to_text().starts_with("From: example@example.com\nTo: grace@x.com"));
    }

    #[test]
    fn test_preview_row_out_of_range() {
        let template = TemplateArgs::default().load().unwrap();
        let err = render_row(&config(vec![]), &table(), &columns(), &template, 5).unwrap_err();
        assert!(err.to_string().contains("2 data rows"));
    }

    #[tokio::test]
    async fn test_dry_run_send_reports_summary() {
        let path = write_csv("Email,Name\na@x.com,Ann\nb@x.com,Ben\na@x.com,Ann\n");
        let args = SendArgs {
            columns: ColumnArgs {
                csv: path.clone(),
                email_column: "Email".to_string(),
                name_column: Some("Name".to_string()),
                company_column: None,
            },
            template: TemplateArgs::default(),
            delay: None,
            concurrent: false,
            transport: None,
            json: true,
        };
        let config = config(vec![
            SenderAccountConfig::new("one@x.com", "pw"),
            SenderAccountConfig::new("two@x.com", "pw"),
        ]);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let summary = send(&config, &args, stop_rx).await.unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(summary.total_sent, 2);
        assert_eq!(summary.total_recipients, 3);
        assert_eq!(summary.skipped_count(), 1);
        assert_eq!(
            format_summary(&summary),
            "Sent 2 / 3 emails successfully. 1 skipped."
        );
    }

    #[tokio::test]
    async fn test_send_without_senders_fails_before_sending() {
        let path = write_csv("Email\na@x.com\n");
        let args = SendArgs {
            columns: ColumnArgs {
                csv: path.clone(),
                email_column: "Email".to_string(),
                name_column: None,
                company_column: None,
            },
            template: TemplateArgs::default(),
            delay: None,
            concurrent: false,
            transport: None,
            json: true,
        };
        let (_stop_tx, stop_rx) = watch::channel(false);

        let err = send(&config(vec![]), &args, stop_rx).await.unwrap_err();
        std::fs::remove_file(path).ok();
        assert!(err.to_string().contains("No sender accounts"));
    }
}
