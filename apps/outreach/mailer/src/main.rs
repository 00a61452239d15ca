//! Outreach Mailer
//!
//! Sends personalised plain-text emails to every row of a CSV file, spreading the rows
//! round-robin over up to four sender accounts and never contacting an address twice in
//! one run. `preview` renders a single row without sending anything.

use clap::{Parser, Subcommand};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use eyre::Result;
use tokio::sync::watch;
use tracing::{info, warn};

mod commands;
mod config;
mod source;

use commands::{PreviewArgs, SendArgs};
use config::Config;

#[derive(Parser)]
#[command(name = "outreach-mailer")]
#[command(about = "Send personalised outreach emails from a CSV through a pool of sender accounts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send the campaign to every row of the CSV
    Send(SendArgs),

    /// Render the email for one row without sending
    Preview(PreviewArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();

    init_tracing(&Environment::from_env());

    match cli.command {
        Commands::Send(args) => {
            let config = Config::from_env()?.apply(&args.overrides())?;
            info!(
                environment = ?config.environment,
                senders = config.senders.len(),
                transport = %config.dispatch.transport,
                delay_secs = config.dispatch.delay_secs,
                concurrent = config.dispatch.concurrent,
                "Starting outreach"
            );

            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Stop requested; finishing in-flight sends");
                    let _ = stop_tx.send(true);
                }
            });

            let summary = commands::send(&config, &args, stop_rx).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", commands::format_summary(&summary));
            }
        }

        Commands::Preview(args) => {
            let preview = commands::preview(&Config::for_preview(), &args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                println!("{}", preview.to_text());
            }
        }
    }

    Ok(())
}
