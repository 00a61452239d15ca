//! Configuration for the outreach mailer

use core_config::dispatch::{DispatchConfig, TransportKind};
use core_config::senders::{SenderAccountConfig, SenderPoolConfig, TlsSetting};
use core_config::{Environment, FromEnv};
use domain_outreach::providers::{BrevoConfig, BrevoConnector, LogConnector, SmtpConnector};
use domain_outreach::{CampaignOptions, DispatchMode, SenderIdentity, TlsMode, TransportConnector};
use eyre::{Result, eyre};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub senders: SenderPoolConfig,
    pub dispatch: DispatchConfig,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub delay_secs: Option<f64>,
    pub concurrent: bool,
    pub transport: Option<TransportKind>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            senders: SenderPoolConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
        })
    }

    /// Configuration for commands that never send.
    ///
    /// A half-configured sender slot or dispatch setting only matters once mail goes out, so
    /// it is logged and replaced by defaults here instead of failing.
    pub fn for_preview() -> Self {
        let senders = SenderPoolConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring sender configuration for preview");
            SenderPoolConfig::default()
        });
        let dispatch = DispatchConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring dispatch configuration for preview");
            DispatchConfig::default()
        });

        Self {
            environment: Environment::from_env(),
            senders,
            dispatch,
        }
    }

    pub fn apply(mut self, overrides: &Overrides) -> Result<Self> {
        if let Some(delay) = overrides.delay_secs {
            self.dispatch.delay_secs = delay;
            self.dispatch.delay()?;
        }
        if overrides.concurrent {
            self.dispatch.concurrent = true;
        }
        if let Some(transport) = overrides.transport {
            self.dispatch.transport = transport;
        }
        Ok(self)
    }

    /// Sender pool in configured slot order.
    pub fn sender_identities(&self) -> Vec<SenderIdentity> {
        self.senders
            .accounts
            .iter()
            .map(|account| identity(account, self.dispatch.transport))
            .collect()
    }

    pub fn campaign_options(&self) -> Result<CampaignOptions> {
        let mode = if self.dispatch.concurrent {
            DispatchMode::Concurrent
        } else {
            DispatchMode::Sequential
        };
        Ok(CampaignOptions::default()
            .with_delay(self.dispatch.delay()?)
            .with_min_delay(self.dispatch.min_delay()?)
            .with_mode(mode))
    }

    pub fn connector(&self) -> Result<Arc<dyn TransportConnector>> {
        let connector: Arc<dyn TransportConnector> = match self.dispatch.transport {
            TransportKind::Smtp => Arc::new(SmtpConnector::new()),
            TransportKind::Log => Arc::new(LogConnector::new()),
            TransportKind::Brevo => {
                let api_key = self
                    .dispatch
                    .brevo_api_key
                    .clone()
                    .ok_or_else(|| eyre!("BREVO_API_KEY is required for the brevo transport"))?;
                let config = BrevoConfig::new(api_key).with_api_url(&self.dispatch.brevo_api_url);
                Arc::new(BrevoConnector::new(config))
            }
        };
        Ok(connector)
    }
}

fn identity(account: &SenderAccountConfig, transport: TransportKind) -> SenderIdentity {
    // Brevo authenticates with the account-wide API key, not the SMTP password.
    let secret = match transport {
        TransportKind::Brevo => String::new(),
        TransportKind::Smtp | TransportKind::Log => account.password.clone(),
    };

    let mut identity = SenderIdentity::new(&account.email, &account.smtp_host, secret)
        .with_port(account.smtp_port)
        .with_username(&account.username)
        .with_tls(match account.tls {
            TlsSetting::StartTls => TlsMode::StartTls,
            TlsSetting::Tls => TlsMode::Implicit,
            TlsSetting::None => TlsMode::None,
        });
    if let Some(name) = &account.name {
        identity = identity.with_name(name);
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(accounts: Vec<SenderAccountConfig>) -> Config {
        Config {
            environment: Environment::Development,
            senders: SenderPoolConfig::new(accounts).unwrap(),
            dispatch: DispatchConfig::default(),
        }
    }

    #[test]
    fn test_identities_follow_account_order() {
        let mut second = SenderAccountConfig::new("b@example.com", "pw-b");
        second.tls = TlsSetting::Tls;
        second.smtp_port = 465;
        second.name = Some("Bea".to_string());
        let config = config(vec![SenderAccountConfig::new("a@example.com", "pw-a"), second]);

        let identities = config.sender_identities();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].email, "a@example.com");
        assert_eq!(identities[0].host, "smtp.gmail.com");
        assert_eq!(identities[0].port, 587);
        assert_eq!(identities[0].tls, TlsMode::StartTls);
        assert_eq!(identities[0].secret, "pw-a");
        assert_eq!(identities[1].tls, TlsMode::Implicit);
        assert_eq!(identities[1].port, 465);
        assert_eq!(identities[1].name.as_deref(), Some("Bea"));
    }

    #[test]
    fn test_brevo_identities_carry_no_smtp_password() {
        let mut config = config(vec![SenderAccountConfig::new("a@example.com", "pw-a")]);
        config.dispatch.transport = TransportKind::Brevo;
        assert_eq!(config.sender_identities()[0].secret, "");
    }

    #[test]
    fn test_brevo_requires_api_key() {
        let mut config = config(vec![]);
        config.dispatch.transport = TransportKind::Brevo;
        assert!(config.connector().is_err());

        config.dispatch.brevo_api_key = Some("xkeysib-test".to_string());
        assert_eq!(config.connector().unwrap().name(), "brevo");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = config(vec![])
            .apply(&Overrides {
                delay_secs: Some(0.5),
                concurrent: true,
                transport: Some(TransportKind::Log),
            })
            .unwrap();

        let options = config.campaign_options().unwrap();
        assert_eq!(options.delay, Duration::from_millis(500));
        assert_eq!(options.mode, DispatchMode::Concurrent);
        assert_eq!(config.connector().unwrap().name(), "log");
    }

    #[test]
    fn test_negative_delay_override_is_rejected() {
        let result = config(vec![]).apply(&Overrides {
            delay_secs: Some(-1.0),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_env_reads_pool_and_dispatch() {
        temp_env::with_vars(
            [
                ("OUTREACH_SENDER_1_EMAIL", Some("alice@example.com")),
                ("OUTREACH_SENDER_1_PASSWORD", Some("secret")),
                ("OUTREACH_SENDER_2_EMAIL", None),
                ("OUTREACH_SENDER_3_EMAIL", None),
                ("OUTREACH_SENDER_4_EMAIL", None),
                ("OUTREACH_DELAY_SECS", Some("1.5")),
                ("OUTREACH_TRANSPORT", Some("dry-run")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.senders.len(), 1);
                assert_eq!(config.dispatch.transport, TransportKind::Log);
                assert_eq!(
                    config.campaign_options().unwrap().delay,
                    Duration::from_millis(1500)
                );
            },
        );
    }

    #[test]
    fn test_preview_tolerates_incomplete_sender_slot() {
        temp_env::with_vars(
            [
                ("OUTREACH_SENDER_1_EMAIL", Some("alice@example.com")),
                ("OUTREACH_SENDER_1_PASSWORD", None),
                ("OUTREACH_SENDER_2_EMAIL", None),
                ("OUTREACH_SENDER_3_EMAIL", None),
                ("OUTREACH_SENDER_4_EMAIL", None),
                ("OUTREACH_DELAY_SECS", Some("not-a-number")),
            ],
            || {
                assert!(Config::from_env().is_err());

                let config = Config::for_preview();
                assert!(config.senders.is_empty());
                assert_eq!(config.dispatch.delay_secs, DispatchConfig::default().delay_secs);
            },
        );
    }
}
