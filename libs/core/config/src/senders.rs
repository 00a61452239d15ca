//! Sender account configuration.
//!
//! Up to [`MAX_SENDER_ACCOUNTS`] accounts are read from numbered environment variables:
//!
//! ```text
//! OUTREACH_SENDER_1_EMAIL=alice@example.com
//! OUTREACH_SENDER_1_PASSWORD=app-password
//! OUTREACH_SENDER_1_SMTP_HOST=smtp.gmail.com   # default
//! OUTREACH_SENDER_1_SMTP_PORT=587              # default
//! OUTREACH_SENDER_1_TLS=starttls               # starttls | tls | none
//! ```
//!
//! Slots without an email are skipped, so accounts 1 and 3 can be configured without 2.

use crate::{env_optional, env_parse, ConfigError, FromEnv};
use std::fmt;
use std::str::FromStr;

/// Maximum number of sender accounts a pool can be configured with.
pub const MAX_SENDER_ACCOUNTS: usize = 4;

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;

/// How the SMTP connection is secured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsSetting {
    /// Plain connection upgraded with STARTTLS (port 587).
    #[default]
    StartTls,
    /// Implicit TLS from the first byte (port 465).
    Tls,
    /// No encryption (local relays such as Mailpit).
    None,
}

impl FromStr for TlsSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(TlsSetting::StartTls),
            "tls" | "ssl" => Ok(TlsSetting::Tls),
            "none" | "plain" => Ok(TlsSetting::None),
            other => Err(format!("unknown TLS setting '{}'", other)),
        }
    }
}

/// One sender account with its SMTP credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderAccountConfig {
    pub email: String,
    pub name: Option<String>,
    pub username: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub tls: TlsSetting,
}

impl SenderAccountConfig {
    /// Account with the default Gmail-style SMTP settings.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            username: email.clone(),
            email,
            name: None,
            password: password.into(),
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            tls: TlsSetting::default(),
        }
    }

    fn from_slot(slot: usize) -> Result<Option<Self>, ConfigError> {
        let key = |suffix: &str| format!("OUTREACH_SENDER_{}_{}", slot, suffix);

        let Some(email) = env_optional(&key("EMAIL")) else {
            return Ok(None);
        };

        let password_key = key("PASSWORD");
        let password =
            env_optional(&password_key).ok_or(ConfigError::MissingEnvVar(password_key))?;

        let tls_key = key("TLS");
        let tls = env_parse(&tls_key, TlsSetting::default())?;

        Ok(Some(Self {
            username: env_optional(&key("USERNAME")).unwrap_or_else(|| email.clone()),
            name: env_optional(&key("NAME")),
            password,
            smtp_host: env_optional(&key("SMTP_HOST"))
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port: env_parse(&key("SMTP_PORT"), DEFAULT_SMTP_PORT)?,
            tls,
            email,
        }))
    }
}

// Keep the password out of logs.
impl fmt::Debug for SenderAccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderAccountConfig")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Ordered list of configured sender accounts.
#[derive(Clone, Debug, Default)]
pub struct SenderPoolConfig {
    pub accounts: Vec<SenderAccountConfig>,
}

impl SenderPoolConfig {
    pub fn new(accounts: Vec<SenderAccountConfig>) -> Result<Self, ConfigError> {
        if accounts.len() > MAX_SENDER_ACCOUNTS {
            return Err(ConfigError::Invalid {
                key: "sender accounts".to_string(),
                details: format!(
                    "{} accounts configured, at most {} are supported",
                    accounts.len(),
                    MAX_SENDER_ACCOUNTS
                ),
            });
        }
        Ok(Self { accounts })
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}

impl FromEnv for SenderPoolConfig {
    /// Reads slots 1..=4; order of the configured slots is the pool order.
    fn from_env() -> Result<Self, ConfigError> {
        let mut accounts = Vec::new();
        for slot in 1..=MAX_SENDER_ACCOUNTS {
            if let Some(account) = SenderAccountConfig::from_slot(slot)? {
                accounts.push(account);
            }
        }
        Self::new(accounts)
    }
}
