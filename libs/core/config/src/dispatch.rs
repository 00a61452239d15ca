//! Dispatch settings: pacing, scheduling mode and transport selection.

use crate::{env_flag, env_optional, env_or_default, env_parse, ConfigError, FromEnv};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BREVO_API_URL: &str = "https://api.brevo.com/v3";

/// Which outbound transport sender sessions use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Smtp,
    Brevo,
    /// Log messages instead of sending them.
    Log,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smtp" => Ok(TransportKind::Smtp),
            "brevo" => Ok(TransportKind::Brevo),
            "log" | "dry-run" => Ok(TransportKind::Log),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Smtp => write!(f, "smtp"),
            TransportKind::Brevo => write!(f, "brevo"),
            TransportKind::Log => write!(f, "log"),
        }
    }
}

/// Settings that shape a campaign run.
#[derive(Clone, PartialEq)]
pub struct DispatchConfig {
    /// Pause after each send attempt, per sender.
    pub delay_secs: f64,
    /// Smallest delay the operator may request.
    pub min_delay_secs: f64,
    /// Run sender batches concurrently instead of one after another.
    pub concurrent: bool,
    pub transport: TransportKind,
    pub brevo_api_key: Option<String>,
    pub brevo_api_url: String,
}

impl DispatchConfig {
    /// Validated pacing delay.
    pub fn delay(&self) -> Result<Duration, ConfigError> {
        seconds("OUTREACH_DELAY_SECS", self.delay_secs)
    }

    /// Validated minimum pacing delay.
    pub fn min_delay(&self) -> Result<Duration, ConfigError> {
        seconds("OUTREACH_MIN_DELAY_SECS", self.min_delay_secs)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        details: format!("{} is not a valid delay: {}", value, e),
    })
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay_secs: 2.0,
            min_delay_secs: 0.0,
            concurrent: false,
            transport: TransportKind::default(),
            brevo_api_key: None,
            brevo_api_url: DEFAULT_BREVO_API_URL.to_string(),
        }
    }
}

impl FromEnv for DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            delay_secs: env_parse("OUTREACH_DELAY_SECS", defaults.delay_secs)?,
            min_delay_secs: env_parse("OUTREACH_MIN_DELAY_SECS", defaults.min_delay_secs)?,
            concurrent: env_flag("OUTREACH_CONCURRENT", defaults.concurrent),
            transport: env_parse("OUTREACH_TRANSPORT", defaults.transport)?,
            brevo_api_key: env_optional("BREVO_API_KEY"),
            brevo_api_url: env_or_default("BREVO_API_URL", DEFAULT_BREVO_API_URL),
        };

        config.delay()?;
        config.min_delay()?;
        Ok(config)
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("delay_secs", &self.delay_secs)
            .field("min_delay_secs", &self.min_delay_secs)
            .field("concurrent", &self.concurrent)
            .field("transport", &self.transport)
            .field("brevo_api_key", &self.brevo_api_key.as_ref().map(|_| "<redacted>"))
            .field("brevo_api_url", &self.brevo_api_url)
            .finish()
    }
}
