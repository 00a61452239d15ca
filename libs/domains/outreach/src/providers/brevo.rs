//! Brevo transactional e-mail API transport.

use super::{EmailContent, SentEmail, TransportConnector, TransportSession};
use crate::error::{OutreachError, OutreachResult};
use crate::models::SenderIdentity;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Brevo API configuration.
#[derive(Clone)]
pub struct BrevoConfig {
    /// Account-wide API key, used when an identity carries no secret of its own.
    pub api_key: Option<String>,
    /// Brevo API base URL (defaults to production).
    pub api_url: String,
}

impl BrevoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_url: "https://api.brevo.com/v3".to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn key_for<'a>(&'a self, identity: &'a SenderIdentity) -> Option<&'a str> {
        if !identity.secret.is_empty() {
            Some(identity.secret.as_str())
        } else {
            self.api_key.as_deref().filter(|k| !k.is_empty())
        }
    }
}

impl std::fmt::Debug for BrevoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Opens Brevo API sessions; the key is verified against `/account` on connect.
#[derive(Debug, Clone)]
pub struct BrevoConnector {
    config: BrevoConfig,
    client: Client,
}

impl BrevoConnector {
    pub fn new(config: BrevoConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

// Brevo API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    text_content: String,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailResponse {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrevoError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<BrevoError>(body) {
        Ok(err) => match err.code {
            Some(code) => format!("Brevo error ({}, {}): {}", status, code, err.message),
            None => format!("Brevo error ({}): {}", status, err.message),
        },
        Err(_) => format!("Brevo error ({}): {}", status, body),
    }
}

#[async_trait]
impl TransportConnector for BrevoConnector {
    async fn connect(&self, identity: &SenderIdentity) -> OutreachResult<Box<dyn TransportSession>> {
        let api_key = self
            .config
            .key_for(identity)
            .ok_or_else(|| OutreachError::setup(&identity.email, "no Brevo API key configured"))?
            .to_string();

        debug!(sender = %identity.email, api_url = %self.config.api_url, "Verifying Brevo API key");

        let response = self
            .client
            .get(format!("{}/account", self.config.api_url))
            .header("api-key", &api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| OutreachError::setup(&identity.email, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutreachError::setup(&identity.email, describe_error(status, &body)));
        }

        info!(sender = %identity.email, "Brevo session ready");

        Ok(Box::new(BrevoSession {
            client: self.client.clone(),
            api_url: self.config.api_url.clone(),
            api_key,
            sender: EmailAddress {
                email: identity.email.clone(),
                name: identity.name.clone(),
            },
        }))
    }

    fn name(&self) -> &'static str {
        "brevo"
    }
}

struct BrevoSession {
    client: Client,
    api_url: String,
    api_key: String,
    sender: EmailAddress,
}

impl BrevoSession {
    fn request(&self, email: &EmailContent) -> SendEmailRequest {
        SendEmailRequest {
            sender: EmailAddress {
                email: self.sender.email.clone(),
                name: self.sender.name.clone(),
            },
            to: vec![EmailAddress {
                email: email.to_email.clone(),
                name: None,
            }],
            subject: email.subject.clone(),
            text_content: email.text_body.clone(),
        }
    }
}

#[async_trait]
impl TransportSession for BrevoSession {
    async fn send(&mut self, email: &EmailContent) -> OutreachResult<SentEmail> {
        let response = self
            .client
            .post(format!("{}/smtp/email", self.api_url))
            .header("api-key", &self.api_key)
            .json(&self.request(email))
            .send()
            .await
            .map_err(|e| OutreachError::send(&email.to_email, e))?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .json::<SendEmailResponse>()
                .await
                .ok()
                .and_then(|r| r.message_id);
            Ok(SentEmail { message_id })
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(to = %email.to_email, status = %status, "Brevo rejected message");
            Err(OutreachError::send(&email.to_email, describe_error(status, &body)))
        }
    }

    async fn close(&mut self) {
        debug!(sender = %self.sender.email, "Brevo session closed");
    }
}
