//! Outgoing email via the SendGrid HTTP API.
//!
//! Delivery is modelled as an explicit [`DeliveryOutcome`] instead of a
//! Result, because callers genuinely branch three ways: most email is
//! fire-and-forget (a failure is logged, the request still succeeds), while
//! portal access issuance treats anything short of delivery as fatal.
//! Without an API key the mailer degrades to writing messages into the
//! server log, which counts as delivered for development.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// What happened to one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the provider.
    Sent,
    /// No provider configured; the message went to the server log.
    Logged,
    /// The provider rejected the message or was unreachable.
    Failed(String),
}

impl DeliveryOutcome {
    /// True when the message reached its configured destination, which in
    /// log-fallback mode is the log itself.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent | DeliveryOutcome::Logged)
    }
}

pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    endpoint: String,
}

impl Mailer {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        if api_key.is_none() {
            info!("SENDGRID_API_KEY not set; email will be written to the log");
        }

        Self {
            client,
            api_key,
            from,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Send one HTML message.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> DeliveryOutcome {
        let Some(api_key) = &self.api_key else {
            info!(to, subject, "email (log fallback)");
            debug!(body = html, "email body");
            return DeliveryOutcome::Logged;
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html }],
        });

        match self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(to, subject, "email accepted by provider");
                DeliveryOutcome::Sent
            }
            Ok(resp) => {
                let status = resp.status();
                warn!(to, %status, "email provider rejected message");
                DeliveryOutcome::Failed(format!("provider returned {status}"))
            }
            Err(e) => {
                warn!(to, error = %e, "email provider unreachable");
                DeliveryOutcome::Failed(format!("provider unreachable: {e}"))
            }
        }
    }
}
