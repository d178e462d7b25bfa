//! Outbound message delivery.
//!
//! The engine only needs `send(user_id, text)` with a three-way outcome:
//! delivered, recipient blocked us (permanent, the scheduler auto-disables
//! reminders), or some other failure (logged, not retried).

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("recipient blocked delivery")]
    Blocked,
    #[error("delivery not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl DeliveryError {
    /// True for the blocked/deactivated/not-found class of failures.
    pub fn is_blocked(&self) -> bool {
        matches!(self, DeliveryError::Blocked)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierProvider {
    Webhook,
    Mock,
    None,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    #[serde(rename = "userId")]
    user_id: i64,
    text: &'a str,
}

#[derive(Clone)]
pub struct Notifier {
    provider: NotifierProvider,
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn from_env() -> Self {
        let provider = match std::env::var("NOTIFIER_PROVIDER").ok().as_deref() {
            Some("webhook") => NotifierProvider::Webhook,
            Some("mock") => NotifierProvider::Mock,
            _ => NotifierProvider::None,
        };

        Self {
            provider,
            webhook_url: std::env::var("NOTIFIER_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn mock() -> Self {
        Self {
            provider: NotifierProvider::Mock,
            webhook_url: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn provider(&self) -> &NotifierProvider {
        &self.provider
    }

    pub fn is_available(&self) -> bool {
        match self.provider {
            NotifierProvider::Webhook => self.webhook_url.is_some(),
            NotifierProvider::Mock => true,
            NotifierProvider::None => false,
        }
    }

    pub async fn send(&self, user_id: i64, text: &str) -> Result<(), DeliveryError> {
        match self.provider {
            NotifierProvider::Mock => {
                debug!(user_id, "Mock notifier delivered message");
                Ok(())
            }
            NotifierProvider::None => Err(DeliveryError::NotConfigured),
            NotifierProvider::Webhook => {
                let url = self
                    .webhook_url
                    .as_deref()
                    .ok_or(DeliveryError::NotConfigured)?;

                let response = self
                    .client
                    .post(url)
                    .json(&OutboundMessage { user_id, text })
                    .send()
                    .await?;

                let status = response.status();
                if status.is_success() {
                    return Ok(());
                }

                let body = response.text().await.unwrap_or_default();
                if is_blocked_failure(status, &body) {
                    return Err(DeliveryError::Blocked);
                }
                Err(DeliveryError::HttpStatus { status, body })
            }
        }
    }
}

/// Classifies a delivery failure as the permanent recipient-side kind.
pub fn is_blocked_failure(status: reqwest::StatusCode, body: &str) -> bool {
    let body_lower = body.to_lowercase();
    status == reqwest::StatusCode::FORBIDDEN
        || body_lower.contains("bot was blocked")
        || body_lower.contains("user is deactivated")
        || body_lower.contains("chat not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn forbidden_status_is_blocked() {
        assert!(is_blocked_failure(StatusCode::FORBIDDEN, ""));
    }

    #[test]
    fn blocked_markers_in_body_are_blocked() {
        for body in ["Bot was blocked by the user", "user is deactivated", "Chat not found"] {
            assert!(is_blocked_failure(StatusCode::BAD_REQUEST, body), "{body}");
        }
    }

    #[test]
    fn ordinary_failures_are_not_blocked() {
        assert!(!is_blocked_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        assert!(!is_blocked_failure(StatusCode::TOO_MANY_REQUESTS, "slow down"));
    }

    #[test]
    fn unconfigured_provider_is_unavailable() {
        let notifier = Notifier {
            provider: NotifierProvider::None,
            webhook_url: None,
            client: reqwest::Client::new(),
        };
        assert!(!notifier.is_available());
    }

    #[tokio::test]
    async fn mock_provider_always_delivers() {
        let notifier = Notifier::mock();
        assert!(notifier.send(42, "hello").await.is_ok());
    }
}
