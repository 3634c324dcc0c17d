//! Operator alert channels.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::{Alert, AlertLevel, AppError, ExternalServiceError, Notifier};

/// Posts alerts to a Slack incoming webhook
pub struct SlackNotifier {
    http_client: Client,
    webhook_url: SecretString,
}

impl SlackNotifier {
    pub fn new(webhook_url: SecretString, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ExternalService(ExternalServiceError::Configuration(e.to_string())))?;
        Ok(Self {
            http_client,
            webhook_url,
        })
    }

    fn format(alert: &Alert) -> String {
        let marker = match alert.level {
            AlertLevel::Info => ":information_source:",
            AlertLevel::Warning => ":warning:",
            AlertLevel::Critical => ":rotating_light:",
        };
        format!("{} *{}*\n{}", marker, alert.title, alert.message)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, alert: Alert) {
        let body = json!({ "text": Self::format(&alert) });
        let result = self
            .http_client
            .post(self.webhook_url.expose_secret())
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), title = %alert.title, "Slack rejected alert");
            }
            Err(e) => error!(error = %e, title = %alert.title, "Failed to deliver alert"),
        }
    }
}

/// Writes alerts to the log when no alert channel is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => info!(title = %alert.title, message = %alert.message, "Alert"),
            AlertLevel::Warning => warn!(title = %alert.title, message = %alert.message, "Alert"),
            AlertLevel::Critical => {
                error!(title = %alert.title, message = %alert.message, "Alert")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_format_marks_level() {
        let text = SlackNotifier::format(&Alert::critical("Retries exhausted", "DSB-1"));
        assert!(text.starts_with(":rotating_light:"));
        assert!(text.contains("*Retries exhausted*"));
        assert!(text.ends_with("DSB-1"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.notify(Alert::info("Wallet funded", "acct-1")).await;
    }
}
