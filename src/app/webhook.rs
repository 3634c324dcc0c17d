//! At-least-once merchant webhook delivery.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use std::env;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, BusinessProfile, DatabaseClient, NewWebhook, ValidationError, Webhook,
    WebhookAttempt, WebhookSender,
};

/// Attempts after which an undelivered webhook is abandoned
pub const DEFAULT_WEBHOOK_MAX_TRIES: i32 = 10;

/// Maximum backoff duration in seconds (1 hour)
const MAX_BACKOFF_SECS: i64 = 3600;

/// Stored response bodies are cut to this many characters
const MAX_STORED_BODY_CHARS: usize = 2048;

#[derive(Debug, Clone)]
pub struct WebhookDeliveryConfig {
    pub max_tries: i32,
    pub batch_size: i64,
}

impl Default for WebhookDeliveryConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_WEBHOOK_MAX_TRIES,
            batch_size: 50,
        }
    }
}

impl WebhookDeliveryConfig {
    /// Reads `WEBHOOK_MAX_TRIES` and `WEBHOOK_BATCH_SIZE`
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_tries: env::var("WEBHOOK_MAX_TRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tries),
            batch_size: env::var("WEBHOOK_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
        }
    }
}

pub struct WebhookService {
    db_client: Arc<dyn DatabaseClient>,
    sender: Arc<dyn WebhookSender>,
    config: WebhookDeliveryConfig,
}

impl WebhookService {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        sender: Arc<dyn WebhookSender>,
        config: WebhookDeliveryConfig,
    ) -> Self {
        Self {
            db_client,
            sender,
            config,
        }
    }

    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        uri: &str,
        event: &str,
        payload: JsonValue,
        business_id: &str,
    ) -> Result<Webhook, AppError> {
        let data = NewWebhook {
            uri: uri.to_string(),
            event: event.to_string(),
            payload,
            business_id: business_id.to_string(),
        };
        data.validate().map_err(|e| {
            warn!(error = %e, "Webhook validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        self.db_client.insert_webhook(&data).await
    }

    /// Enqueue one row per endpoint the business registered for `event`.
    /// Returns the number of rows created.
    pub async fn notify_business(
        &self,
        business: &BusinessProfile,
        event: &str,
        payload: &JsonValue,
    ) -> usize {
        let mut queued = 0;
        for endpoint in business.endpoints_for(event) {
            match self
                .enqueue(&endpoint.uri, event, payload.clone(), &business.business_id)
                .await
            {
                Ok(_) => queued += 1,
                Err(e) => {
                    error!(uri = %endpoint.uri, event = %event, error = ?e, "Failed to enqueue webhook");
                }
            }
        }
        queued
    }

    /// One delivery pass over rows due now
    pub async fn process_due(&self) -> Result<usize, AppError> {
        self.process_due_at(Utc::now()).await
    }

    /// One delivery pass treating `now` as the current time
    #[instrument(skip(self))]
    pub async fn process_due_at(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self
            .db_client
            .list_due_webhooks(now, self.config.batch_size)
            .await?;
        let count = due.len();
        if count == 0 {
            return Ok(0);
        }

        info!(count = count, "Delivering webhooks");
        for webhook in due {
            if let Err(e) = self.deliver(&webhook, now).await {
                error!(id = %webhook.id, error = ?e, "Failed to record webhook attempt");
            }
        }
        Ok(count)
    }

    async fn deliver(&self, webhook: &Webhook, now: DateTime<Utc>) -> Result<(), AppError> {
        let tries = webhook.tries + 1;
        let (response_status, response_body, is_received) =
            match self.sender.send(&webhook.uri, &webhook.payload).await {
                Ok(response) => (
                    Some(i32::from(response.status)),
                    Some(truncate(&response.body)),
                    response.is_success(),
                ),
                Err(e) => {
                    warn!(id = %webhook.id, error = %e, "Webhook transport failed");
                    (None, Some(truncate(&e.to_string())), false)
                }
            };

        let is_abandoned = !is_received && tries > self.config.max_tries;
        let retry_at = if is_received || is_abandoned {
            now
        } else {
            now + Duration::seconds(calculate_backoff(tries))
        };

        if is_abandoned {
            warn!(id = %webhook.id, uri = %webhook.uri, tries = tries, "Webhook abandoned");
        } else if is_received {
            info!(id = %webhook.id, tries = tries, "Webhook delivered");
        }

        self.db_client
            .record_webhook_attempt(
                &webhook.id,
                &WebhookAttempt {
                    tries,
                    is_received,
                    is_abandoned,
                    retry_at,
                    response_status,
                    response_body,
                },
            )
            .await
    }
}

/// Seconds to wait after attempt number `tries`: 30s doubling per attempt, capped
pub fn calculate_backoff(tries: i32) -> i64 {
    let backoff = 30_i64 * 2_i64.pow((tries - 1).clamp(0, 16) as u32);
    backoff.min(MAX_BACKOFF_SECS)
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_STORED_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDatabaseClient, MockWebhookSender, bank_business};
    use serde_json::json;

    fn service(sender: Arc<MockWebhookSender>) -> (Arc<MockDatabaseClient>, WebhookService) {
        let db = Arc::new(MockDatabaseClient::new());
        let svc = WebhookService::new(db.clone(), sender, WebhookDeliveryConfig::default());
        (db, svc)
    }

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(1), 30);
        assert_eq!(calculate_backoff(2), 60);
        assert_eq!(calculate_backoff(4), 240);
        assert_eq!(calculate_backoff(7), 1920);
        assert_eq!(calculate_backoff(8), 3600); // Capped
        assert_eq!(calculate_backoff(40), 3600);
        assert_eq!(calculate_backoff(0), 30);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_uri() {
        let (_db, svc) = service(Arc::new(MockWebhookSender::responding(200)));
        let err = svc
            .enqueue("not-a-url", "disbursement.success", json!({}), "biz-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_notify_business_matches_event_endpoints() {
        let (db, svc) = service(Arc::new(MockWebhookSender::responding(200)));
        let queued = svc
            .notify_business(&bank_business("biz-1"), "disbursement.success", &json!({"id": 1}))
            .await;
        assert_eq!(queued, 1);
        let rows = db.webhooks();
        assert_eq!(rows[0].uri, "https://merchant.example.com/hooks/success");
        assert_eq!(rows[0].tries, 0);
        assert!(!rows[0].is_received);
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_received() {
        let sender = Arc::new(MockWebhookSender::responding(204));
        let (db, svc) = service(sender.clone());
        let hook = svc
            .enqueue("https://m.example.com/h", "disbursement.success", json!({}), "biz-1")
            .await
            .unwrap();

        assert_eq!(svc.process_due().await.unwrap(), 1);
        let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
        assert!(stored.is_received);
        assert!(!stored.is_abandoned);
        assert_eq!(stored.tries, 1);
        assert_eq!(stored.last_response_status, Some(204));
        assert!(stored.retry_at.is_some());

        assert_eq!(svc.process_due().await.unwrap(), 0);
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_at_is_honoured() {
        let sender = Arc::new(MockWebhookSender::responding(500));
        let (db, svc) = service(sender.clone());
        let hook = svc
            .enqueue("https://m.example.com/h", "disbursement.failed", json!({}), "biz-1")
            .await
            .unwrap();

        let now = Utc::now();
        svc.process_due_at(now).await.unwrap();
        let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_at, Some(now + Duration::seconds(30)));

        // Not due yet
        assert_eq!(svc.process_due_at(now + Duration::seconds(29)).await.unwrap(), 0);
        let second = now + Duration::seconds(30);
        assert_eq!(svc.process_due_at(second).await.unwrap(), 1);
        assert_eq!(sender.sent().len(), 2);
        let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_at, Some(second + Duration::seconds(60)));
    }

    #[tokio::test]
    async fn test_abandoned_after_eleven_failures() {
        let sender = Arc::new(MockWebhookSender::responding(500));
        let (db, svc) = service(sender.clone());
        let hook = svc
            .enqueue("https://m.example.com/h", "disbursement.failed", json!({}), "biz-1")
            .await
            .unwrap();

        let mut now = Utc::now();
        for attempt in 1..=12 {
            svc.process_due_at(now).await.unwrap();
            let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
            assert!(!stored.is_received);
            assert_eq!(stored.is_abandoned, attempt >= 11, "attempt {}", attempt);
            now += Duration::days(1);
        }

        assert_eq!(sender.sent().len(), 11);
        let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.tries, 11);
        // Stamped with the abandoning attempt
        assert_eq!(stored.retry_at, Some(now - Duration::days(2)));
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_and_swallowed() {
        let sender = Arc::new(MockWebhookSender::responding(200));
        sender.push_network_error("connection refused");
        let (db, svc) = service(sender);
        let hook = svc
            .enqueue("https://m.example.com/h", "disbursement.success", json!({}), "biz-1")
            .await
            .unwrap();

        assert_eq!(svc.process_due().await.unwrap(), 1);
        let stored = db.get_webhook(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.tries, 1);
        assert!(stored.last_response_status.is_none());
        assert!(
            stored
                .last_response_body
                .unwrap()
                .contains("connection refused")
        );
        assert!(stored.retry_at.is_some());
    }
}
