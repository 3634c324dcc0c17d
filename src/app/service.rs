//! Application service wiring the engine components together.

use std::sync::Arc;
use tracing::{instrument, warn};

use crate::domain::{
    DatabaseClient, HealthResponse, HealthStatus, IdentityClient, Notifier, TransactionClient,
    WebhookSender,
};
use crate::infra::GatewayRegistry;

use super::disbursement::{DisbursementConfig, DisbursementService};
use super::gate::{RetryGate, RetryGateConfig};
use super::wallet::WalletService;
use super::webhook::{WebhookDeliveryConfig, WebhookService};

/// Tunables for every engine component
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub gate: RetryGateConfig,
    pub disbursement: DisbursementConfig,
    pub webhook: WebhookDeliveryConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            gate: RetryGateConfig::from_env(),
            disbursement: DisbursementConfig::from_env(),
            webhook: WebhookDeliveryConfig::from_env(),
        }
    }
}

/// External collaborators the engine is built from
pub struct Collaborators {
    pub db_client: Arc<dyn DatabaseClient>,
    pub gateways: GatewayRegistry,
    pub identity_client: Arc<dyn IdentityClient>,
    pub transaction_client: Arc<dyn TransactionClient>,
    pub notifier: Arc<dyn Notifier>,
    pub webhook_sender: Arc<dyn WebhookSender>,
}

/// Application service containing the engine components
pub struct AppService {
    db_client: Arc<dyn DatabaseClient>,
    gateways: GatewayRegistry,
    pub disbursements: Arc<DisbursementService>,
    pub wallet: Arc<WalletService>,
    pub webhooks: Arc<WebhookService>,
}

impl AppService {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let Collaborators {
            db_client,
            gateways,
            identity_client,
            transaction_client,
            notifier,
            webhook_sender,
        } = collaborators;

        let wallet = Arc::new(WalletService::new(
            Arc::clone(&db_client),
            Arc::clone(&transaction_client),
            Arc::clone(&notifier),
        ));
        let webhooks = Arc::new(WebhookService::new(
            Arc::clone(&db_client),
            webhook_sender,
            config.webhook,
        ));
        let disbursements = Arc::new(DisbursementService::new(
            Arc::clone(&db_client),
            gateways.clone(),
            identity_client,
            transaction_client,
            notifier,
            Arc::clone(&wallet),
            Arc::clone(&webhooks),
            RetryGate::new(Arc::clone(&db_client), config.gate),
            config.disbursement,
        ));

        Self {
            db_client,
            gateways,
            disbursements,
            wallet,
            webhooks,
        }
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };

        let mut gateway_health = HealthStatus::Healthy;
        for client in self.gateways.clients() {
            if let Err(e) = client.health_check().await {
                warn!(gateway = %client.gateway(), error = %e, "Gateway health check failed");
                gateway_health = HealthStatus::Degraded;
            }
        }

        HealthResponse::new(db_health, gateway_health)
    }

    /// Readiness requires the database only
    pub async fn is_ready(&self) -> bool {
        self.db_client.health_check().await.is_ok()
    }
}
