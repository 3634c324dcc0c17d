//! Payment gateway clients.
//!
//! Each gateway is a [`GatewayClient`] chosen at construction time and looked
//! up by [`Gateway`] through the [`GatewayRegistry`].

pub mod monnify;
pub mod rave;
pub mod wallet;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::domain::{AppError, ConfigError, Gateway, GatewayClient, GatewayError};

pub use monnify::{MonnifyConfig, MonnifyGateway};
pub use rave::{RaveConfig, RaveGateway};
pub use wallet::WalletGateway;

/// Default outbound timeout for gateway calls
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway clients keyed by the gateway they serve
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    clients: HashMap<Gateway, Arc<dyn GatewayClient>>,
}

impl GatewayRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous client for the same gateway
    #[must_use]
    pub fn with(mut self, client: Arc<dyn GatewayClient>) -> Self {
        self.clients.insert(client.gateway(), client);
        self
    }

    pub fn get(&self, gateway: Gateway) -> Result<Arc<dyn GatewayClient>, AppError> {
        self.clients.get(&gateway).cloned().ok_or_else(|| {
            AppError::Gateway(GatewayError::NotConfigured(gateway.as_str().to_string()))
        })
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<dyn GatewayClient>> {
        self.clients.values()
    }

    #[must_use]
    pub fn contains(&self, gateway: Gateway) -> bool {
        self.clients.contains_key(&gateway)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder().timeout(timeout).build().map_err(|e| {
        AppError::Config(ConfigError::InvalidValue {
            name: "http_client".to_string(),
            message: e.to_string(),
        })
    })
}
