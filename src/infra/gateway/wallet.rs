//! Local wallet settlement. No network call; transfers settle immediately.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::domain::{
    AppError, Destination, Gateway, GatewayClient, TransferInstruction, TransferReceipt,
    TransferState, TransferStatus,
};

#[derive(Debug, Clone, Default)]
pub struct WalletGateway;

impl WalletGateway {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayClient for WalletGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Wallet
    }

    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<TransferReceipt, AppError> {
        let Destination::Wallet { account_id } = &instruction.destination else {
            return Err(AppError::NotSupported(
                "wallet gateway only settles to wallets".to_string(),
            ));
        };
        debug!(reference = %instruction.reference, account_id = %account_id, "Wallet settlement");

        Ok(TransferReceipt {
            reference: instruction.reference.clone(),
            gateway_reference: None,
            fee: None,
            request: serde_json::to_value(instruction)?,
            response: json!({ "status": "SUCCESSFUL" }),
        })
    }

    async fn query_status(&self, _reference: &str) -> Result<TransferStatus, AppError> {
        Ok(TransferStatus::new(TransferState::Completed, "SUCCESSFUL"))
    }
}
