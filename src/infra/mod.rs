//! Infrastructure layer implementations.

pub mod database;
pub mod gateway;
pub mod notify;
pub mod services;
pub mod signature;
pub mod webhook_sender;

pub use database::{PostgresClient, PostgresConfig};
pub use gateway::{
    GatewayRegistry, MonnifyConfig, MonnifyGateway, RaveConfig, RaveGateway, WalletGateway,
};
pub use notify::{LogNotifier, SlackNotifier};
pub use services::{HttpIdentityClient, HttpTransactionClient, ServiceClientConfig};
pub use webhook_sender::HttpWebhookSender;
