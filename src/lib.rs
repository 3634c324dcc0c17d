//! Escrow disbursement and settlement engine.
//!
//! Moves funds out of escrow to recipients through external payment
//! gateways, reconciles transfer outcomes on a schedule, keeps a wallet
//! ledger with escrow sub-accounting, and delivers merchant webhooks.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
