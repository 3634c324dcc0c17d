//! Application layer containing business logic and shared state.

pub mod disbursement;
pub mod eligibility;
pub mod gate;
pub mod service;
pub mod state;
pub mod wallet;
pub mod webhook;
pub mod worker;

pub use disbursement::{
    DisbursementConfig, DisbursementService, EVENT_DISBURSEMENT_FAILED, EVENT_DISBURSEMENT_SUCCESS,
    InitiationOutcome, ReconcileOutcome,
};
pub use eligibility::{EligibilityEvaluator, EligibilityReport, Issue, Restriction};
pub use gate::{GateDecision, RetryGate, RetryGateConfig};
pub use service::{AppService, Collaborators, EngineConfig};
pub use state::AppState;
pub use wallet::{CreditRequest, WalletService};
pub use webhook::{WebhookDeliveryConfig, WebhookService, calculate_backoff};
pub use worker::{Job, Scheduler, SchedulerConfig};
