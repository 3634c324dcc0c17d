//! The API layer, containing web handlers and routing.

pub mod admin;
pub mod handlers;
pub mod router;

pub use admin::{
    AdminActionResponse, ListFailedDisbursementsResponse, clear_failed_disbursement_handler,
    list_failed_disbursements_handler,
};
pub use handlers::{ApiDoc, GATEWAY_SIGNATURE_HEADER, MONNIFY_SIGNATURE_HEADER};
pub use router::{
    RateLimitConfig, RouterConfig, create_router, create_router_with_config,
    create_router_with_rate_limit,
};
