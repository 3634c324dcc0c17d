//! Admin API handlers for eligibility blocks.
//!
//! A payment that fails eligibility gets a FailedDisbursement row that stops
//! every later initiation attempt. Operators list the blocks here and delete
//! one once the recipient's profile has been fixed.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::domain::{AppError, DatabaseError, FailedDisbursement};

/// Response for listing eligibility blocks
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListFailedDisbursementsResponse {
    pub count: usize,
    pub entries: Vec<FailedDisbursement>,
}

/// Response for admin mutations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminActionResponse {
    pub success: bool,
    pub message: String,
}

/// List payments blocked by eligibility
///
/// GET /admin/failed-disbursements
#[utoipa::path(
    get,
    path = "/admin/failed-disbursements",
    tag = "admin",
    responses(
        (status = 200, description = "All eligibility blocks", body = ListFailedDisbursementsResponse),
    )
)]
pub async fn list_failed_disbursements_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListFailedDisbursementsResponse>, AppError> {
    let entries = state
        .service
        .disbursements
        .list_failed_disbursements()
        .await?;
    Ok(Json(ListFailedDisbursementsResponse {
        count: entries.len(),
        entries,
    }))
}

/// Lift the eligibility block on a payment
///
/// DELETE /admin/failed-disbursements/{payment_id}
#[utoipa::path(
    delete,
    path = "/admin/failed-disbursements/{payment_id}",
    tag = "admin",
    params(
        ("payment_id" = String, Path, description = "Payment whose block should be lifted")
    ),
    responses(
        (status = 200, description = "Block lifted", body = AdminActionResponse),
        (status = 404, description = "No block on file", body = crate::domain::ErrorResponse),
    )
)]
pub async fn clear_failed_disbursement_handler(
    State(state): State<Arc<AppState>>,
    Path(payment_id): Path<String>,
) -> Result<Json<AdminActionResponse>, AppError> {
    if !state
        .service
        .disbursements
        .clear_failed_disbursement(&payment_id)
        .await?
    {
        return Err(AppError::Database(DatabaseError::NotFound(format!(
            "No eligibility block for payment {}",
            payment_id
        ))));
    }

    warn!(payment_id = %payment_id, "Admin lifted eligibility block");
    Ok(Json(AdminActionResponse {
        success: true,
        message: format!("Eligibility block for payment {} lifted", payment_id),
    }))
}
