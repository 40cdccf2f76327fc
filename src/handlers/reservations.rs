use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BuyerInfo, HolderInfo, ReservationRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationsBody {
    pub session_id: String,
    pub items: Vec<ReservationRequest>,
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupBody {
    pub session_id: String,
    pub reservation_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub ok: bool,
    pub cancelled: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    pub session_id: String,
    pub buyer_info: BuyerInfo,
    pub ticket_holders: Vec<HolderInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub expired: usize,
    pub units_released: i64,
}

pub async fn create_reservations(
    State(state): State<AppState>,
    Json(body): Json<CreateReservationsBody>,
) -> Result<Response, AppError> {
    if body.items.is_empty() {
        return Err(AppError::ValidationError("items must not be empty".to_string()));
    }

    let batch = state
        .reservations
        .create_reservations(&body.session_id, &body.items, body.ttl_minutes)
        .await?;

    let message = format!(
        "{} reserved, {} failed",
        batch.successful.len(),
        batch.failed.len()
    );
    Ok(created(batch, message))
}

pub async fn active_reservations(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, AppError> {
    let reservations = state
        .reservations
        .active_reservations(&query.session_id)
        .await?;
    Ok(success(reservations, "Active reservations"))
}

/// Accepts JSON under any content type, since `navigator.sendBeacon` posts
/// `text/plain`.
pub async fn cleanup_reservations(
    State(state): State<AppState>,
    body: String,
) -> Result<Response, AppError> {
    let body: CleanupBody = serde_json::from_str(&body)
        .map_err(|e| AppError::ValidationError(format!("invalid cleanup body: {e}")))?;

    let cancelled = state
        .reservations
        .cancel_reservations(&body.session_id, &body.reservation_ids)
        .await?;
    Ok(success(CleanupResult { ok: true, cancelled }, "Reservations released"))
}

pub async fn sweep_reservations(State(state): State<AppState>) -> Result<Response, AppError> {
    let report = state.reservations.expire_sweep().await?;
    Ok(success(
        SweepResult {
            expired: report.expired,
            units_released: report.units_released,
        },
        "Sweep complete",
    ))
}

pub async fn convert_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
    Json(body): Json<ConvertBody>,
) -> Result<Response, AppError> {
    let purchase = state
        .reservations
        .convert_to_order(
            &body.session_id,
            reservation_id,
            body.buyer_info,
            body.ticket_holders,
        )
        .await?;
    Ok(created(purchase, "Order created"))
}
