use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Order, Ticket};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrder {
    pub order: Order,
    pub tickets: Vec<Ticket>,
    pub documents: usize,
    pub delivered: bool,
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let fulfilment = state.orders.mark_paid(order_id).await?;
    Ok(success(
        PaidOrder {
            documents: fulfilment.documents.len(),
            order: fulfilment.order,
            tickets: fulfilment.tickets,
            delivered: fulfilment.delivered,
        },
        "Order paid and tickets issued",
    ))
}

pub async fn mark_failed(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.orders.mark_failed(order_id).await?;
    Ok(success(order, "Order marked as failed"))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.orders.cancel(order_id).await?;
    Ok(success(order, "Order cancelled"))
}
