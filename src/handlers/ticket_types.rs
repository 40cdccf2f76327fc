use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::models::{InventoryView, NewTicketType, TicketTypeInventory};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn register_ticket_type(
    State(state): State<AppState>,
    Json(body): Json<NewTicketType>,
) -> Result<Response, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::ValidationError("name is required".to_string()));
    }
    if body.total_quantity < 0 {
        return Err(AppError::ValidationError(
            "totalQuantity must not be negative".to_string(),
        ));
    }
    if body.price.is_sign_negative() {
        return Err(AppError::ValidationError("price must not be negative".to_string()));
    }

    let inventory = TicketTypeInventory::new(
        body.event_id,
        body.name.trim(),
        body.price,
        body.event_date,
        body.total_quantity,
        state.clock.now(),
    );
    state.store.insert_ticket_type(&inventory).await?;
    info!(ticket_type_id = %inventory.id, event_id = %inventory.event_id, "Ticket type registered");

    Ok(created(InventoryView::from(inventory), "Ticket type registered"))
}

pub async fn get_ticket_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let inventory = state
        .store
        .ticket_type(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket type '{id}' was not found")))?;

    Ok(success(InventoryView::from(inventory), "Ticket type found"))
}
