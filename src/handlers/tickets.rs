use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::qr::{self, ErrorCorrection, QrRenderOptions};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub credential: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrQuery {
    #[serde(default)]
    pub print: bool,
    pub size: Option<u32>,
    pub margin: Option<u32>,
    pub error_correction: Option<ErrorCorrection>,
}

impl QrQuery {
    fn options(&self) -> QrRenderOptions {
        let base = if self.print {
            QrRenderOptions::print()
        } else {
            QrRenderOptions::screen()
        };
        QrRenderOptions {
            size_px: self.size.unwrap_or(base.size_px).clamp(64, 2048),
            margin_modules: self.margin.unwrap_or(base.margin_modules).min(16),
            error_correction: self.error_correction.unwrap_or(base.error_correction),
        }
    }
}

/// Always answers 200; `valid` and `reason` carry the verdict.
pub async fn scan_ticket(
    State(state): State<AppState>,
    Json(body): Json<ScanBody>,
) -> Result<Response, AppError> {
    let outcome = state.check_in.scan(&body.credential).await?;
    let message = if outcome.valid {
        "Ticket accepted"
    } else {
        "Ticket rejected"
    };
    Ok(success(outcome, message))
}

pub async fn ticket_qr(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Query(query): Query<QrQuery>,
) -> Result<Response, AppError> {
    let credential = state
        .store
        .ticket(ticket_id)
        .await?
        .and_then(|ticket| ticket.credential)
        .ok_or_else(|| AppError::NotFound(format!("No credential issued for ticket '{ticket_id}'")))?;

    let image = qr::render(&credential, &query.options())?;
    let png = qr::encode_png(&image)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_query_defaults_to_screen_size() {
        assert_eq!(QrQuery::default().options(), QrRenderOptions::screen());
    }

    #[test]
    fn test_qr_query_clamps_size() {
        let query = QrQuery {
            print: true,
            size: Some(10_000),
            margin: None,
            error_correction: None,
        };
        let options = query.options();

        assert_eq!(options.size_px, 2048);
        assert_eq!(options.error_correction, ErrorCorrection::High);
    }
}
