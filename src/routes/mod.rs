use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers, Config};
use crate::handlers::{health_check, orders, reservations, ticket_types, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/ticket-types", post(ticket_types::register_ticket_type))
        .route("/ticket-types/:id", get(ticket_types::get_ticket_type))
        .route(
            "/reservations",
            post(reservations::create_reservations).get(reservations::active_reservations),
        )
        .route("/reservations/cleanup", post(reservations::cleanup_reservations))
        .route("/reservations/sweep", post(reservations::sweep_reservations))
        .route("/reservations/:id/convert", post(reservations::convert_reservation))
        .route("/orders/:id/paid", post(orders::mark_paid))
        .route("/orders/:id/failed", post(orders::mark_failed))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/tickets/scan", post(tickets::scan_ticket))
        .route("/tickets/:id/qr", get(tickets::ticket_qr));

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state);

    with_security_headers(router, config.production)
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}
