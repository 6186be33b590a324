//! Route definitions for the Warehouse Stock Ledger

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stock availability and balance reads
        .nest("/stock", stock_routes())
        // Recalculation queue
        .nest("/recalc", recalc_routes())
}

/// Availability check and balance reporting
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/availability", post(handlers::check_availability))
        .route(
            "/balance/:company_id/:item_type/:item_code",
            get(handlers::get_balance),
        )
}

/// Recalculation enqueue and queue audit view
fn recalc_routes() -> Router<AppState> {
    Router::new()
        .route("/enqueue", post(handlers::enqueue_recalc))
        .route("/queue/:company_id", get(handlers::list_queue))
}
