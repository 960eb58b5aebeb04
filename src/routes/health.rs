use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::SubscriberStore;
use crate::db::DocFilter;
use crate::AppState;

/// Health check endpoint
///
/// Returns the health status of the server and its document store.
/// Used by load balancers and monitoring systems.
pub async fn health_check<S: SubscriberStore>(State(state): State<AppState<S>>) -> Json<Value> {
    // A count is the cheapest round trip every store supports
    let db_status = match state.repo.count(&DocFilter::all()).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": if db_status == "connected" { "healthy" } else { "unhealthy" },
        "database": db_status,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
