pub mod connections;
pub mod error;
pub mod feed;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod state;

use axum::{
    Json, Router,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// The REST surface. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/connections", get(connections::list_connections))
        .route("/connections/{connection_id}", delete(connections::remove_connection))
        .route(
            "/connections/requests",
            get(connections::list_pending).post(connections::send_request),
        )
        .route("/connections/requests/{request_id}/accept", post(connections::accept_request))
        .route("/connections/requests/{request_id}/reject", post(connections::reject_request))
        .route("/messages", post(messages::send_message))
        .route("/messages/conversations", get(messages::conversations))
        .route("/messages/{peer_id}", get(messages::history))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/feed", get(feed::get_feed))
        .route("/events/{event_id}/invites", post(feed::invite))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
