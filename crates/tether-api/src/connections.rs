use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};
use uuid::Uuid;

use tether_gateway::router::run_blocking;
use tether_types::api::{Claims, SendConnectionRequest};
use tether_types::events::ServerEvent;
use tether_types::models::NotificationKind;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    let sender_id = claims.sub;
    let request = run_blocking(move || graph.send_request(sender_id, req.receiver_id)).await?;

    // Side effects are best-effort; the request itself is already committed.
    let db = state.db.clone();
    let (receiver_id, request_id) = (request.receiver_id, request.id);
    if let Err(e) = run_blocking(move || {
        db.insert_notification(receiver_id, NotificationKind::ConnectionRequest, request_id)
    })
    .await
    {
        warn!("Failed to record request notification for {}: {}", receiver_id, e);
    }

    let delivered = state
        .presence
        .push_to(
            receiver_id,
            ServerEvent::ConnectionRequest {
                request: request.clone(),
            },
        )
        .await;
    if !delivered {
        debug!("{} offline, connection request {} not pushed", receiver_id, request_id);
    }

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    let pending = run_blocking(move || graph.list_pending(claims.sub)).await?;
    Ok(Json(pending))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    let accepting = claims.sub;
    let connection = run_blocking(move || graph.accept(request_id, accepting)).await?;

    if let Some(requester) = connection.peer_of(accepting) {
        let delivered = state
            .presence
            .push_to(
                requester,
                ServerEvent::ConnectionAccepted {
                    connection: connection.clone(),
                },
            )
            .await;
        if !delivered {
            debug!("{} offline, acceptance of {} not pushed", requester, request_id);
        }
    }

    Ok(Json(connection))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    run_blocking(move || graph.reject(request_id, claims.sub)).await?;
    Ok(Json(serde_json::json!({ "rejected": request_id })))
}

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    let peers = run_blocking(move || graph.list_connections(claims.sub)).await?;
    Ok(Json(peers))
}

/// Tear down a connection. Shared history is purged as part of the removal.
pub async fn remove_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let graph = state.graph.clone();
    let connection = run_blocking(move || graph.remove(connection_id, claims.sub)).await?;
    Ok(Json(connection))
}
