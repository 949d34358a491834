use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tether_gateway::OutgoingMessage;
use tether_gateway::router::run_blocking;
use tether_types::api::{Claims, SendMessageRequest};

use crate::error::ApiResult;
use crate::state::AppState;

/// REST twin of the `send-message` push command. Same validation, same
/// delivery to the receiver's live transport.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let outgoing = OutgoingMessage {
        sender_id: claims.sub,
        receiver_id: req.receiver_id,
        content: req.content,
        post_id: req.post_id,
        event_id: req.event_id,
    };
    let message = state.router.send(claims.sub, outgoing).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn history(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let messages = state.router.history(claims.sub, peer_id).await?;
    Ok(Json(messages))
}

/// Everyone the caller has exchanged messages with, most recent first.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let store = state.messages.clone();
    let db = state.db.clone();
    let user_id = claims.sub;
    let peers = run_blocking(move || {
        let ids = store.conversation_peers(user_id)?;
        db.user_summaries(&ids)
    })
    .await?;
    Ok(Json(peers))
}
