use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use tether_gateway::router::run_blocking;
use tether_types::api::{Claims, MarkAllReadResponse};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let notifications =
        run_blocking(move || db.list_notifications(claims.sub, query.unread)).await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    run_blocking(move || db.mark_notification_read(notification_id, claims.sub)).await?;
    Ok(Json(serde_json::json!({ "read": notification_id })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let updated = run_blocking(move || db.mark_all_notifications_read(claims.sub)).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
