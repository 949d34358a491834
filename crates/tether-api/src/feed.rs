use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use tether_gateway::router::run_blocking;
use tether_types::api::{Claims, InviteRequest, InviteResponse};

use crate::error::ApiResult;
use crate::state::AppState;

const MAX_FEED_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Posts by the caller and their connections, newest first.
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let feed = state.feed.clone();
    let limit = query.limit.clamp(1, MAX_FEED_LIMIT);
    let items = run_blocking(move || feed.feed(claims.sub, limit)).await?;
    Ok(Json(items))
}

pub async fn invite(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<impl IntoResponse> {
    let feed = state.feed.clone();
    let invited = run_blocking(move || feed.invite(event_id, claims.sub, &req.user_ids)).await?;
    Ok(Json(InviteResponse { event_id, invited }))
}
