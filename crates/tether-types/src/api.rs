use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PostPreview;

// -- JWT Claims --

/// Claims minted by the identity provider. Shared by tether-api (REST
/// middleware) and the gateway upgrade path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub exp: usize,
}

// -- Connections --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendConnectionRequest {
    pub receiver_id: Uuid,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    #[serde(default)]
    pub content: String,
    pub post_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
}

// -- Events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteResponse {
    pub event_id: Uuid,
    pub invited: Vec<Uuid>,
}

// -- Feed --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub post: PostPreview,
    pub created_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// Machine-readable failure as carried inside push events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&crate::Error> for ErrorBody {
    fn from(err: &crate::Error) -> Self {
        Self {
            code: err.kind().to_string(),
            message: err.public_message(),
        }
    }
}
