use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Upper bound on message content, counted in characters rather than bytes.
pub const MAX_CONTENT_CHARS: usize = 1000;

/// Returns the pair ordered by the total order on identifiers, lowest first.
/// Every pair-keyed row (connections, requests, messages) is stored under this key.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Reference data mirrored from the identity provider. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A confirmed relationship. `user_a_id < user_b_id` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    /// The other party, or `None` if `user_id` is not part of this connection.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a_id == user_id {
            Some(self.user_b_id)
        } else if self.user_b_id == user_id {
            Some(self.user_a_id)
        } else {
            None
        }
    }
}

/// A connected peer as seen from one side of the relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPeer {
    pub connection_id: Uuid,
    pub peer: UserSummary,
    pub connected_at: DateTime<Utc>,
}

/// A pending request together with the profile of the other party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ConnectionRequest,
    pub counterpart: UserSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingRequests {
    pub sent: Vec<RequestView>,
    pub received: Vec<RequestView>,
}

/// What a message points at besides its text. At most one per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Post { post_id: Uuid },
    Event { event_id: Uuid },
}

impl Attachment {
    /// Builds an attachment from the two optional wire fields.
    pub fn from_refs(post_id: Option<Uuid>, event_id: Option<Uuid>) -> Result<Option<Self>> {
        match (post_id, event_id) {
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "a message may reference a post or an event, not both".into(),
            )),
            (Some(post_id), None) => Ok(Some(Self::Post { post_id })),
            (None, Some(event_id)) => Ok(Some(Self::Event { event_id })),
            (None, None) => Ok(None),
        }
    }

    pub fn post_id(&self) -> Option<Uuid> {
        match self {
            Self::Post { post_id } => Some(*post_id),
            Self::Event { .. } => None,
        }
    }

    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            Self::Event { event_id } => Some(*event_id),
            Self::Post { .. } => None,
        }
    }
}

/// A persisted direct message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPreview {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub image_url: Option<String>,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPreview {
    pub event_id: Uuid,
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub image_url: Option<String>,
}

/// Denormalized summary of whatever a message references.
/// `None` covers both "no attachment" and "attachment no longer resolvable".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preview {
    #[default]
    None,
    Post(PostPreview),
    Event(EventPreview),
}

/// A message as delivered to clients: the stored record plus its preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub preview: Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    ConnectionRequest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ConnectionRequest => "connection_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "connection_request" => Some(Self::ConnectionRequest),
            _ => None,
        }
    }

    /// Table the `source_id` of a notification of this kind points into.
    pub fn source_table(&self) -> &'static str {
        match self {
            Self::Message => "messages",
            Self::ConnectionRequest => "connection_requests",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub source_table: String,
    pub source_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}
