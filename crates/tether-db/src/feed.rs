use std::collections::HashSet;
use std::sync::Arc;

use tether_types::api::FeedItem;
use tether_types::{Error, Result};
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::graph::ConnectionGraph;

/// Derives who a user may see and invite: themself plus every connected peer.
#[derive(Clone)]
pub struct FeedAuthorizer {
    db: Arc<Database>,
    graph: ConnectionGraph,
}

impl FeedAuthorizer {
    pub fn new(db: Arc<Database>, graph: ConnectionGraph) -> Self {
        Self { db, graph }
    }

    pub fn visible_author_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let mut visible: HashSet<Uuid> = self.graph.peer_ids(user_id)?.into_iter().collect();
        visible.insert(user_id);
        Ok(visible)
    }

    /// Fails with `Forbidden` if any invitee is outside the caller's visible set.
    pub fn authorize_invites(&self, user_id: Uuid, invitees: &[Uuid]) -> Result<()> {
        let visible = self.visible_author_set(user_id)?;
        match invitees.iter().find(|id| !visible.contains(id)) {
            Some(outsider) => Err(Error::Forbidden(format!(
                "user {} is not connected to the inviter",
                outsider
            ))),
            None => Ok(()),
        }
    }

    /// Newest posts by the caller and their connections.
    pub fn feed(&self, user_id: Uuid, limit: u32) -> Result<Vec<FeedItem>> {
        let authors: Vec<Uuid> = self.visible_author_set(user_id)?.into_iter().collect();
        self.db.posts_by_authors(&authors, limit)
    }

    /// Invite connected peers to an event the caller created. All-or-nothing.
    pub fn invite(&self, event_id: Uuid, inviter_id: Uuid, invitees: &[Uuid]) -> Result<Vec<Uuid>> {
        let creator = self
            .db
            .event_creator(event_id)?
            .ok_or_else(|| Error::NotFound(format!("no event {}", event_id)))?;
        if creator != inviter_id {
            return Err(Error::Forbidden("only the event creator can invite".into()));
        }

        self.authorize_invites(inviter_id, invitees)?;

        let mut unique: Vec<Uuid> = Vec::with_capacity(invitees.len());
        for id in invitees {
            if *id != inviter_id && !unique.contains(id) {
                unique.push(*id);
            }
        }
        self.db.insert_event_invites(event_id, inviter_id, &unique)?;

        info!("{} invited {} users to event {}", inviter_id, unique.len(), event_id);
        Ok(unique)
    }
}
