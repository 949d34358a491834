use std::collections::BTreeSet;
use std::sync::Arc;

use rusqlite::Connection;
use tether_types::Result;
use tether_types::models::{Attachment, Message, MessageView, Preview, canonical_pair};
use tracing::info;
use uuid::Uuid;

use crate::Database;
use crate::content::{event_previews, post_previews};
use crate::ext::{StoreResultExt, format_ts, get_opt_uuid, get_ts, get_uuid, now, parse_ts};
use crate::graph::pair_connected;

/// Append-only message persistence plus preview enrichment.
///
/// Callers must have verified that sender and receiver are connected before
/// calling [`MessageStore::append`]; the store does not re-check.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a message. `created_at` is assigned here and is strictly
    /// increasing across the store, so `history` order is stable under
    /// concurrent sends.
    pub fn append(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let id = Uuid::new_v4();
        let (lo, hi) = canonical_pair(sender_id, receiver_id);

        self.db.with_conn(|conn| {
            let last: Option<String> = conn
                .query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))
                .persist()?;

            let mut created_at = now();
            if let Some(last) = last {
                let last = parse_ts(&last, 0).persist()?;
                if created_at <= last {
                    created_at = last + chrono::Duration::microseconds(1);
                }
            }

            conn.execute(
                "INSERT INTO messages
                     (id, sender_id, receiver_id, pair_lo, pair_hi, content, post_id, event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    lo.to_string(),
                    hi.to_string(),
                    content,
                    attachment.and_then(|a| a.post_id()).map(|id| id.to_string()),
                    attachment.and_then(|a| a.event_id()).map(|id| id.to_string()),
                    format_ts(created_at),
                ],
            )
            .persist()?;

            Ok(Message {
                id,
                sender_id,
                receiver_id,
                content: content.to_string(),
                attachment,
                created_at,
            })
        })
    }

    /// Full thread between two users, oldest first. An unconnected pair yields
    /// an empty thread rather than an error.
    pub fn history(&self, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>> {
        let (lo, hi) = canonical_pair(user_a, user_b);

        self.db.with_conn(|conn| {
            if !pair_connected(conn, lo, hi)? {
                return Ok(vec![]);
            }
            query_thread(conn, lo, hi)
        })
    }

    /// Attach a preview to each message, resolving every distinct post/event
    /// reference in one query per kind. Dangling references yield `Preview::None`.
    pub fn enrich_with_previews(&self, messages: Vec<Message>) -> Result<Vec<MessageView>> {
        let post_ids: BTreeSet<Uuid> = messages
            .iter()
            .filter_map(|m| m.attachment.and_then(|a| a.post_id()))
            .collect();
        let event_ids: BTreeSet<Uuid> = messages
            .iter()
            .filter_map(|m| m.attachment.and_then(|a| a.event_id()))
            .collect();

        let (posts, events) = if post_ids.is_empty() && event_ids.is_empty() {
            Default::default()
        } else {
            let post_ids: Vec<Uuid> = post_ids.into_iter().collect();
            let event_ids: Vec<Uuid> = event_ids.into_iter().collect();
            self.db.with_conn(|conn| {
                Ok((post_previews(conn, &post_ids)?, event_previews(conn, &event_ids)?))
            })?
        };

        Ok(messages
            .into_iter()
            .map(|message| {
                let preview = match message.attachment {
                    Some(Attachment::Post { post_id }) => {
                        posts.get(&post_id).cloned().map_or(Preview::None, Preview::Post)
                    }
                    Some(Attachment::Event { event_id }) => {
                        events.get(&event_id).cloned().map_or(Preview::None, Preview::Event)
                    }
                    None => Preview::None,
                };
                MessageView { message, preview }
            })
            .collect())
    }

    /// Delete every message between the pair and clear any pending purge marker for it.
    pub fn purge(&self, user_a: Uuid, user_b: Uuid) -> Result<usize> {
        let (lo, hi) = canonical_pair(user_a, user_b);
        let deleted = self.db.with_conn(|conn| purge_pair(conn, lo, hi))?;

        info!("Purged {} messages between {} and {}", deleted, lo, hi);
        Ok(deleted)
    }

    /// Everyone `user_id` has exchanged messages with, most recent conversation
    /// first. Independent of current connection status.
    pub fn conversation_peers(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS peer,
                            MAX(created_at) AS last_at
                     FROM messages
                     WHERE sender_id = ?1 OR receiver_id = ?1
                     GROUP BY peer
                     ORDER BY last_at DESC",
                )
                .persist()?;
            let peers = stmt
                .query_map([user_id.to_string()], |row| get_uuid(row, 0))
                .persist()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .persist()?;
            Ok(peers)
        })
    }
}

/// Message deletion and marker removal commit together.
pub(crate) fn purge_pair(conn: &Connection, lo: Uuid, hi: Uuid) -> Result<usize> {
    let tx = conn.unchecked_transaction().persist()?;
    let deleted = tx
        .execute(
            "DELETE FROM messages WHERE pair_lo = ?1 AND pair_hi = ?2",
            [lo.to_string(), hi.to_string()],
        )
        .persist()?;
    tx.execute(
        "DELETE FROM pending_purges WHERE pair_lo = ?1 AND pair_hi = ?2",
        [lo.to_string(), hi.to_string()],
    )
    .persist()?;
    tx.commit().persist()?;
    Ok(deleted)
}

fn query_thread(conn: &Connection, lo: Uuid, hi: Uuid) -> Result<Vec<Message>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, sender_id, receiver_id, content, post_id, event_id, created_at
             FROM messages
             WHERE pair_lo = ?1 AND pair_hi = ?2
             ORDER BY created_at ASC, rowid ASC",
        )
        .persist()?;

    let rows = stmt
        .query_map([lo.to_string(), hi.to_string()], |row| {
            let attachment = match (get_opt_uuid(row, 4)?, get_opt_uuid(row, 5)?) {
                (Some(post_id), _) => Some(Attachment::Post { post_id }),
                (None, Some(event_id)) => Some(Attachment::Event { event_id }),
                (None, None) => None,
            };
            Ok(Message {
                id: get_uuid(row, 0)?,
                sender_id: get_uuid(row, 1)?,
                receiver_id: get_uuid(row, 2)?,
                content: row.get(3)?,
                attachment,
                created_at: get_ts(row, 6)?,
            })
        })
        .persist()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .persist()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConnectionGraph;
    use chrono::Utc;

    fn connected_pair() -> (Arc<Database>, MessageStore, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let graph = ConnectionGraph::new(db.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = graph.send_request(a, b).unwrap();
        graph.accept(request.id, b).unwrap();
        (db.clone(), MessageStore::new(db), a, b)
    }

    #[test]
    fn history_is_ordered_and_verbatim() {
        let (_db, store, a, b) = connected_pair();

        let first = store.append(a, b, "hi", None).unwrap();
        let second = store.append(b, a, "hello back", None).unwrap();
        let third = store.append(a, b, "", Some(Attachment::Post { post_id: Uuid::new_v4() })).unwrap();

        let thread = store.history(b, a).unwrap();
        assert_eq!(thread, vec![first, second, third]);
        assert!(thread.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[test]
    fn history_of_unconnected_pair_is_empty() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = MessageStore::new(db);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // The store does not gate appends, so this message exists but stays hidden.
        store.append(a, b, "orphan", None).unwrap();
        assert!(store.history(a, b).unwrap().is_empty());
    }

    #[test]
    fn rapid_appends_get_distinct_timestamps() {
        let (_db, store, a, b) = connected_pair();
        let stamps: Vec<_> = (0..50)
            .map(|i| store.append(a, b, &i.to_string(), None).unwrap().created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn previews_resolve_posts_events_and_missing_refs() {
        let (db, store, a, b) = connected_pair();
        db.upsert_user(a, "Alice", "alice@example.com", Some("alice.png")).unwrap();
        let post_id = db.insert_post(a, "A long day at the lake", Some("lake.jpg")).unwrap();
        let event_id = db.insert_event(b, "Picnic", Utc::now(), None).unwrap();

        let messages = vec![
            store.append(a, b, "look", Some(Attachment::Post { post_id })).unwrap(),
            store.append(b, a, "come", Some(Attachment::Event { event_id })).unwrap(),
            store.append(a, b, "gone", Some(Attachment::Post { post_id: Uuid::new_v4() })).unwrap(),
            store.append(a, b, "plain", None).unwrap(),
        ];

        let views = store.enrich_with_previews(messages).unwrap();
        match &views[0].preview {
            Preview::Post(p) => {
                assert_eq!(p.author_name, "Alice");
                assert_eq!(p.author_avatar.as_deref(), Some("alice.png"));
                assert_eq!(p.image_url.as_deref(), Some("lake.jpg"));
            }
            other => panic!("expected post preview, got {other:?}"),
        }
        match &views[1].preview {
            Preview::Event(e) => assert_eq!(e.name, "Picnic"),
            other => panic!("expected event preview, got {other:?}"),
        }
        assert_eq!(views[2].preview, Preview::None);
        assert_eq!(views[3].preview, Preview::None);
    }

    #[test]
    fn purge_clears_only_the_pair() {
        let (_db, store, a, b) = connected_pair();
        let c = Uuid::new_v4();
        store.append(a, b, "one", None).unwrap();
        store.append(b, a, "two", None).unwrap();
        store.append(a, c, "other thread", None).unwrap();

        assert_eq!(store.purge(b, a).unwrap(), 2);
        assert!(store.history(a, b).unwrap().is_empty());
        assert_eq!(store.conversation_peers(a).unwrap(), vec![c]);
    }

    #[test]
    fn conversation_peers_are_distinct_and_recent_first() {
        let (_db, store, a, b) = connected_pair();
        let c = Uuid::new_v4();
        store.append(a, b, "1", None).unwrap();
        store.append(c, a, "2", None).unwrap();
        store.append(b, a, "3", None).unwrap();

        assert_eq!(store.conversation_peers(a).unwrap(), vec![b, c]);
        assert_eq!(store.conversation_peers(c).unwrap(), vec![a]);
    }
}
