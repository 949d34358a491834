//! Posts and events as seen from the messaging core: read-only reference data
//! for previews, the feed and invitations. Their CRUD lives elsewhere; the
//! inserts here exist for seeding.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params_from_iter};
use tether_types::Result;
use tether_types::api::FeedItem;
use tether_types::models::{EventPreview, PostPreview};
use uuid::Uuid;

use crate::Database;
use crate::ext::{
    MAX_BOUND_IDS, OptionalExt, StoreResultExt, format_ts, get_ts, get_uuid, now, placeholders,
};
use crate::users::UNKNOWN_USER;

/// Characters of post content carried in a preview.
const EXCERPT_CHARS: usize = 140;

fn excerpt(content: &str) -> String {
    content.chars().take(EXCERPT_CHARS).collect()
}

const POST_PREVIEW_COLUMNS: &str =
    "p.id, p.author_id, u.name, u.avatar_url, p.image_url, p.content, p.created_at";

fn post_preview_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(PostPreview, DateTime<Utc>)> {
    let content: String = row.get(5)?;
    Ok((
        PostPreview {
            post_id: get_uuid(row, 0)?,
            author_id: get_uuid(row, 1)?,
            author_name: row
                .get::<_, Option<String>>(2)?
                .unwrap_or_else(|| UNKNOWN_USER.to_string()),
            author_avatar: row.get(3)?,
            image_url: row.get(4)?,
            excerpt: excerpt(&content),
        },
        get_ts(row, 6)?,
    ))
}

/// Batch-resolve post previews. Ids with no row are simply absent from the map.
pub(crate) fn post_previews(conn: &Connection, ids: &[Uuid]) -> Result<HashMap<Uuid, PostPreview>> {
    let mut previews = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let sql = format!(
            "SELECT {POST_PREVIEW_COLUMNS}
             FROM posts p
             LEFT JOIN users u ON u.id = p.author_id
             WHERE p.id IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql).persist()?;
        let rows = stmt
            .query_map(
                params_from_iter(chunk.iter().map(|id| id.to_string())),
                post_preview_from_row,
            )
            .persist()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist()?;
        previews.extend(rows.into_iter().map(|(preview, _)| (preview.post_id, preview)));
    }
    Ok(previews)
}

/// Batch-resolve event previews. Ids with no row are simply absent from the map.
pub(crate) fn event_previews(
    conn: &Connection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, EventPreview>> {
    let mut previews = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BOUND_IDS) {
        let sql = format!(
            "SELECT id, name, event_date, image_url FROM events WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql).persist()?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter().map(|id| id.to_string())), |row| {
                Ok(EventPreview {
                    event_id: get_uuid(row, 0)?,
                    name: row.get(1)?,
                    event_date: get_ts(row, 2)?,
                    image_url: row.get(3)?,
                })
            })
            .persist()?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist()?;
        previews.extend(rows.into_iter().map(|e| (e.event_id, e)));
    }
    Ok(previews)
}

impl Database {
    pub fn insert_post(&self, author_id: Uuid, content: &str, image_url: Option<&str>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, content, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    author_id.to_string(),
                    content,
                    image_url,
                    format_ts(now())
                ],
            )
            .persist()?;
            Ok(id)
        })
    }

    pub fn insert_event(
        &self,
        creator_id: Uuid,
        name: &str,
        event_date: DateTime<Utc>,
        image_url: Option<&str>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (id, creator_id, name, event_date, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    creator_id.to_string(),
                    name,
                    format_ts(event_date),
                    image_url,
                    format_ts(now())
                ],
            )
            .persist()?;
            Ok(id)
        })
    }

    pub fn event_creator(&self, event_id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT creator_id FROM events WHERE id = ?1",
                [event_id.to_string()],
                |row| get_uuid(row, 0),
            )
            .optional()
        })
    }

    /// Records invitations; re-inviting someone is a no-op.
    pub fn insert_event_invites(
        &self,
        event_id: Uuid,
        invited_by: Uuid,
        user_ids: &[Uuid],
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().persist()?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT OR IGNORE INTO event_invites (event_id, user_id, invited_by, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .persist()?;
                let created_at = format_ts(now());
                for user_id in user_ids {
                    stmt.execute(rusqlite::params![
                        event_id.to_string(),
                        user_id.to_string(),
                        invited_by.to_string(),
                        created_at
                    ])
                    .persist()?;
                }
            }
            tx.commit().persist()
        })
    }

    pub fn event_invitees(&self, event_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT user_id FROM event_invites WHERE event_id = ?1 ORDER BY created_at, user_id")
                .persist()?;
            let rows = stmt
                .query_map([event_id.to_string()], |row| get_uuid(row, 0))
                .persist()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .persist()?;
            Ok(rows)
        })
    }

    /// Newest posts written by any of `authors`.
    pub fn posts_by_authors(&self, authors: &[Uuid], limit: u32) -> Result<Vec<FeedItem>> {
        let mut items = self.with_conn(|conn| {
            let mut items = Vec::new();
            for chunk in authors.chunks(MAX_BOUND_IDS) {
                let sql = format!(
                    "SELECT {POST_PREVIEW_COLUMNS}
                     FROM posts p
                     LEFT JOIN users u ON u.id = p.author_id
                     WHERE p.author_id IN ({})
                     ORDER BY p.created_at DESC
                     LIMIT {}",
                    placeholders(chunk.len()),
                    limit
                );
                let mut stmt = conn.prepare(&sql).persist()?;
                let rows = stmt
                    .query_map(
                        params_from_iter(chunk.iter().map(|id| id.to_string())),
                        post_preview_from_row,
                    )
                    .persist()?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .persist()?;
                items.extend(rows.into_iter().map(|(post, created_at)| FeedItem { post, created_at }));
            }
            Ok(items)
        })?;

        // Each chunk is already newest-first; merge them and keep the overall newest.
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit as usize);
        Ok(items)
    }
}
