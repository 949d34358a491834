use std::collections::HashMap;

use rusqlite::params_from_iter;
use tether_types::Result;
use tether_types::models::{User, UserSummary};
use uuid::Uuid;

use crate::Database;
use crate::ext::{
    MAX_BOUND_IDS, OptionalExt, StoreResultExt, format_ts, get_ts, get_uuid, now, placeholders,
};

/// Display name used when a referenced user was never mirrored locally.
pub(crate) const UNKNOWN_USER: &str = "unknown";

pub(crate) fn summary(id: Uuid, name: Option<String>, avatar_url: Option<String>) -> UserSummary {
    UserSummary {
        id,
        name: name.unwrap_or_else(|| UNKNOWN_USER.to_string()),
        avatar_url,
    }
}

impl Database {
    /// Mirror identity-provider reference data. Rewrites the row only when a field changed.
    pub fn upsert_user(
        &self,
        id: Uuid,
        name: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     avatar_url = excluded.avatar_url
                 WHERE users.name IS NOT excluded.name
                    OR users.email IS NOT excluded.email
                    OR users.avatar_url IS NOT excluded.avatar_url",
                rusqlite::params![id.to_string(), name, email, avatar_url, format_ts(now())],
            )
            .persist()?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, email, avatar_url, created_at FROM users WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(User {
                        id: get_uuid(row, 0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        avatar_url: row.get(3)?,
                        created_at: get_ts(row, 4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Profiles for `ids`, in the same order. Unknown ids get a placeholder name.
    pub fn user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let found = self.with_conn(|conn| {
            let mut found = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_BOUND_IDS) {
                let sql = format!(
                    "SELECT id, name, avatar_url FROM users WHERE id IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql).persist()?;
                let rows = stmt
                    .query_map(params_from_iter(chunk.iter().map(|id| id.to_string())), |row| {
                        Ok((get_uuid(row, 0)?, row.get::<_, String>(1)?, row.get(2)?))
                    })
                    .persist()?
                    .collect::<rusqlite::Result<Vec<(Uuid, String, Option<String>)>>>()
                    .persist()?;
                found.extend(rows.into_iter().map(|(id, name, avatar)| (id, (name, avatar))));
            }
            Ok(found)
        })?;

        Ok(ids
            .iter()
            .map(|id| match found.get(id) {
                Some((name, avatar)) => summary(*id, Some(name.clone()), avatar.clone()),
                None => summary(*id, None, None),
            })
            .collect())
    }
}
