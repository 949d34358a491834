use tether_types::models::{Notification, NotificationKind};
use tether_types::{Error, Result};
use uuid::Uuid;

use crate::Database;
use crate::ext::{StoreResultExt, format_ts, get_ts, get_uuid, now};

impl Database {
    pub fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        source_id: Uuid,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            source_table: kind.source_table().to_string(),
            source_id,
            created_at: now(),
            is_read: false,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, source_table, source_id, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                rusqlite::params![
                    notification.id.to_string(),
                    user_id.to_string(),
                    kind.as_str(),
                    notification.source_table,
                    source_id.to_string(),
                    format_ts(notification.created_at),
                ],
            )
            .persist()?;
            Ok(())
        })?;

        Ok(notification)
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, kind, source_table, source_id, created_at, is_read
                     FROM notifications
                     WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                     ORDER BY created_at DESC, rowid DESC",
                )
                .persist()?;

            let rows = stmt
                .query_map(rusqlite::params![user_id.to_string(), unread_only], |row| {
                    let raw_kind: String = row.get(2)?;
                    let kind = NotificationKind::parse(&raw_kind).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            format!("unknown notification kind '{}'", raw_kind).into(),
                        )
                    })?;
                    Ok(Notification {
                        id: get_uuid(row, 0)?,
                        user_id: get_uuid(row, 1)?,
                        kind,
                        source_table: row.get(3)?,
                        source_id: get_uuid(row, 4)?,
                        created_at: get_ts(row, 5)?,
                        is_read: row.get(6)?,
                    })
                })
                .persist()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .persist()?;

            Ok(rows)
        })
    }

    /// Marks one notification read. `NotFound` unless it belongs to `user_id`.
    pub fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                    [notification_id.to_string(), user_id.to_string()],
                )
                .persist()?;
            if updated == 0 {
                return Err(Error::NotFound(format!("no notification {}", notification_id)));
            }
            Ok(())
        })
    }

    /// Returns how many notifications flipped from unread to read.
    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )
            .persist()
        })
    }
}
