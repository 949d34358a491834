use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL
        );

        -- pair_lo/pair_hi: canonical (min, max) of sender and receiver
        CREATE TABLE IF NOT EXISTS connection_requests (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            pair_lo     TEXT NOT NULL,
            pair_hi     TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL,
            CHECK (sender_id <> receiver_id),
            CHECK (status IN ('pending', 'accepted', 'rejected'))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_requests_pending_pair
            ON connection_requests(pair_lo, pair_hi) WHERE status = 'pending';

        CREATE INDEX IF NOT EXISTS idx_requests_receiver
            ON connection_requests(receiver_id, status);

        CREATE INDEX IF NOT EXISTS idx_requests_sender
            ON connection_requests(sender_id, status);

        CREATE TABLE IF NOT EXISTS connections (
            id          TEXT PRIMARY KEY,
            user_a_id   TEXT NOT NULL,
            user_b_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE (user_a_id, user_b_id),
            CHECK (user_a_id < user_b_id)
        );

        CREATE INDEX IF NOT EXISTS idx_connections_user_b
            ON connections(user_b_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            pair_lo     TEXT NOT NULL,
            pair_hi     TEXT NOT NULL,
            content     TEXT NOT NULL,
            post_id     TEXT,
            event_id    TEXT,
            created_at  TEXT NOT NULL,
            CHECK (post_id IS NULL OR event_id IS NULL)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(pair_lo, pair_hi, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver
            ON messages(receiver_id, created_at);

        -- Written with a connection deletion, cleared with the purge of its messages
        CREATE TABLE IF NOT EXISTS pending_purges (
            pair_lo     TEXT NOT NULL,
            pair_hi     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (pair_lo, pair_hi)
        );

        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL,
            content     TEXT NOT NULL,
            image_url   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_author
            ON posts(author_id, created_at);

        CREATE TABLE IF NOT EXISTS events (
            id          TEXT PRIMARY KEY,
            creator_id  TEXT NOT NULL,
            name        TEXT NOT NULL,
            event_date  TEXT NOT NULL,
            image_url   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS event_invites (
            event_id    TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            invited_by  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (event_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            kind         TEXT NOT NULL,
            source_table TEXT NOT NULL,
            source_id    TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            is_read      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
