pub mod content;
pub mod feed;
pub mod graph;
pub mod messages;
pub mod migrations;
pub mod notifications;
pub mod users;

mod ext;

pub use feed::FeedAuthorizer;
pub use graph::ConnectionGraph;
pub use messages::MessageStore;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tether_types::{Error, Result};
use tracing::info;

/// Single SQLite connection behind a mutex. Every store call holds the lock
/// for its whole closure, so graph mutations are serialized globally; the
/// unique indexes in the schema back that up.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private database, used by tests and ephemeral deployments.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Persistence(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}
