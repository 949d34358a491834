use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection as SqlConnection;
use tether_types::models::{
    Connection, ConnectionPeer, ConnectionRequest, PendingRequests, RequestStatus, RequestView,
    canonical_pair,
};
use tether_types::{ConflictReason, Error, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::Database;
use crate::ext::{
    OptionalExt, StoreResultExt, format_ts, get_ts, get_uuid, is_unique_violation, now,
};
use crate::messages::{MessageStore, purge_pair};
use crate::users::summary;

/// Attempts made at the compensating purge before leaving it to startup recovery.
const PURGE_ATTEMPTS: u32 = 3;
const PURGE_BACKOFF: Duration = Duration::from_millis(50);

/// The connection graph: an undirected "connected" relation plus directed
/// pending requests, driven through `none -> pending(sender) -> {connected | none}`.
#[derive(Clone)]
pub struct ConnectionGraph {
    db: Arc<Database>,
    messages: MessageStore,
}

pub(crate) fn pair_connected(conn: &SqlConnection, lo: Uuid, hi: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM connections WHERE user_a_id = ?1 AND user_b_id = ?2",
            [lo.to_string(), hi.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn connection_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: get_uuid(row, 0)?,
        user_a_id: get_uuid(row, 1)?,
        user_b_id: get_uuid(row, 2)?,
        created_at: get_ts(row, 3)?,
    })
}

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRequest> {
    let raw_status: String = row.get(3)?;
    let status = RequestStatus::parse(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown request status '{}'", raw_status).into(),
        )
    })?;
    Ok(ConnectionRequest {
        id: get_uuid(row, 0)?,
        sender_id: get_uuid(row, 1)?,
        receiver_id: get_uuid(row, 2)?,
        status,
        created_at: get_ts(row, 4)?,
    })
}

fn purge_marker_exists(conn: &SqlConnection, lo: Uuid, hi: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM pending_purges WHERE pair_lo = ?1 AND pair_hi = ?2",
            [lo.to_string(), hi.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_connection(conn: &SqlConnection, id: Uuid) -> Result<Option<Connection>> {
    conn.query_row(
        "SELECT id, user_a_id, user_b_id, created_at FROM connections WHERE id = ?1",
        [id.to_string()],
        connection_from_row,
    )
    .optional()
}

fn query_connection_by_pair(conn: &SqlConnection, lo: Uuid, hi: Uuid) -> Result<Option<Connection>> {
    conn.query_row(
        "SELECT id, user_a_id, user_b_id, created_at FROM connections
         WHERE user_a_id = ?1 AND user_b_id = ?2",
        [lo.to_string(), hi.to_string()],
        connection_from_row,
    )
    .optional()
}

impl ConnectionGraph {
    pub fn new(db: Arc<Database>) -> Self {
        let messages = MessageStore::new(db.clone());
        Self { db, messages }
    }

    pub fn send_request(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<ConnectionRequest> {
        if sender_id == receiver_id {
            return Err(Error::InvalidArgument(
                "cannot send a connection request to yourself".into(),
            ));
        }

        let (lo, hi) = canonical_pair(sender_id, receiver_id);
        let request = ConnectionRequest {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            status: RequestStatus::Pending,
            created_at: now(),
        };

        self.db.with_conn(|conn| {
            if pair_connected(conn, lo, hi)? {
                return Err(Error::Conflict(ConflictReason::AlreadyConnected));
            }

            let pending = conn
                .query_row(
                    "SELECT 1 FROM connection_requests
                     WHERE pair_lo = ?1 AND pair_hi = ?2 AND status = 'pending'",
                    [lo.to_string(), hi.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            if pending.is_some() {
                return Err(Error::Conflict(ConflictReason::RequestExists));
            }

            let inserted = conn.execute(
                "INSERT INTO connection_requests
                     (id, sender_id, receiver_id, pair_lo, pair_hi, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    request.id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    lo.to_string(),
                    hi.to_string(),
                    RequestStatus::Pending.as_str(),
                    format_ts(request.created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(Error::Conflict(ConflictReason::RequestExists))
                }
                Err(e) => Err(e).persist(),
            }
        })?;

        info!("Connection request {} sent {} -> {}", request.id, sender_id, receiver_id);
        Ok(request)
    }

    /// Accept a pending request addressed to `accepting_user_id`.
    ///
    /// Two steps: insert the connection, then delete the request. If the
    /// delete fails the connection stands and `Error::PartialSuccess` is returned.
    pub fn accept(&self, request_id: Uuid, accepting_user_id: Uuid) -> Result<Connection> {
        let connection = self.db.with_conn(|conn| {
            let request = conn
                .query_row(
                    "SELECT id, sender_id, receiver_id, status, created_at
                     FROM connection_requests
                     WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                    [request_id.to_string(), accepting_user_id.to_string()],
                    request_from_row,
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("no pending request {}", request_id)))?;

            let (lo, hi) = canonical_pair(request.sender_id, request.receiver_id);

            // Leftover purge from an earlier connection finishes before the pair reconnects.
            if purge_marker_exists(conn, lo, hi)? {
                let deleted = purge_pair(conn, lo, hi)?;
                info!(
                    "Flushed {} stale messages between {} and {} before reconnecting",
                    deleted, lo, hi
                );
            }

            let candidate = Connection {
                id: Uuid::new_v4(),
                user_a_id: lo,
                user_b_id: hi,
                created_at: now(),
            };

            let inserted = conn.execute(
                "INSERT INTO connections (id, user_a_id, user_b_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    candidate.id.to_string(),
                    lo.to_string(),
                    hi.to_string(),
                    format_ts(candidate.created_at),
                ],
            );
            let connection = match inserted {
                Ok(_) => candidate,
                // Already connected through another path: keep the existing row.
                Err(e) if is_unique_violation(&e) => query_connection_by_pair(conn, lo, hi)?
                    .ok_or_else(|| Error::Persistence(e.to_string()))?,
                Err(e) => return Err(e).persist(),
            };

            if let Err(e) = conn.execute(
                "DELETE FROM connection_requests WHERE id = ?1",
                [request_id.to_string()],
            ) {
                error!(
                    "Connection {} created but request {} cleanup failed: {}",
                    connection.id, request_id, e
                );
                return Err(Error::PartialSuccess {
                    connection_id: connection.id,
                    reason: e.to_string(),
                });
            }

            Ok(connection)
        })?;

        info!(
            "Connection {} established between {} and {}",
            connection.id, connection.user_a_id, connection.user_b_id
        );
        Ok(connection)
    }

    /// Drop a pending request addressed to `rejecting_user_id`. Rejecting a
    /// request that no longer exists is a no-op; rejecting someone else's is `NotFound`.
    pub fn reject(&self, request_id: Uuid, rejecting_user_id: Uuid) -> Result<()> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM connection_requests
                     WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                    [request_id.to_string(), rejecting_user_id.to_string()],
                )
                .persist()?;
            if deleted > 0 {
                info!("Connection request {} rejected by {}", request_id, rejecting_user_id);
                return Ok(());
            }

            let exists = conn
                .query_row(
                    "SELECT 1 FROM connection_requests WHERE id = ?1",
                    [request_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            match exists {
                Some(()) => Err(Error::NotFound(format!("no pending request {}", request_id))),
                None => Ok(()),
            }
        })
    }

    pub fn are_connected(&self, user_a: Uuid, user_b: Uuid) -> Result<bool> {
        let (lo, hi) = canonical_pair(user_a, user_b);
        self.db.with_conn(|conn| pair_connected(conn, lo, hi))
    }

    pub fn connection(&self, connection_id: Uuid) -> Result<Option<Connection>> {
        self.db.with_conn(|conn| query_connection(conn, connection_id))
    }

    /// Delete a connection on behalf of either party, then purge the pair's
    /// messages. The deletion and a purge marker commit together; the purge is
    /// retried and, failing that, left for [`ConnectionGraph::resume_pending_purges`].
    pub fn remove(&self, connection_id: Uuid, requester_id: Uuid) -> Result<Connection> {
        let connection = self.db.with_conn(|conn| {
            let connection = query_connection(conn, connection_id)?
                .ok_or_else(|| Error::NotFound(format!("no connection {}", connection_id)))?;
            if !connection.involves(requester_id) {
                return Err(Error::Unauthorized(
                    "only a party to the connection can remove it".into(),
                ));
            }

            let tx = conn.unchecked_transaction().persist()?;
            tx.execute("DELETE FROM connections WHERE id = ?1", [connection_id.to_string()])
                .persist()?;
            tx.execute(
                "INSERT OR REPLACE INTO pending_purges (pair_lo, pair_hi, created_at)
                 VALUES (?1, ?2, ?3)",
                [
                    connection.user_a_id.to_string(),
                    connection.user_b_id.to_string(),
                    format_ts(now()),
                ],
            )
            .persist()?;
            tx.commit().persist()?;
            Ok(connection)
        })?;

        info!("Connection {} removed by {}", connection_id, requester_id);
        self.purge_with_retry(connection.user_a_id, connection.user_b_id);
        Ok(connection)
    }

    /// Replay purge markers left by a crash or by purges that exhausted their
    /// retries. Returns how many markers were found.
    pub fn resume_pending_purges(&self) -> Result<usize> {
        let pairs = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT pair_lo, pair_hi FROM pending_purges ORDER BY created_at")
                .persist()?;
            let pairs = stmt
                .query_map([], |row| Ok((get_uuid(row, 0)?, get_uuid(row, 1)?)))
                .persist()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .persist()?;
            Ok(pairs)
        })?;

        if !pairs.is_empty() {
            info!("Resuming {} pending message purges", pairs.len());
        }
        for (lo, hi) in &pairs {
            self.purge_with_retry(*lo, *hi);
        }
        Ok(pairs.len())
    }

    fn purge_with_retry(&self, lo: Uuid, hi: Uuid) {
        for attempt in 1..=PURGE_ATTEMPTS {
            match self.messages.purge(lo, hi) {
                Ok(_) => return,
                Err(e) => {
                    warn!("Purge {} <-> {} attempt {} failed: {}", lo, hi, attempt, e);
                    if attempt < PURGE_ATTEMPTS {
                        std::thread::sleep(PURGE_BACKOFF * attempt);
                    }
                }
            }
        }
        error!(
            "Purge of messages between {} and {} did not complete; marker kept for replay at startup (manual remediation may be needed)",
            lo, hi
        );
    }

    /// Connected peers of `user_id`, newest connection first.
    pub fn list_connections(&self, user_id: Uuid) -> Result<Vec<ConnectionPeer>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.id, c.user_a_id, c.user_b_id, c.created_at, u.name, u.avatar_url
                     FROM connections c
                     LEFT JOIN users u ON u.id =
                         CASE WHEN c.user_a_id = ?1 THEN c.user_b_id ELSE c.user_a_id END
                     WHERE c.user_a_id = ?1 OR c.user_b_id = ?1
                     ORDER BY c.created_at DESC",
                )
                .persist()?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((connection_from_row(row)?, row.get(4)?, row.get(5)?))
                })
                .persist()?
                .collect::<rusqlite::Result<Vec<(Connection, Option<String>, Option<String>)>>>()
                .persist()?;

            Ok(rows
                .into_iter()
                .filter_map(|(connection, name, avatar)| {
                    let peer_id = connection.peer_of(user_id)?;
                    Some(ConnectionPeer {
                        connection_id: connection.id,
                        peer: summary(peer_id, name, avatar),
                        connected_at: connection.created_at,
                    })
                })
                .collect())
        })
    }

    /// Identifiers of every connected peer.
    pub fn peer_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT CASE WHEN user_a_id = ?1 THEN user_b_id ELSE user_a_id END
                     FROM connections
                     WHERE user_a_id = ?1 OR user_b_id = ?1",
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

    /// Pending requests involving `user_id`, split into those it sent and received.
    pub fn list_pending(&self, user_id: Uuid) -> Result<PendingRequests> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT r.id, r.sender_id, r.receiver_id, r.status, r.created_at,
                            u.name, u.avatar_url
                     FROM connection_requests r
                     LEFT JOIN users u ON u.id =
                         CASE WHEN r.sender_id = ?1 THEN r.receiver_id ELSE r.sender_id END
                     WHERE r.status = 'pending' AND (r.sender_id = ?1 OR r.receiver_id = ?1)
                     ORDER BY r.created_at DESC",
                )
                .persist()?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((request_from_row(row)?, row.get(5)?, row.get(6)?))
                })
                .persist()?
                .collect::<rusqlite::Result<Vec<(ConnectionRequest, Option<String>, Option<String>)>>>()
                .persist()?;
            Ok(rows)
        })?;

        let mut pending = PendingRequests::default();
        for (request, name, avatar) in rows {
            if request.sender_id == user_id {
                let counterpart = summary(request.receiver_id, name, avatar);
                pending.sent.push(RequestView { request, counterpart });
            } else {
                let counterpart = summary(request.sender_id, name, avatar);
                pending.received.push(RequestView { request, counterpart });
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> (Arc<Database>, ConnectionGraph) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (db.clone(), ConnectionGraph::new(db))
    }

    fn connect(graph: &ConnectionGraph, a: Uuid, b: Uuid) -> Connection {
        let request = graph.send_request(a, b).unwrap();
        graph.accept(request.id, b).unwrap()
    }

    /// Make every DELETE on `table` fail until [`allow_deletes`] is called.
    fn block_deletes(db: &Database, table: &str) {
        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER block_{table}_delete BEFORE DELETE ON {table}
                 BEGIN SELECT RAISE(ABORT, 'deletes disabled'); END;"
            ))
            .persist()
        })
        .unwrap();
    }

    fn allow_deletes(db: &Database, table: &str) {
        db.with_conn(|conn| {
            conn.execute_batch(&format!("DROP TRIGGER block_{table}_delete;"))
                .persist()
        })
        .unwrap();
    }

    fn purge_markers(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM pending_purges", [], |row| row.get(0))
                .persist()
        })
        .unwrap()
    }

    #[test]
    fn self_request_is_invalid() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        assert!(matches!(graph.send_request(a, a), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn duplicate_request_conflicts_in_both_directions() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph.send_request(a, b).unwrap();
        assert_eq!(
            graph.send_request(a, b),
            Err(Error::Conflict(ConflictReason::RequestExists))
        );
        assert_eq!(
            graph.send_request(b, a),
            Err(Error::Conflict(ConflictReason::RequestExists))
        );
    }

    #[test]
    fn request_after_connecting_conflicts() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        connect(&graph, a, b);

        assert_eq!(
            graph.send_request(b, a),
            Err(Error::Conflict(ConflictReason::AlreadyConnected))
        );
    }

    #[test]
    fn only_the_receiver_can_accept() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = graph.send_request(a, b).unwrap();

        assert!(matches!(graph.accept(request.id, a), Err(Error::NotFound(_))));
        assert!(!graph.are_connected(a, b).unwrap());
    }

    #[test]
    fn accept_connects_symmetrically_and_clears_pending() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let connection = connect(&graph, a, b);

        assert!(connection.user_a_id < connection.user_b_id);
        assert!(graph.are_connected(a, b).unwrap());
        assert!(graph.are_connected(b, a).unwrap());

        for user in [a, b] {
            let pending = graph.list_pending(user).unwrap();
            assert!(pending.sent.is_empty() && pending.received.is_empty());
        }
    }

    #[test]
    fn accepting_twice_is_not_found() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = graph.send_request(a, b).unwrap();
        graph.accept(request.id, b).unwrap();

        assert!(matches!(graph.accept(request.id, b), Err(Error::NotFound(_))));
    }

    #[test]
    fn reject_is_idempotent_and_owner_only() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = graph.send_request(a, b).unwrap();

        assert!(matches!(graph.reject(request.id, a), Err(Error::NotFound(_))));
        graph.reject(request.id, b).unwrap();
        graph.reject(request.id, b).unwrap();

        assert!(!graph.are_connected(a, b).unwrap());
        // Resolved, so a fresh request is allowed again.
        graph.send_request(b, a).unwrap();
    }

    #[test]
    fn pending_is_partitioned_by_direction() {
        let (db, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        db.upsert_user(b, "Bea", "bea@example.com", None).unwrap();

        graph.send_request(a, b).unwrap();
        graph.send_request(c, a).unwrap();

        let pending = graph.list_pending(a).unwrap();
        assert_eq!(pending.sent.len(), 1);
        assert_eq!(pending.sent[0].counterpart.name, "Bea");
        assert_eq!(pending.received.len(), 1);
        assert_eq!(pending.received[0].counterpart.id, c);
    }

    #[test]
    fn either_party_can_remove_and_messages_are_purged() {
        let (db, graph) = graph();
        let store = MessageStore::new(db);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = connect(&graph, a, b);
        store.append(a, b, "hi", None).unwrap();
        graph.remove(first.id, b).unwrap();
        assert!(!graph.are_connected(a, b).unwrap());
        assert!(store.history(a, b).unwrap().is_empty());

        // Reconnect: the old thread must not come back.
        let second = connect(&graph, b, a);
        assert!(store.history(a, b).unwrap().is_empty());
        graph.remove(second.id, a).unwrap();
        assert!(!graph.are_connected(b, a).unwrap());
    }

    #[test]
    fn outsider_cannot_remove() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let connection = connect(&graph, a, b);

        assert!(matches!(
            graph.remove(connection.id, Uuid::new_v4()),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(graph.remove(Uuid::new_v4(), a), Err(Error::NotFound(_))));
        assert!(graph.are_connected(a, b).unwrap());
    }

    #[test]
    fn leftover_purge_markers_are_replayed() {
        let (db, graph) = graph();
        let store = MessageStore::new(db.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (lo, hi) = canonical_pair(a, b);

        // Simulate a crash between the connection delete and the purge.
        store.append(a, b, "stale", None).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_purges (pair_lo, pair_hi, created_at) VALUES (?1, ?2, ?3)",
                [lo.to_string(), hi.to_string(), format_ts(now())],
            )
            .persist()
        })
        .unwrap();

        assert_eq!(graph.resume_pending_purges().unwrap(), 1);
        assert!(store.conversation_peers(a).unwrap().is_empty());
        assert_eq!(graph.resume_pending_purges().unwrap(), 0);
    }

    #[test]
    fn list_connections_names_the_peer() {
        let (db, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.upsert_user(b, "Bo", "bo@example.com", None).unwrap();
        let connection = connect(&graph, a, b);

        let peers = graph.list_connections(a).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].connection_id, connection.id);
        assert_eq!(peers[0].peer.id, b);
        assert_eq!(peers[0].peer.name, "Bo");
        assert_eq!(graph.peer_ids(b).unwrap(), vec![a]);
    }

    #[test]
    fn concurrent_requests_on_one_pair_admit_exactly_one() {
        let (_, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let graph = graph.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        graph.send_request(a, b)
                    } else {
                        graph.send_request(b, a)
                    }
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == Error::Conflict(ConflictReason::RequestExists))
        );
        let pending = graph.list_pending(a).unwrap();
        assert_eq!(pending.sent.len() + pending.received.len(), 1);
    }

    #[test]
    fn failed_request_cleanup_keeps_the_connection() {
        let (db, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = graph.send_request(a, b).unwrap();

        block_deletes(&db, "connection_requests");
        match graph.accept(request.id, b) {
            Err(Error::PartialSuccess { connection_id, .. }) => {
                let stored = graph.connection(connection_id).unwrap().unwrap();
                assert!(stored.involves(a) && stored.involves(b));
            }
            other => panic!("expected partial success, got {other:?}"),
        }
        assert!(graph.are_connected(a, b).unwrap());
    }

    #[test]
    fn exhausted_purge_keeps_marker_and_remove_succeeds() {
        let (db, graph) = graph();
        let store = MessageStore::new(db.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let connection = connect(&graph, a, b);
        store.append(a, b, "hold on", None).unwrap();

        block_deletes(&db, "messages");
        let removed = graph.remove(connection.id, a).unwrap();
        assert_eq!(removed.id, connection.id);
        assert!(!graph.are_connected(a, b).unwrap());
        assert_eq!(purge_markers(&db), 1);
        assert_eq!(store.conversation_peers(a).unwrap(), vec![b]);

        // Next startup finishes the job.
        allow_deletes(&db, "messages");
        assert_eq!(graph.resume_pending_purges().unwrap(), 1);
        assert_eq!(purge_markers(&db), 0);
        assert!(store.conversation_peers(a).unwrap().is_empty());
    }

    #[test]
    fn reconnecting_flushes_stale_purge_before_new_thread() {
        let (db, graph) = graph();
        let store = MessageStore::new(db.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = connect(&graph, a, b);
        store.append(a, b, "old thread", None).unwrap();
        block_deletes(&db, "messages");
        graph.remove(first.id, a).unwrap();
        allow_deletes(&db, "messages");
        assert_eq!(purge_markers(&db), 1);

        connect(&graph, b, a);
        assert_eq!(purge_markers(&db), 0);
        store.append(b, a, "new thread", None).unwrap();

        // A restart must leave the new conversation alone.
        assert_eq!(graph.resume_pending_purges().unwrap(), 0);
        let thread: Vec<String> = store
            .history(a, b)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(thread, vec!["new thread"]);
    }
}
