use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use tether_types::events::ServerEvent;

/// Push side of one live transport. Two handles are equal when they refer to
/// the same transport, regardless of which user it was announced for.
#[derive(Debug, Clone)]
pub struct PushHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl PushHandle {
    /// A handle and the receiver its transport loop drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for the transport. `false` if the transport is gone.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl PartialEq for PushHandle {
    fn eq(&self, other: &Self) -> bool {
        self.conn_id == other.conn_id
    }
}

impl Eq for PushHandle {}

/// Who can receive a push right now: at most one live handle per user.
///
/// Populated by `user-online`, pruned on disconnect, never persisted. All
/// three operations take the same lock, so they are linearizable.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<PresenceState>>,
}

#[derive(Default)]
struct PresenceState {
    by_user: HashMap<Uuid, PushHandle>,
    /// conn_id -> user the transport is currently registered for
    by_conn: HashMap<Uuid, Uuid>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the push target for `user_id`, replacing any
    /// previous handle (last writer wins).
    pub async fn mark_online(&self, user_id: Uuid, handle: PushHandle) {
        let mut state = self.inner.write().await;

        // A transport serves a single user; re-announcing under another id moves it.
        if let Some(previous_user) = state.by_conn.get(&handle.conn_id).copied() {
            if previous_user != user_id {
                state.by_user.remove(&previous_user);
            }
        }

        if let Some(replaced) = state.by_user.insert(user_id, handle.clone()) {
            if replaced != handle {
                state.by_conn.remove(&replaced.conn_id);
                debug!("{} reconnected, replacing transport {}", user_id, replaced.conn_id);
            }
        }
        state.by_conn.insert(handle.conn_id, user_id);

        info!("{} online via {}", user_id, handle.conn_id);
    }

    /// Drop the entry whose value is `handle`. A handle that was already
    /// replaced or removed is ignored, so duplicate disconnects are harmless.
    pub async fn mark_offline(&self, handle: &PushHandle) {
        let mut state = self.inner.write().await;

        let Some(user_id) = state.by_conn.remove(&handle.conn_id) else {
            return;
        };
        if state.by_user.get(&user_id) == Some(handle) {
            state.by_user.remove(&user_id);
            info!("{} offline ({})", user_id, handle.conn_id);
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<PushHandle> {
        self.inner.read().await.by_user.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.by_user.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    /// Push to `user_id` if present. `false` when offline or the transport is gone;
    /// callers treat both the same.
    pub async fn push_to(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.lookup(user_id).await {
            Some(handle) => handle.push(event),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reconnect_replaces_and_stale_disconnect_is_ignored() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (h1, _rx1) = PushHandle::channel();
        let (h2, _rx2) = PushHandle::channel();

        presence.mark_online(user, h1.clone()).await;
        presence.mark_online(user, h2.clone()).await;
        assert_eq!(presence.lookup(user).await, Some(h2.clone()));

        presence.mark_offline(&h1).await;
        assert_eq!(presence.lookup(user).await, Some(h2.clone()));

        presence.mark_offline(&h2).await;
        presence.mark_offline(&h2).await;
        assert_eq!(presence.lookup(user).await, None);
        assert_eq!(presence.online_count().await, 0);
    }

    #[tokio::test]
    async fn push_reaches_the_registered_transport() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (handle, mut rx) = PushHandle::channel();
        presence.mark_online(user, handle).await;

        assert!(presence.push_to(user, ServerEvent::UserOnline { success: true }).await);
        assert!(matches!(rx.recv().await, Some(ServerEvent::UserOnline { success: true })));
        assert!(!presence.push_to(Uuid::new_v4(), ServerEvent::UserOnline { success: true }).await);
    }

    #[tokio::test]
    async fn closed_transport_reports_failed_push() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (handle, rx) = PushHandle::channel();
        presence.mark_online(user, handle).await;
        drop(rx);

        assert!(presence.is_online(user).await);
        assert!(!presence.push_to(user, ServerEvent::UserOnline { success: true }).await);
    }

    #[tokio::test]
    async fn transport_moves_between_users() {
        let presence = PresenceRegistry::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let (handle, _rx) = PushHandle::channel();

        presence.mark_online(first, handle.clone()).await;
        presence.mark_online(second, handle.clone()).await;

        assert!(!presence.is_online(first).await);
        assert_eq!(presence.lookup(second).await, Some(handle));
    }
}
