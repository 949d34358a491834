use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tether_db::{ConnectionGraph, Database, MessageStore};
use tether_types::events::ServerEvent;
use tether_types::models::{
    Attachment, MAX_CONTENT_CHARS, MessageView, NotificationKind, Preview,
};
use tether_types::{Error, Result};

use crate::presence::PresenceRegistry;

/// Run a store call off the async runtime.
pub async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        Error::Persistence(e.to_string())
    })?
}

/// A message as submitted by a client, before authorization.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub post_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
}

/// Authorize, persist, then notify. Holds no state of its own.
#[derive(Clone)]
pub struct MessageRouter {
    db: Arc<Database>,
    graph: ConnectionGraph,
    store: MessageStore,
    presence: PresenceRegistry,
}

fn validate(content: &str, attachment: Option<Attachment>) -> Result<()> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::InvalidArgument(format!(
            "message content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    if content.is_empty() && attachment.is_none() {
        return Err(Error::InvalidArgument(
            "message needs content or an attachment".into(),
        ));
    }
    Ok(())
}

impl MessageRouter {
    pub fn new(db: Arc<Database>, presence: PresenceRegistry) -> Self {
        let graph = ConnectionGraph::new(db.clone());
        let store = MessageStore::new(db.clone());
        Self {
            db,
            graph,
            store,
            presence,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Send a message on behalf of the authenticated `principal`.
    ///
    /// Succeeds once the message is persisted. The push to the receiver is
    /// best-effort: offline receivers and dead transports are not reported.
    pub async fn send(&self, principal: Uuid, outgoing: OutgoingMessage) -> Result<MessageView> {
        let OutgoingMessage {
            sender_id,
            receiver_id,
            content,
            post_id,
            event_id,
        } = outgoing;

        if principal != sender_id {
            return Err(Error::Unauthenticated(
                "credential does not match the sender".into(),
            ));
        }

        // The single authorization gate for messaging; runs before any payload checks.
        let graph = self.graph.clone();
        if !run_blocking(move || graph.are_connected(sender_id, receiver_id)).await? {
            return Err(Error::NotConnected);
        }

        let attachment = Attachment::from_refs(post_id, event_id)?;
        validate(&content, attachment)?;

        let store = self.store.clone();
        let db = self.db.clone();
        let message = run_blocking(move || {
            let message = store.append(sender_id, receiver_id, &content, attachment)?;
            if let Err(e) = db.insert_notification(receiver_id, NotificationKind::Message, message.id) {
                warn!("Failed to record message notification for {}: {}", receiver_id, e);
            }
            Ok(message)
        })
        .await?;

        info!("Message {} stored {} -> {}", message.id, sender_id, receiver_id);

        let store = self.store.clone();
        let fallback = message.clone();
        let view = match run_blocking(move || store.enrich_with_previews(vec![message])).await {
            Ok(mut views) => views.pop().unwrap_or(MessageView {
                message: fallback,
                preview: Preview::None,
            }),
            Err(e) => {
                warn!("Preview enrichment failed for message {}: {}", fallback.id, e);
                MessageView {
                    message: fallback,
                    preview: Preview::None,
                }
            }
        };

        match self.presence.lookup(receiver_id).await {
            Some(handle) => {
                if !handle.push(ServerEvent::NewMessage {
                    message: view.clone(),
                }) {
                    debug!("Push of message {} to {} dropped: transport closed", view.message.id, receiver_id);
                }
            }
            None => debug!("{} offline, message {} not pushed", receiver_id, view.message.id),
        }

        Ok(view)
    }

    /// Thread between `user_id` and `peer_id`, oldest first, with previews.
    /// Empty when the pair is not connected.
    pub async fn history(&self, user_id: Uuid, peer_id: Uuid) -> Result<Vec<MessageView>> {
        let store = self.store.clone();
        run_blocking(move || {
            let messages = store.history(user_id, peer_id)?;
            store.enrich_with_previews(messages)
        })
        .await
    }
}
