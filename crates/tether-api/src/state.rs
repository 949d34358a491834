use std::sync::Arc;

use tether_db::{ConnectionGraph, Database, FeedAuthorizer, MessageStore};
use tether_gateway::{MessageRouter, PresenceRegistry};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub graph: ConnectionGraph,
    pub messages: MessageStore,
    pub feed: FeedAuthorizer,
    pub router: MessageRouter,
    pub presence: PresenceRegistry,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, presence: PresenceRegistry, jwt_secret: String) -> Self {
        let graph = ConnectionGraph::new(db.clone());
        Self {
            messages: MessageStore::new(db.clone()),
            feed: FeedAuthorizer::new(db.clone(), graph.clone()),
            router: MessageRouter::new(db.clone(), presence.clone()),
            graph,
            presence,
            db,
            jwt_secret,
        }
    }
}
