mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tether_api::middleware::{bearer_token, decode_token};
use tether_api::state::{AppState, AppStateInner};
use tether_db::Database;
use tether_gateway::PresenceRegistry;
use tether_gateway::connection;
use tether_gateway::router::run_blocking;

use crate::config::ServerConfig;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let state: AppState = Arc::new(AppStateInner::new(
        db,
        PresenceRegistry::new(),
        config.jwt_secret.clone(),
    ));

    // Finish purges interrupted by a crash before accepting traffic
    let graph = state.graph.clone();
    let resumed = run_blocking(move || graph.resume_pending_purges()).await?;
    if resumed > 0 {
        info!("Resumed {} pending message purge(s)", resumed);
    }

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(tether_api::router(state))
        .merge(ws_route)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    info!("Tether server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let Some(origins) = &config.cors_origins else {
        return Ok(CorsLayer::permissive());
    };
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Authenticate at the upgrade so the push loop only ever sees a verified
/// principal. Browsers cannot set headers on WebSocket requests, hence `?token=`.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers));
    let claims = match token.map(|t| decode_token(&state.jwt_secret, t)) {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            warn!("Gateway upgrade rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let router = state.router.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, router, claims.sub))
}
