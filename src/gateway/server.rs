//! HTTP server, WebSocket endpoint and background loops
//!
//! Three long-running tasks share one `AppContext`:
//! - discovery keeps the registry in step with tmux
//! - the broadcaster pushes a fresh listing to every connection
//! - axum serves REST, the WebSocket channel and optional static files

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    middleware,
    response::Response,
    routing::{delete, get, post},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use super::{Connection, ServerFrame, api};
use crate::context::AppContext;
use crate::error::Result;
use crate::session::SessionRegistry;

/// Close code sent to WebSocket clients with a bad token
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Build the full router: `/api`, `/ws` and the static fallback
pub fn router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/sessions", get(api::list_sessions).post(api::spawn_session))
        .route("/sessions/grouped", get(api::grouped_sessions))
        .route("/sessions/cleanup", post(api::cleanup_sessions))
        .route("/sessions/:name", delete(api::kill_session))
        .route("/projects", get(api::list_projects))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), api::require_token));

    let mut app = Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler));

    if let Some(dir) = ctx.config.static_dir.as_ref() {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(ctx)
}

/// `GET /ws?token=` upgrade
///
/// Browsers cannot set headers on a WebSocket handshake, so the token
/// arrives as a query parameter. A bad token still upgrades, then closes
/// with 4001 so the client can tell auth failures from network errors.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(query): Query<api::TokenQuery>,
) -> Response {
    let authorized = ctx.credentials.verify(query.token.as_deref()).is_ok();
    ws.on_upgrade(move |socket| async move {
        if authorized {
            run_connection(socket, ctx).await;
        } else {
            reject(socket).await;
        }
    })
}

async fn reject(mut socket: WebSocket) {
    debug!("Rejecting WebSocket with invalid token");
    let frame = CloseFrame {
        code: CLOSE_UNAUTHORIZED,
        reason: "Unauthorized".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Drive one authorized client until it disconnects
async fn run_connection(socket: WebSocket, ctx: AppContext) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut listings = ctx.subscribe_listings();
    let mut conn = Connection::new(ctx.registry.clone(), tx.clone());

    info!("Client connected");
    conn.send_listing().await;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => conn.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            },
            listing = listings.recv() => match listing {
                Ok(frame) => {
                    let _ = tx.send(frame);
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    let released = conn.subscribed_sessions();
    drop(conn);
    send_task.abort();
    info!(subscriptions = released.len(), "Client disconnected");
}

/// Periodically reconcile the registry with tmux
pub fn spawn_discovery(registry: Arc<SessionRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match registry.discover().await {
                Ok(report) if !report.added.is_empty() || !report.removed.is_empty() => {
                    info!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        total = report.total,
                        "Discovery changed sessions"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("Discovery failed, keeping previous sessions: {}", e),
            }
        }
    })
}

/// Periodically push the listing to every connection
pub fn spawn_broadcaster(ctx: AppContext, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let receivers = ctx.broadcast_listing().await;
            debug!(receivers, "Broadcast listing");
        }
    })
}

/// Run discovery, broadcaster and the HTTP server until Ctrl-C
pub async fn serve(ctx: AppContext) -> Result<()> {
    let address = ctx.config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    let discovery = spawn_discovery(ctx.registry.clone(), ctx.config.discovery_interval());
    let broadcaster = spawn_broadcaster(ctx.clone(), ctx.config.broadcast_interval());

    let result = axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    discovery.abort();
    broadcaster.abort();
    info!("Server stopped");
    Ok(result?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
