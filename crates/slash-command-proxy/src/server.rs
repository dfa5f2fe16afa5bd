use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::Bytes;
use slash_command_core::{CommandProxy, InboundRequest, Outcome};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::settings::ServerSettings;

/// Routes the webhook path to the proxy; every other path is a 404.
pub fn router(proxy: Arc<CommandProxy>, settings: &ServerSettings) -> Router {
    Router::new()
        .route(&settings.path, any(handle_command))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
        .with_state(proxy)
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
}

async fn handle_command(
    State(proxy): State<Arc<CommandProxy>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest {
        method,
        headers,
        body,
    };
    match proxy.handle(request).await {
        Ok(Outcome::Health) => StatusCode::OK.into_response(),
        Ok(Outcome::Accepted { reply, .. }) => Json(reply).into_response(),
        Err(err) => (err.status(), err.public_message()).into_response(),
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn wait_for_shutdown() {
    signal::ctrl_c().await.ok();
    info!("shutdown requested");
}
