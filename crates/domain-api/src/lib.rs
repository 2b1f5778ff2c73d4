//! Plain-text status page: one line per live node, whatever the request.

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use domain_services::{Node, SharedRegistry};

#[derive(Clone)]
pub struct StatusState {
    pub registry: SharedRegistry,
}

/// Render the node list. The body grows with the registry; there is no
/// fixed-size buffer to outgrow.
pub fn render_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> String {
    let mut body = String::new();
    for node in nodes {
        let addr = node.active_address();
        body.push_str(&format!(
            "{} on {}:{}\n",
            node.node_type.name(),
            addr.ip(),
            addr.port()
        ));
    }
    body
}

async fn handle_any(State(state): State<StatusState>) -> impl IntoResponse {
    let body = render_nodes(&state.registry.snapshot());
    ([(header::CONTENT_TYPE, "text/plain")], body)
}

/// Every path and method lands on the same handler.
pub fn router(state: StatusState) -> Router {
    Router::new()
        .fallback(handle_any)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status page on an already bound listener until `shutdown`
/// resolves.
pub async fn serve_on(
    listener: TcpListener,
    state: StatusState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "status page listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("status page stopped");
    Ok(())
}

pub async fn serve(
    state: StatusState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    serve_on(listener, state, shutdown).await
}
