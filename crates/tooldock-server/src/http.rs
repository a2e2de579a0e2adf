use crate::dispatcher::Dispatcher;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tooldock_core::{ErrorPayload, Response, ToolDockResult};
use tracing::{info, warn};

/// Default path of the request endpoint.
pub const DEFAULT_RPC_PATH: &str = "/rpc";

/// Shared state of the HTTP endpoint.
pub struct HttpState {
    /// Shared by every request.
    pub dispatcher: Arc<Dispatcher>,
    permits: Semaphore,
}

/// The HTTP surface of a dispatcher.
pub struct HttpServer;

impl HttpServer {
    /// Build the router: `POST <path>` takes one request envelope per body,
    /// `GET /health` reports liveness.
    pub fn build(dispatcher: Arc<Dispatcher>, path: &str, max_in_flight: usize) -> Router {
        let state = Arc::new(HttpState {
            dispatcher,
            permits: Semaphore::new(max_in_flight.max(1)),
        });

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Router::new()
            .route(&path, post(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }

    /// Bind `addr` and serve until ctrl-c.
    pub async fn serve(
        dispatcher: Arc<Dispatcher>,
        addr: &str,
        path: &str,
        max_in_flight: usize,
    ) -> ToolDockResult<()> {
        let name = dispatcher.name().to_string();
        let app = Self::build(dispatcher, path, max_in_flight);
        let listener = TcpListener::bind(addr).await?;
        info!(server = %name, addr = %listener.local_addr()?, path, "Serving over HTTP");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!(server = %name, "HTTP server stopped");
        Ok(())
    }
}

async fn rpc_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> impl IntoResponse {
    let Ok(_permit) = state.permits.acquire().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Response::error("", ErrorPayload::internal())),
        );
    };
    // Malformed bodies are answered in-protocol, not with a 4xx.
    let response = state.dispatcher.handle_bytes(&body).await;
    (StatusCode::OK, Json(response))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": state.dispatcher.name()}))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tooldock_registry::Registry;
    use tower::ServiceExt;

    fn app() -> Router {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Registry::new()), "unit"));
        HttpServer::build(dispatcher, DEFAULT_RPC_PATH, 4)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = app()
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "unit");
    }

    #[tokio::test]
    async fn test_garbage_body_gets_protocol_error() {
        let resp = app()
            .oneshot(
                HttpRequest::post(DEFAULT_RPC_PATH)
                    .body(Body::from("{{{"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["payload"]["kind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_non_utf8_body_gets_protocol_error() {
        let resp = app()
            .oneshot(
                HttpRequest::post(DEFAULT_RPC_PATH)
                    .body(Body::from(vec![0xff, 0xfe]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["id"], "");
        assert_eq!(body["payload"]["kind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_get_on_rpc_path_not_allowed() {
        let resp = app()
            .oneshot(HttpRequest::get(DEFAULT_RPC_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
