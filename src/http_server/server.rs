//! # HTTP Server
//!
//! Combines the user and health routers, applies CORS and per-request
//! logging, and serves until the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use uuid::Uuid;

use super::config::HttpServerConfig;
use super::observability_routes::health_routes;
use super::user_routes::{user_routes, UsersState};
use crate::observability::{log_event_with_fields, Event, Timer};

/// Response header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP server for the user API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server over shared user state
    pub fn new(config: HttpServerConfig, state: Arc<UsersState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, state: Arc<UsersState>) -> Router {
        Router::new()
            .merge(health_routes())
            .merge(user_routes(state))
            .layer(middleware::from_fn(log_request))
            .layer(config.cors_layer())
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?.to_string();
        log_event_with_fields(Event::Serving, &[("addr", &local)]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Log one line per finished request and echo its id back to the client
async fn log_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let timer = Timer::new();

    let mut response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    log_event_with_fields(
        Event::RequestComplete,
        &[
            ("request_id", &request_id),
            ("method", &method),
            ("path", &path),
            ("status", &status),
            ("elapsed_ms", &timer.elapsed_ms()),
        ],
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
