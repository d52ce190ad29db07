//! HTTP server configuration and request routing.
//!
//! Provides Axum server setup with the middleware stack and graceful
//! shutdown. Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Response time recording (`X-Response-Time`)
//! 3. Request/response tracing
//! 4. Timeout enforcement
//! 5. Handler execution
//!
//! # Graceful Shutdown
//!
//! The server handles SIGTERM and CTRL+C gracefully: it stops accepting new
//! connections and waits for in-flight requests before returning.

use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    handlers::{self, AppState},
};

/// Creates the Axum router with all routes and middleware.
pub fn create_router(state: AppState, config: &Config) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health::live))
        .route("/health/live", get(handlers::health::live))
        .route("/health/ready", get(handlers::health::ready));

    let api_routes = Router::new()
        .route("/api/v1/notifications", post(handlers::notifications::create))
        .route("/api/v1/notifications/{id}/status", post(handlers::status::update))
        .route("/api/v1/users", post(handlers::users::create));

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(TimeoutLayer::new(config.write_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(record_response_time))
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware injecting an `X-Request-Id` header into all responses.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Middleware reporting handler wall time via `X-Response-Time`.
async fn record_response_time(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(req).await;

    if let Ok(header_value) = format!("{:?}", started.elapsed()).parse() {
        response.headers_mut().insert("X-Response-Time", header_value);
    }

    response
}

/// Starts the HTTP server with graceful shutdown support.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is already in use or the network
/// interface is unavailable.
pub async fn start_server(
    state: AppState,
    config: &Config,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state, config);

    info!("starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("waiting for in-flight requests to complete");
}
