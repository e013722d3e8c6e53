//! kycwatch dev server
//!
//! A small notification provider for local development: websocket fan-out of
//! KYC events per investor key plus the REST endpoints the client's polling
//! fallback reads from.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod routes;
mod state;
mod ws;

pub use state::{AppState, KycHub};

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/kyc/{key}", get(ws::ws_handler))
        // KYC
        .route("/api/investors/{key}/kyc", get(routes::kyc::get_kyc_status))
        .route("/api/investors/{key}/events", post(routes::kyc::publish_event))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until the process ends.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Starting server on {}", addr);
    }
    axum::serve(listener, app(state)).await
}
