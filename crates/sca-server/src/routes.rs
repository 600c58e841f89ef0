//! Route configuration for both listeners.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{get_ca_certificate, health_check, sign_certificate};
use crate::state::AppState;

/// Path of the signing call.
pub const SIGN_PATH: &str = "/v1/sign";

/// Path the CA certificate is published at.
pub const CA_CERT_PATH: &str = "/ca.crt";

/// Router of the TLS-protected issuance listener.
pub fn rpc_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(SIGN_PATH, post(sign_certificate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Router of the CA certificate HTTP listener.
pub fn http_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CA_CERT_PATH, get(get_ca_certificate))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
