//! Request handlers for the issuance RPC and the CA certificate responder.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sca_auth::{IDENTITY_KEY_HEADER, IDENTITY_SECRET_HEADER, extract_credential};
use sca_pki::CertificateSigningRequest;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::types::{ConnectionInfo, HealthResponse, SignCertificateRequest, SignCertificateResponse};

/// Largest accepted signing request body.
pub const MAX_SIGN_REQUEST_BYTES: usize = 64 * 1024;

/// Handle POST /v1/sign - authenticate the caller and sign its certificate.
///
/// The body is only parsed once the caller is authenticated.
pub async fn sign_certificate(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ServerResult<Json<SignCertificateResponse>> {
    let (parts, body) = request.into_parts();

    if let Some(connection) = parts.extensions.get::<ConnectionInfo>() {
        match &connection.peer_certificate {
            Some(peer) => debug!(
                remote = %connection.remote_addr,
                peer_subject = peer.subject(),
                "signing call over mutual TLS"
            ),
            None => debug!(remote = %connection.remote_addr, "signing call"),
        }
    }

    let credential = extract_credential(
        header_str(&parts.headers, IDENTITY_KEY_HEADER),
        header_str(&parts.headers, IDENTITY_SECRET_HEADER),
    );
    state.authenticator().authenticate(credential.as_ref())?;

    let bytes = axum::body::to_bytes(body, MAX_SIGN_REQUEST_BYTES)
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("failed to read body: {e}")))?;
    let payload: SignCertificateRequest = serde_json::from_slice(&bytes)
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

    let csr = CertificateSigningRequest::from(payload.csr);
    let issued = state.ca().sign(&csr)?;

    info!(
        identity = credential.as_ref().map(|c| c.identity_key()),
        subject = %csr.subject,
        "issued service certificate"
    );

    Ok(Json(SignCertificateResponse {
        raw_certificate: issued.into_der(),
    }))
}

/// Handle GET /ca.crt - the CA certificate, read from disk on every request.
pub async fn get_ca_certificate(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(state.ca_cert_path()).await {
        Ok(pem) => (StatusCode::OK, [(CONTENT_TYPE, "text/plain")], pem).into_response(),
        Err(e) => ServerError::Internal(format!(
            "failed to read {}: {e}",
            state.ca_cert_path().display()
        ))
        .into_response(),
    }
}

/// Handle GET /health - liveness of the HTTP responder.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
