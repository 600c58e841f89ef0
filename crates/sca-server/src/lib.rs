//! # sca-server
//!
//! Network surface of the services CA.
//!
//! Two listeners share one immutable copy of the CA key material:
//!
//! - the **issuance RPC** listener, always TLS, presents the CA certificate,
//!   optionally verifies client certificates against it, and signs service
//!   certificates for authenticated callers;
//! - the **HTTP** listener publishes the CA certificate, plain or behind
//!   externally provided TLS.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//! use sca_auth::SharedSecret;
//! use sca_server::{IssuanceServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::new("ca.example.com", IpAddr::V4(Ipv4Addr::UNSPECIFIED))
//!         .with_working_dir("/var/lib/sca");
//!     let server = IssuanceServer::new(config, Arc::new(SharedSecret::new("s3cret")));
//!
//!     let running = server.start().await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     running.stop().await;
//! }
//! ```
//!
//! ## Endpoints
//!
//! | Listener | Endpoint | Method | Description |
//! |----------|----------|--------|-------------|
//! | RPC | `/v1/sign` | POST | Sign a service certificate |
//! | HTTP | `/ca.crt` | GET | CA certificate (PEM) |
//! | HTTP | `/health` | GET | Liveness |

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod tls;
pub mod types;

pub use config::{DEFAULT_HTTP_PORT, DEFAULT_RPC_PORT, ExternalTls, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use routes::{CA_CERT_PATH, SIGN_PATH, http_router, rpc_router};
pub use server::{IssuanceServer, RunningServer, ServerStatus};
pub use state::AppState;
pub use tls::{build_server_tls_config, load_external_tls_config};
pub use types::{
    ConnectionInfo, CsrPayload, HealthResponse, SignCertificateRequest, SignCertificateResponse,
};
