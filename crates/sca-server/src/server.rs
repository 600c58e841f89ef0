//! Issuance server lifecycle and connection handling.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use sca_auth::{Authenticator, CredentialStore};
use sca_pki::{CaKeyMaterial, KeyMaterialStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::{http_router, rpc_router};
use crate::state::AppState;
use crate::tls::{build_server_tls_config, load_external_tls_config, peer_certificate};
use crate::types::ConnectionInfo;

/// Lifecycle state of the issuance server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Not running.
    Stopped,
    /// Loading key material and binding listeners.
    Starting,
    /// Accepting connections.
    Listening,
}

/// The services CA: issuance RPC listener plus CA certificate HTTP listener.
pub struct IssuanceServer {
    config: ServerConfig,
    credentials: Arc<dyn CredentialStore>,
    status: Arc<watch::Sender<ServerStatus>>,
    runs: Arc<AtomicU64>,
}

impl IssuanceServer {
    /// Creates a stopped server.
    pub fn new(config: ServerConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Self {
            config,
            credentials,
            status: Arc::new(status),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    /// Subscribes to lifecycle changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    /// Loads or creates the CA material, binds both listeners and starts serving.
    ///
    /// Startup either fully succeeds or leaves the server stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid configuration or a
    /// server that is already running, [`ServerError::Pki`] for unusable key
    /// material, [`ServerError::Tls`] for TLS setup failures and
    /// [`ServerError::BindFailed`] if a listener cannot bind.
    pub async fn start(&self) -> ServerResult<RunningServer> {
        self.config.validate()?;

        let mut run = 0;
        let claimed = self.status.send_if_modified(|status| {
            if *status != ServerStatus::Stopped {
                return false;
            }
            *status = ServerStatus::Starting;
            run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            true
        });
        if !claimed {
            return Err(ServerError::Config("server is already running".into()));
        }

        match self.start_inner(run).await {
            Ok(running) => {
                // A listener that already failed has moved the status to Stopped.
                self.status.send_if_modified(|status| {
                    let starting = *status == ServerStatus::Starting;
                    if starting {
                        *status = ServerStatus::Listening;
                    }
                    starting
                });
                info!(
                    rpc = %running.rpc_addr,
                    http = %running.http_addr,
                    domain = %self.config.domain,
                    "services CA listening"
                );
                Ok(running)
            }
            Err(e) => {
                self.status.send_replace(ServerStatus::Stopped);
                Err(e)
            }
        }
    }

    async fn start_inner(&self, run: u64) -> ServerResult<RunningServer> {
        let config = &self.config;

        tokio::fs::create_dir_all(&config.working_dir).await?;
        let store = KeyMaterialStore::new(&config.working_dir);
        let ca = Arc::new(store.load_or_generate(
            &config.domain,
            config.public_ip,
            &config.organization,
        )?);
        info!(
            origin = ?ca.origin(),
            not_after = %ca.certificate().not_after(),
            "CA material ready"
        );

        let rpc_tls = TlsAcceptor::from(build_server_tls_config(&ca)?);
        let http_tls = config
            .http_tls
            .as_ref()
            .map(|tls| load_external_tls_config(&tls.cert_path, &tls.key_path))
            .transpose()?
            .map(TlsAcceptor::from);

        let rpc_listener = bind(config.rpc_addr()).await?;
        let http_listener = bind(config.http_addr()).await?;
        let rpc_addr = local_addr(&rpc_listener, config.rpc_addr())?;
        let http_addr = local_addr(&http_listener, config.http_addr())?;

        let state = Arc::new(AppState::new(
            Arc::clone(&ca),
            Authenticator::new(Arc::clone(&self.credentials)),
            store.cert_path(),
        ));

        let (shutdown, _) = watch::channel(false);
        let control = RunControl {
            run,
            runs: Arc::clone(&self.runs),
            status: Arc::clone(&self.status),
            shutdown: Arc::new(shutdown),
        };
        let (errors_tx, errors_rx) = mpsc::channel(4);

        let tasks = vec![
            tokio::spawn(accept_loop(
                "rpc",
                rpc_listener,
                rpc_router(Arc::clone(&state)),
                Some(rpc_tls),
                control.clone(),
                errors_tx.clone(),
            )),
            tokio::spawn(accept_loop(
                "http",
                http_listener,
                http_router(state),
                http_tls,
                control.clone(),
                errors_tx,
            )),
        ];

        Ok(RunningServer {
            rpc_addr,
            http_addr,
            ca,
            control,
            tasks,
            errors_rx,
        })
    }
}

impl std::fmt::Debug for IssuanceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceServer")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Shutdown trigger and status slot of one started instance.
#[derive(Clone)]
struct RunControl {
    run: u64,
    runs: Arc<AtomicU64>,
    status: Arc<watch::Sender<ServerStatus>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RunControl {
    /// Signals every accept loop of this run and marks it stopped. The status
    /// is left alone once a later run has claimed it.
    fn shut_down(&self) {
        self.shutdown.send_replace(true);
        self.status.send_if_modified(|status| {
            let owned = self.runs.load(Ordering::SeqCst) == self.run;
            let changed = owned && *status != ServerStatus::Stopped;
            if changed {
                *status = ServerStatus::Stopped;
            }
            changed
        });
    }
}

/// Handle to a started server.
///
/// Dropping the handle signals both listeners to stop without waiting for
/// them; [`stop`](Self::stop) also waits until the sockets are released.
pub struct RunningServer {
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
    ca: Arc<CaKeyMaterial>,
    control: RunControl,
    tasks: Vec<JoinHandle<()>>,
    errors_rx: mpsc::Receiver<ServerError>,
}

impl RunningServer {
    /// Bound address of the RPC listener.
    #[must_use]
    pub const fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Bound address of the HTTP listener.
    #[must_use]
    pub const fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// The CA material the server signs with.
    #[must_use]
    pub fn ca(&self) -> &CaKeyMaterial {
        &self.ca
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        *self.control.status.borrow()
    }

    /// Fatal serve errors. A received error means a listener failed and both
    /// listeners have been told to stop.
    pub fn errors(&mut self) -> &mut mpsc::Receiver<ServerError> {
        &mut self.errors_rx
    }

    /// Stops accepting connections and releases both sockets.
    ///
    /// Connections already accepted are left to finish on their own.
    pub async fn stop(mut self) {
        info!("stopping services CA");
        self.control.shutdown.send_replace(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task ended abnormally");
            }
        }
        self.control.shut_down();
        info!("services CA stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.control.shut_down();
    }
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("rpc_addr", &self.rpc_addr)
            .field("http_addr", &self.http_addr)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::BindFailed(addr, e))
}

fn local_addr(listener: &TcpListener, requested: SocketAddr) -> ServerResult<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| ServerError::BindFailed(requested, e))
}

/// Source of inbound connections for an accept loop.
trait ConnectionSource: Send + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl ConnectionSource for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Accepts connections until shutdown is signalled or accepting fails fatally.
/// A fatal error shuts down the whole run, not only this listener.
async fn accept_loop<S: ConnectionSource>(
    name: &'static str,
    source: S,
    router: Router,
    tls: Option<TlsAcceptor>,
    control: RunControl,
    errors: mpsc::Sender<ServerError>,
) {
    let mut shutdown = control.shutdown.subscribe();
    loop {
        if *shutdown.borrow_and_update() {
            debug!(listener = name, "listener shutting down");
            break;
        }
        tokio::select! {
            accept = source.accept() => {
                match accept {
                    Ok((stream, remote_addr)) => {
                        let router = router.clone();
                        let tls = tls.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, remote_addr, router, tls).await;
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        debug!(listener = name, error = %e, "transient accept error");
                    }
                    Err(e) => {
                        error!(listener = name, error = %e, "accept failed; stopping services CA");
                        control.shut_down();
                        let _ = errors.send(ServerError::Io(e)).await;
                        break;
                    }
                }
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    debug!(listener = name, "listener shutting down");
                    break;
                }
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    router: Router,
    tls: Option<TlsAcceptor>,
) {
    match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => {
                let connection = ConnectionInfo {
                    remote_addr,
                    peer_certificate: peer_certificate(stream.get_ref().1),
                };
                serve_connection(stream, connection, router).await;
            }
            Err(e) => debug!(remote = %remote_addr, error = %e, "TLS handshake failed"),
        },
        None => {
            let connection = ConnectionInfo {
                remote_addr,
                peer_certificate: None,
            };
            serve_connection(stream, connection, router).await;
        }
    }
}

async fn serve_connection<I>(io: I, connection: ConnectionInfo, router: Router)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let remote_addr = connection.remote_addr;
    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(connection.clone());
        router.clone().oneshot(request)
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        debug!(remote = %remote_addr, error = %e, "connection error");
    }
}
