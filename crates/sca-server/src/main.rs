//! sca - services CA
//!
//! Signs service certificates for authenticated callers and publishes the CA
//! certificate.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use sca_auth::{
    ADMIN_IDENTITY, ADMIN_PASSWORD_FILE, CredentialStore, DEFAULT_SERVICES, SharedSecret,
    ensure_admin_password, load_or_provision_passwords,
};
use sca_pki::DEFAULT_ORGANIZATION;
use sca_server::{
    DEFAULT_HTTP_PORT, DEFAULT_RPC_PORT, ExternalTls, IssuanceServer, ServerConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sca")]
#[command(about = "Services certificate authority")]
#[command(version)]
#[command(group(ArgGroup::new("credentials").required(true).args(["secret", "passwords"])))]
struct Cli {
    /// Domain name the CA certificate is issued for
    #[arg(long = "dn", env = "SCA_DOMAIN")]
    domain: String,

    /// IP address to bind both listeners to
    #[arg(long, env = "SCA_IP")]
    ip: IpAddr,

    /// External IP address named in the CA certificate (defaults to --ip)
    #[arg(long, env = "SCA_EIP")]
    eip: Option<IpAddr>,

    /// Issuance RPC port
    #[arg(long = "grpc", env = "SCA_GRPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    rpc_port: u16,

    /// CA certificate HTTP port
    #[arg(long = "http", env = "SCA_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Secret shared by every caller
    #[arg(long, env = "SCA_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// JSON file mapping identity keys to secrets; created on first start
    #[arg(long, env = "SCA_PASSWORDS")]
    passwords: Option<PathBuf>,

    /// TLS certificate for the HTTP listener
    #[arg(long, env = "SCA_CERT", requires = "key")]
    cert: Option<PathBuf>,

    /// TLS key for the HTTP listener
    #[arg(long, env = "SCA_KEY", requires = "cert")]
    key: Option<PathBuf>,

    /// Working directory holding the CA files
    #[arg(long, env = "SCA_DIR", default_value = ".")]
    dir: PathBuf,

    /// Organization of the CA subject
    #[arg(long, env = "SCA_ORG", default_value = DEFAULT_ORGANIZATION)]
    org: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("sca error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.dir)
        .with_context(|| format!("failed to create {}", cli.dir.display()))?;

    let credentials = credential_store(&cli)?;

    let mut config = ServerConfig::new(cli.domain, cli.ip)
        .with_public_ip(cli.eip.unwrap_or(cli.ip))
        .with_rpc_port(cli.rpc_port)
        .with_http_port(cli.http_port)
        .with_working_dir(cli.dir)
        .with_organization(cli.org);
    if let (Some(cert), Some(key)) = (cli.cert, cli.key) {
        config = config.with_http_tls(ExternalTls::new(cert, key));
    }

    let server = IssuanceServer::new(config, credentials);
    let mut running = server.start().await.context("startup failed")?;

    let fatal = tokio::select! {
        () = shutdown_signal() => None,
        err = running.errors().recv() => err,
    };

    running.stop().await;

    match fatal {
        Some(e) => Err(anyhow::Error::new(e).context("serve failed")),
        None => Ok(()),
    }
}

/// Builds the caller credential store. The administrator password file is
/// ensured in every mode but only registered as a credential with `--passwords`.
fn credential_store(cli: &Cli) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let admin = ensure_admin_password(&cli.dir)?;
    info!(
        path = %cli.dir.join(ADMIN_PASSWORD_FILE).display(),
        "administrator password ready"
    );

    if let Some(secret) = &cli.secret {
        info!("authenticating callers with the shared secret");
        return Ok(Arc::new(SharedSecret::new(secret.clone())));
    }

    let path = cli
        .passwords
        .clone()
        .context("either --secret or --passwords is required")?;
    let mut store = load_or_provision_passwords(&path, &DEFAULT_SERVICES)?;
    store.insert(ADMIN_IDENTITY, admin);
    info!(
        path = %path.display(),
        identities = ?store.identities(),
        "authenticating callers with the password file"
    );
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
