//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use sca_pki::DEFAULT_ORGANIZATION;

use crate::error::{ServerError, ServerResult};

/// Default port of the issuance RPC listener.
pub const DEFAULT_RPC_PORT: u16 = 9090;

/// Default port of the CA certificate HTTP listener.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Certificate and key files that put the HTTP responder behind TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTls {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM PKCS#8 private key.
    pub key_path: PathBuf,
}

impl ExternalTls {
    /// Creates an external TLS configuration.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// Static configuration of the services CA, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Domain the CA certificate is issued for.
    pub domain: String,
    /// Address both listeners bind to.
    pub bind_ip: IpAddr,
    /// Address clients reach the service at; named in the CA certificate.
    pub public_ip: IpAddr,
    /// Port of the issuance RPC listener.
    pub rpc_port: u16,
    /// Port of the CA certificate HTTP listener.
    pub http_port: u16,
    /// Directory holding `ca.crt` and `ca.key`.
    pub working_dir: PathBuf,
    /// Organization placed in the CA subject.
    pub organization: String,
    /// TLS for the HTTP listener; plain HTTP when `None`.
    pub http_tls: Option<ExternalTls>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            domain: String::new(),
            bind_ip: localhost,
            public_ip: localhost,
            rpc_port: DEFAULT_RPC_PORT,
            http_port: DEFAULT_HTTP_PORT,
            working_dir: PathBuf::from("."),
            organization: DEFAULT_ORGANIZATION.to_string(),
            http_tls: None,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for `domain` bound to `bind_ip`. The public IP
    /// defaults to the bind IP.
    #[must_use]
    pub fn new(domain: impl Into<String>, bind_ip: IpAddr) -> Self {
        Self {
            domain: domain.into(),
            bind_ip,
            public_ip: bind_ip,
            ..Self::default()
        }
    }

    /// Set the public IP named in the CA certificate.
    #[must_use]
    pub const fn with_public_ip(mut self, public_ip: IpAddr) -> Self {
        self.public_ip = public_ip;
        self
    }

    /// Set the RPC port.
    #[must_use]
    pub const fn with_rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = port;
        self
    }

    /// Set the HTTP port.
    #[must_use]
    pub const fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the organization of the CA subject.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    /// Serve the HTTP responder over TLS with the given files.
    #[must_use]
    pub fn with_http_tls(mut self, tls: ExternalTls) -> Self {
        self.http_tls = Some(tls);
        self
    }

    /// Socket address of the RPC listener.
    #[must_use]
    pub const fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.rpc_port)
    }

    /// Socket address of the HTTP listener.
    #[must_use]
    pub const fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.http_port)
    }

    /// Checks the configuration before startup.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the domain is blank or both
    /// listeners would share a fixed port.
    pub fn validate(&self) -> ServerResult<()> {
        if self.domain.trim().is_empty() {
            return Err(ServerError::Config("domain must not be empty".into()));
        }
        if self.rpc_port != 0 && self.rpc_port == self.http_port {
            return Err(ServerError::Config(format!(
                "RPC and HTTP listeners cannot share port {}",
                self.rpc_port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.rpc_port, 9090);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.organization, DEFAULT_ORGANIZATION);
        assert!(config.http_tls.is_none());
    }

    #[test]
    fn test_public_ip_defaults_to_bind_ip() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let config = ServerConfig::new("svc.example.com", ip);

        assert_eq!(config.public_ip, ip);
        assert_eq!(config.rpc_addr(), SocketAddr::new(ip, 9090));
        assert_eq!(config.http_addr(), SocketAddr::new(ip, 8080));
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new("svc.example.com", IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .with_public_ip(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)))
            .with_rpc_port(9443)
            .with_http_port(8443)
            .with_working_dir("/var/lib/sca")
            .with_organization("Acme")
            .with_http_tls(ExternalTls::new("/tls/http.crt", "/tls/http.key"));

        assert_eq!(config.public_ip, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)));
        assert_eq!(config.rpc_port, 9443);
        assert_eq!(config.http_port, 8443);
        assert_eq!(config.working_dir, PathBuf::from("/var/lib/sca"));
        assert_eq!(config.organization, "Acme");
        assert_eq!(
            config.http_tls,
            Some(ExternalTls::new("/tls/http.crt", "/tls/http.key"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_domain_is_rejected() {
        let config = ServerConfig::new("  ", IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_shared_port_is_rejected() {
        let config = ServerConfig::new("svc", IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_rpc_port(8000)
            .with_http_port(8000);
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));

        let ephemeral = ServerConfig::new("svc", IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_rpc_port(0)
            .with_http_port(0);
        assert!(ephemeral.validate().is_ok());
    }
}
