//! On-disk CA key material.

use std::fs;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::ca::{CaKeyMaterial, MaterialOrigin};
use crate::error::{Error, Result};

/// File name of the PEM CA certificate inside the working directory.
pub const CA_CERT_FILE: &str = "ca.crt";

/// File name of the PEM PKCS#8 CA key inside the working directory.
pub const CA_KEY_FILE: &str = "ca.key";

/// Loads the CA key material from a working directory, creating it on first run.
#[derive(Debug, Clone)]
pub struct KeyMaterialStore {
    dir: PathBuf,
}

impl KeyMaterialStore {
    /// Creates a store rooted at `dir`. The directory is not touched until
    /// [`load_or_generate`](Self::load_or_generate) runs.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Working directory of this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the CA certificate file.
    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    /// Path of the CA private key file.
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.dir.join(CA_KEY_FILE)
    }

    /// Returns the persisted CA material, or generates and persists it.
    ///
    /// An existing pair is never overwritten: if both files exist but cannot
    /// be read or parsed the error is returned. If only one of them exists it
    /// is replaced by a fresh pair. Persisting fresh material is best effort;
    /// a write failure is logged and reported through
    /// [`MaterialOrigin::GeneratedUnpersisted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`], [`Error::Parse`] or [`Error::KeyMismatch`] for an
    /// unusable existing pair, and [`Error::Generation`] if new material
    /// cannot be created.
    pub fn load_or_generate(
        &self,
        domain: &str,
        public_ip: IpAddr,
        organization: &str,
    ) -> Result<CaKeyMaterial> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();

        match (cert_path.exists(), key_path.exists()) {
            (true, true) => return self.load(domain, public_ip),
            (true, false) => warn!(
                path = %cert_path.display(),
                "CA certificate without a key; generating new CA material"
            ),
            (false, true) => warn!(
                path = %key_path.display(),
                "CA key without a certificate; generating new CA material"
            ),
            (false, false) => {}
        }

        let material = CaKeyMaterial::generate(domain, public_ip, organization)?;
        match self.persist(&material) {
            Ok(()) => {
                info!(dir = %self.dir.display(), "persisted new CA material");
                Ok(material)
            }
            Err(e) => {
                warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "failed to persist CA material; it will only live for this run"
                );
                Ok(material.with_origin(MaterialOrigin::GeneratedUnpersisted(e.to_string())))
            }
        }
    }

    fn load(&self, domain: &str, public_ip: IpAddr) -> Result<CaKeyMaterial> {
        let cert_pem = read(&self.cert_path())?;
        let key_pem = read(&self.key_path())?;
        let material = CaKeyMaterial::from_pem(&cert_pem, &key_pem)?;

        let cert = material.certificate();
        if !cert.covers_domain(domain) {
            warn!(domain, "loaded CA certificate does not name the configured domain");
        }
        if !cert.covers_ip(public_ip) {
            warn!(%public_ip, "loaded CA certificate does not name the configured public IP");
        }

        info!(
            dir = %self.dir.display(),
            not_after = %cert.not_after(),
            "loaded CA material"
        );
        Ok(material)
    }

    /// The key is written first and removed again if the certificate cannot
    /// be written, so `ca.crt` never exists without its key.
    fn persist(&self, material: &CaKeyMaterial) -> io::Result<()> {
        let key_path = self.key_path();
        write_private(&key_path, material.private_key().pem().as_bytes())?;

        if let Err(e) = fs::write(self.cert_path(), material.certificate().pem()) {
            if let Err(remove) = fs::remove_file(&key_path) {
                warn!(path = %key_path.display(), error = %remove, "failed to remove CA key");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Writes `data` to a file only the owner can read. New files are created
/// with mode 0600; an existing file is restricted before it is rewritten.
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(data)?;
    file.sync_all()
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
