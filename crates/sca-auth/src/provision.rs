//! Password files in the working directory.
//!
//! `admin-psswd` holds the administrator password and `passwords.json` maps
//! service identity keys to their secrets. Both are created on first start and
//! only read afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;

use crate::credentials::StaticCredentials;
use crate::error::{Error, Result};

/// File holding the administrator password.
pub const ADMIN_PASSWORD_FILE: &str = "admin-psswd";

/// Default name of the service password file.
pub const PASSWORDS_FILE: &str = "passwords.json";

/// Identity key the administrator password is registered under.
pub const ADMIN_IDENTITY: &str = "admin";

/// Services provisioned when no password file exists yet.
pub const DEFAULT_SERVICES: [&str; 4] = ["discovery", "accounts", "tokens", "apps"];

/// Length of generated passwords.
pub const PASSWORD_LENGTH: usize = 16;

/// Generates a random alphanumeric password of `len` characters.
#[must_use]
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Returns the administrator password stored in `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read or written.
pub fn ensure_admin_password(dir: &Path) -> Result<String> {
    let path = dir.join(ADMIN_PASSWORD_FILE);
    if path.exists() {
        let content = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
        return Ok(content.trim().to_string());
    }

    let password = generate_password(PASSWORD_LENGTH);
    write_private(&path, password.as_bytes())?;
    info!(path = %path.display(), "generated administrator password");
    Ok(password)
}

/// Loads service passwords from `path`, provisioning `services` if it is absent.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read or written, and
/// [`Error::Serialization`] if it is not a JSON object of strings.
pub fn load_or_provision_passwords(path: &Path, services: &[&str]) -> Result<StaticCredentials> {
    let passwords: BTreeMap<String, String> = if path.exists() {
        let data = fs::read(path).map_err(|source| io_error(path, source))?;
        serde_json::from_slice(&data).map_err(|source| Error::Serialization {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        let passwords: BTreeMap<String, String> = services
            .iter()
            .map(|name| ((*name).to_string(), generate_password(PASSWORD_LENGTH)))
            .collect();
        let data = serde_json::to_vec_pretty(&passwords).map_err(|source| Error::Serialization {
            path: path.to_path_buf(),
            source,
        })?;
        write_private(path, &data)?;
        info!(path = %path.display(), services = passwords.len(), "provisioned service passwords");
        passwords
    };

    Ok(passwords
        .into_iter()
        .fold(StaticCredentials::new(), |store, (key, secret)| {
            store.with(key, secret)
        }))
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|source| io_error(path, source))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: PathBuf::from(path),
        source,
    }
}
