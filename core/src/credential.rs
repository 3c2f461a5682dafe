//! Bearer credential and its durable storage.
//!
//! # Design
//! `Credential` wraps the raw token so it cannot be logged by accident: its
//! `Debug` output is redacted and there is no `Display`. The raw value is
//! only reachable through `expose`, which `TodoClient` uses to build the
//! `authorization` header.
//!
//! Persistence is a collaborator behind `CredentialStore`. `FileCredentialStore`
//! keeps the token as plain text in a single file; a missing or blank file
//! means "no credential".

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// Opaque bearer token representing an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token. Keep it out of logs.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for the `authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Credential::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Credential(token)
    }
}

/// Durable storage used to rehydrate a credential at startup.
pub trait CredentialStore: Send {
    fn load(&self) -> Result<Option<Credential>, StoreError>;
    fn save(&self, credential: &Credential) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Stores the token as the sole content of a file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| Credential::new(token)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        // `mode` only applies on creation; tighten an existing file too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(credential.expose().as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process store, handy for hosts without durable storage and for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.slot() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
