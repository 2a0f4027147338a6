//! Durable slot for the current credential
//!
//! Holds at most one credential in memory and mirrors its raw value to a
//! single file so a session survives process restarts. File writes use
//! temp-file + rename to prevent corruption on crash, with 0600 permissions
//! since the file holds a bearer token. A tokio Mutex serializes writes from
//! login, logout and renewal.
//!
//! The store has no timer or network side effects. Whoever calls `set` or
//! `clear` is responsible for re-arming or disarming the expiry scheduler.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credential::Credential;
use crate::error::{Error, Result};

/// Where the credential is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A single file holding the raw credential string
    File(PathBuf),
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Thread-safe holder of the current credential.
pub struct TokenStore {
    slot: Slot,
    state: Mutex<Option<Credential>>,
}

impl TokenStore {
    /// Open the store, resuming any credential persisted in the slot.
    ///
    /// A missing or empty file means no session; it is not created until the
    /// first `set`.
    pub async fn open(slot: Slot) -> Result<Self> {
        let current = match &slot {
            Slot::File(path) => read_slot(path).await?,
            Slot::Memory => None,
        };
        Ok(Self {
            slot,
            state: Mutex::new(current),
        })
    }

    /// A store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            slot: Slot::Memory,
            state: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Clone of the current credential.
    pub async fn get(&self) -> Option<Credential> {
        self.state.lock().await.clone()
    }

    /// Replace the current credential and persist it.
    ///
    /// The in-memory value is replaced before persisting, so a failed write
    /// still leaves the credential usable for requests in this process.
    pub async fn set(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        let expires_at = credential.expires_at();
        *state = Some(credential);
        debug!(?expires_at, "credential stored");
        if let (Slot::File(path), Some(current)) = (&self.slot, state.as_ref()) {
            write_atomic(path, current.raw()).await?;
        }
        Ok(())
    }

    /// Drop the current credential and remove the persisted value.
    ///
    /// Idempotent: clearing an empty store is not an error.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let had_credential = state.take().is_some();
        if let Slot::File(path) = &self.slot {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(format!("removing credential slot: {e}"))),
            }
        }
        if had_credential {
            debug!("credential cleared");
        }
        Ok(())
    }
}

async fn read_slot(path: &Path) -> Result<Option<Credential>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no persisted credential");
            return Ok(None);
        }
        Err(e) => return Err(Error::Io(format!("reading credential slot: {e}"))),
    };
    let raw = contents.trim();
    if raw.is_empty() {
        info!(path = %path.display(), "persisted credential slot is empty");
        return Ok(None);
    }
    let credential = Credential::parse(raw);
    info!(
        path = %path.display(),
        expires_at = ?credential.expires_at(),
        "resumed persisted credential"
    );
    Ok(Some(credential))
}

/// Write the raw credential atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets 0600 before the rename so the token is never readable
/// by other users, even briefly.
async fn write_atomic(path: &Path, raw: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential slot has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("credential");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, raw.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential slot: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential slot permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential slot: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}
