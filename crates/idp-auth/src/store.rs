//! Credential storage backends
//!
//! Persists one [`CredentialRecord`] per username behind the pluggable
//! [`CredentialStore`] trait. The file backend keeps a JSON map on disk and
//! writes it atomically (temp file + rename) so a crash mid-write never
//! leaves a corrupt or half-written store — a record is either fully
//! persisted or absent. A tokio Mutex serializes writes, which also gives
//! the per-username read-modify-write atomicity refresh needs.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use provider::{AuthError, CredentialRecord, Result};

/// Durable per-user credential persistence.
///
/// Implementations must guarantee that concurrent `put`s for different
/// usernames never corrupt or lose each other, and that a `put` observed by
/// a later `get` round-trips every record field losslessly. Uses
/// `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// Fetch the record for `username`, if any.
    fn get<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CredentialRecord>>> + Send + 'a>>;

    /// Insert or replace the record keyed by its username.
    ///
    /// Fails with `InvalidRecord` for a partially populated record and `Io`
    /// when the storage medium fails; neither is ever silently dropped.
    fn put<'a>(
        &'a self,
        record: CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove the record for `username`. Fails with `NotFound` when absent.
    fn delete<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Reject writes that would violate the fully-populated-or-absent invariant.
fn check_complete(record: &CredentialRecord) -> Result<()> {
    if record.is_complete() {
        Ok(())
    } else {
        Err(AuthError::InvalidRecord(record.username.clone()))
    }
}

/// File-backed credential store.
///
/// The JSON file is the single source of truth; the in-memory map is a
/// cache rebuilt at load time. Reads acquire the lock briefly to clone, so
/// they don't block behind a slow disk write.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, CredentialRecord>>,
}

impl FileStore {
    /// Load records from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// users).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AuthError::Io(format!("reading credential file: {e}")))?;
            let records: HashMap<String, CredentialRecord> = serde_json::from_str(&contents)
                .map_err(|e| AuthError::Io(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), users = records.len(), "loaded credential store");
            records
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let records = HashMap::new();
            // Create the empty file so future loads don't need the cold-start path
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }
}

impl CredentialStore for FileStore {
    fn get<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CredentialRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(username).cloned())
        })
    }

    fn put<'a>(
        &'a self,
        record: CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            check_complete(&record)?;
            let mut state = self.state.lock().await;
            let username = record.username.clone();
            state.insert(username.clone(), record);
            write_atomic(&self.path, &state).await?;
            debug!(username, "stored credential");
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(username).is_none() {
                return Err(AuthError::NotFound(username.to_string()));
            }
            write_atomic(&self.path, &state).await?;
            debug!(username, "deleted credential");
            Ok(())
        })
    }
}

/// In-memory credential store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CredentialRecord>>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(username).cloned())
        })
    }

    fn put<'a>(
        &'a self,
        record: CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            check_complete(&record)?;
            let mut state = self.state.lock().await;
            state.insert(record.username.clone(), record);
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(username).is_none() {
                return Err(AuthError::NotFound(username.to_string()));
            }
            Ok(())
        })
    }
}

/// Write the record map to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains live tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, CredentialRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| AuthError::Io(format!("serializing credential store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| AuthError::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| AuthError::Io(format!("writing temp credential file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| AuthError::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AuthError::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential store");
    Ok(())
}
