//! Flat-file credential store
//!
//! One pretty-printed JSON document per user at `<dir>/<id>.json`. Writes go
//! to a temporary sibling and are renamed into place, so a reader sees either
//! the old or the new record, never a partial one.
//!
//! Email lookups go through an in-memory email to id index, falling back to a
//! scan of every record. Registrations are serialized by a mutex so the
//! uniqueness check and the write happen as one step within this process.

pub mod user;

pub use user::{PublicUser, UserRecord, UserStatus};

use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("failed to encode record {id}: {detail}")]
    Encode { id: String, detail: String },

    #[error("invalid user id: {0:?}")]
    InvalidId(String),

    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),

    #[error("storage probe read back different content")]
    ProbeMismatch,
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Ids become file names, so only a conservative character set is allowed
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Directory-backed user store
#[derive(Debug)]
pub struct UserStore {
    dir: PathBuf,
    email_index: DashMap<String, String>,
    registration: Mutex<()>,
}

impl UserStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            email_index: DashMap::new(),
            registration: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Load a user by id. Unknown or unusable ids yield `None`.
    pub async fn find(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        if !is_valid_id(id) {
            debug!(id = %id, "Lookup with invalid user id");
            return Ok(None);
        }
        read_record(&self.record_path(id)).await
    }

    /// Load a user by exact email match
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let indexed = self.email_index.get(email).map(|entry| entry.value().clone());
        if let Some(id) = indexed {
            match self.find(&id).await? {
                Some(record) if record.email == email => return Ok(Some(record)),
                _ => {
                    self.email_index.remove(email);
                }
            }
        }

        self.scan_for_email(email).await
    }

    async fn scan_for_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            let record = match read_record(&path).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(StoreError::Corrupt { path, detail }) => {
                    warn!(path = %path.display(), error = %detail, "Skipping unreadable user record");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.email_index
                .insert(record.email.clone(), record.id.clone());
            if record.email == email {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// Write a record, replacing any existing one with the same id
    pub async fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        if !is_valid_id(&record.id) {
            return Err(StoreError::InvalidId(record.id.clone()));
        }
        self.ensure_dir().await?;

        let body = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Encode {
            id: record.id.clone(),
            detail: e.to_string(),
        })?;

        let path = self.record_path(&record.id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.id, uuid::Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            return Err(StoreError::io(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(&path, e));
        }

        self.email_index
            .insert(record.email.clone(), record.id.clone());
        debug!(user_id = %record.id, "User record saved");
        Ok(())
    }

    /// Store a new user, failing if the email is already registered
    pub async fn create(&self, record: &UserRecord) -> Result<(), StoreError> {
        let _guard = self.registration.lock().await;

        if self.find_by_email(&record.email).await?.is_some() {
            return Err(StoreError::DuplicateEmail(record.email.clone()));
        }

        self.save(record).await
    }

    /// Number of stored user records
    pub async fn count(&self) -> Result<usize, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            if is_record_file(&entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Write, read back and delete a probe file in the store directory
    pub async fn probe(&self) -> Result<(), StoreError> {
        self.ensure_dir().await?;

        let path = self
            .dir
            .join(format!(".health-probe-{}", uuid::Uuid::new_v4().simple()));
        let expected = chrono::Utc::now().to_rfc3339();

        tokio::fs::write(&path, expected.as_bytes())
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        let read_back = tokio::fs::read_to_string(&path).await;
        let removed = tokio::fs::remove_file(&path).await;

        let read_back = read_back.map_err(|e| StoreError::io(&path, e))?;
        removed.map_err(|e| StoreError::io(&path, e))?;

        if read_back != expected {
            return Err(StoreError::ProbeMismatch);
        }
        Ok(())
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| !name.starts_with('.'))
}

async fn read_record(path: &Path) -> Result<Option<UserRecord>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}
