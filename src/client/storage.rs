//! Optional persistence of the cached user between process runs.
//!
//! Only the public user view is persisted; the session cookie itself lives in
//! the transport's cookie jar.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::model::UserView;

pub trait SessionPersistence: Send + Sync {
    /// The stored user, or `None` if nothing (readable) is stored.
    fn load(&self) -> Option<UserView>;

    /// # Errors
    /// Returns an error if the user cannot be written.
    fn save(&self, user: &UserView) -> Result<()>;

    /// # Errors
    /// Returns an error if the stored user cannot be removed.
    fn clear(&self) -> Result<()>;
}

/// Stores the user as a JSON document on disk.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStore {
    fn load(&self) -> Option<UserView> {
        let raw = fs::read_to_string(&self.path).ok()?;
        // A corrupt file is treated as "no session".
        serde_json::from_str(&raw).ok()
    }

    fn save(&self, user: &UserView) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(user).context("failed to encode session user")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}

/// Process-local persistence, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    user: Mutex<Option<UserView>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(user: UserView) -> Self {
        Self {
            user: Mutex::new(Some(user)),
        }
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load(&self) -> Option<UserView> {
        self.user.lock().clone()
    }

    fn save(&self, user: &UserView) -> Result<()> {
        *self.user.lock() = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.user.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Profile;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn alice() -> UserView {
        UserView {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            profile: Profile::default(),
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }

    #[test]
    fn file_store_save_load_clear() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));
        assert!(store.load().is_none());

        let user = alice();
        store.save(&user)?;
        assert_eq!(store.load(), Some(user));

        store.clear()?;
        assert!(store.load().is_none());
        // clearing twice is fine
        store.clear()?;
        Ok(())
    }

    #[test]
    fn file_store_ignores_corrupt_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");
        fs::write(&path, b"not json")?;
        assert!(FileSessionStore::new(path).load().is_none());
        Ok(())
    }

    #[test]
    fn memory_store() -> Result<()> {
        let store = MemorySessionStore::new();
        assert!(store.load().is_none());
        let user = alice();
        store.save(&user)?;
        assert_eq!(store.load(), Some(user));
        store.clear()?;
        assert!(store.load().is_none());
        Ok(())
    }
}
