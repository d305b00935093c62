//! Profile Store
//!
//! Small persisted key-value store for the cached identity token and
//! the user's display name. SQLite-backed so values survive restarts.

use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEY_IDENTITY_TOKEN: &str = "identity_token";
const KEY_USER_NAME: &str = "user_name";

/// Profile store errors.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create profile directory {path:?}: {error}")]
    Io { path: PathBuf, error: String },
}

/// SQLite-backed key-value store for user profile data.
pub struct ProfileStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ProfileStore {
    /// Create or open the profile store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, ProfileError> {
        std::fs::create_dir_all(data_dir).map_err(|e| ProfileError::Io {
            path: data_dir.to_path_buf(),
            error: e.to_string(),
        })?;
        let path = data_dir.join("profile.db");

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profile (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ProfileError> {
        let conn = self.conn.lock().expect("profile store lock poisoned");
        let mut stmt = conn.prepare_cached("SELECT value FROM profile WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), ProfileError> {
        let conn = self.conn.lock().expect("profile store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO profile (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn identity_token(&self) -> Result<Option<String>, ProfileError> {
        self.get(KEY_IDENTITY_TOKEN)
    }

    pub fn set_identity_token(&self, token: &str) -> Result<(), ProfileError> {
        self.set(KEY_IDENTITY_TOKEN, token)
    }

    pub fn user_name(&self) -> Result<Option<String>, ProfileError> {
        self.get(KEY_USER_NAME)
    }

    pub fn set_user_name(&self, name: &str) -> Result<(), ProfileError> {
        self.set(KEY_USER_NAME, name)
    }
}
