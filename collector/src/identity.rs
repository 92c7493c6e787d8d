//! Durable storage for the user id, so that a user keeps the same identity across runs.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::IdentityError;

/// The key the user id is stored under.
pub const USER_ID_KEY: &str = "arguxai_user_id";

pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, IdentityError>;
    fn store(&self, user_id: &str) -> Result<(), IdentityError>;
}

/// Keeps a JSON object on disk, with the user id stored under `USER_ID_KEY`.
/// Unrelated keys already present in the file are preserved on write.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>, IdentityError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>, IdentityError> {
        let entries = self.read_entries()?;

        Ok(entries
            .get(USER_ID_KEY)
            .and_then(Value::as_str)
            .map(String::from))
    }

    fn store(&self, user_id: &str) -> Result<(), IdentityError> {
        let mut entries = self.read_entries()?;
        entries.insert(USER_ID_KEY.to_owned(), Value::String(user_id.to_owned()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)?;

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    user_id: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(user_id: &str) -> Self {
        Self {
            user_id: Mutex::new(Some(user_id.to_owned())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<String>, IdentityError> {
        Ok(self
            .user_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn store(&self, user_id: &str) -> Result<(), IdentityError> {
        *self
            .user_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(user_id.to_owned());
        Ok(())
    }
}
