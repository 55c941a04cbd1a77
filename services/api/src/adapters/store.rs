//! services/api/src/adapters/store.rs
//!
//! This module contains the adapter for local persistence. It implements
//! the `ProfileStore` port from the `core` crate as a small key-value store
//! with one file per key under a data directory.
//!
//! There is no schema versioning: the profile record decodes with serde
//! defaults for any field added after it was written (fails open, not
//! closed).

use astro_guide_core::{
    domain::Profile,
    ports::{PortError, PortResult, ProfileStore},
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const PROFILE_FILE: &str = "profile.json";
const CREDENTIAL_FILE: &str = "credential";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ProfileStore` port on the local
/// filesystem.
#[derive(Clone)]
pub struct JsonFileProfileStore {
    dir: PathBuf,
}

impl JsonFileProfileStore {
    /// Creates a new `JsonFileProfileStore` rooted at `dir`. The directory
    /// is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_key(&self, file: &str) -> PortResult<Option<String>> {
        match tokio::fs::read_to_string(self.dir.join(file)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to read {file}: {e}"
            ))),
        }
    }

    async fn write_key(&self, file: &str, contents: &str) -> PortResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to create data dir: {e}")))?;
        tokio::fs::write(self.dir.join(file), contents)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write {file}: {e}")))
    }

    async fn delete_key(&self, file: &str) -> PortResult<()> {
        match tokio::fs::remove_file(self.dir.join(file)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to delete {file}: {e}"
            ))),
        }
    }

    /// The directory this store writes under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn load_profile(&self) -> PortResult<Option<Profile>> {
        let Some(contents) = self.read_key(PROFILE_FILE).await? else {
            return Ok(None);
        };
        let profile = serde_json::from_str(&contents).map_err(|e| {
            PortError::Unexpected(format!("Stored profile record is unreadable: {e}"))
        })?;
        Ok(Some(profile))
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        let contents = serde_json::to_string_pretty(profile)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.write_key(PROFILE_FILE, &contents).await
    }

    async fn delete_profile(&self) -> PortResult<()> {
        self.delete_key(PROFILE_FILE).await
    }

    async fn load_credential(&self) -> PortResult<Option<String>> {
        Ok(self
            .read_key(CREDENTIAL_FILE)
            .await?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    async fn save_credential(&self, credential: &str) -> PortResult<()> {
        self.write_key(CREDENTIAL_FILE, credential).await
    }

    async fn delete_credential(&self) -> PortResult<()> {
        self.delete_key(CREDENTIAL_FILE).await
    }
}

//=========================================================================================
// Tests
//=========================================================================================
