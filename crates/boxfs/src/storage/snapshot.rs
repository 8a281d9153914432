// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::encoding::Digest;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./snapshot_test.rs"]
mod snapshot_test;

/// The manifest schema produced by this release.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Ties an ordered stack of layers to the build step that produced it.
///
/// The base layer comes first in `layers`; later layers apply on top.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub cache_key: CacheKey,
    pub layers: Vec<Digest>,
    pub base_image_ref: String,
    pub architecture: String,
}

impl Snapshot {
    pub fn new(
        cache_key: CacheKey,
        base_image_ref: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            cache_key,
            layers: Vec::new(),
            base_image_ref: base_image_ref.into(),
            architecture: architecture.into(),
        }
    }

    /// Append a layer on top of the current stack.
    pub fn push_layer(&mut self, hash: Digest) {
        self.layers.push(hash);
    }
}

/// Persists snapshot manifests as JSON files keyed by cache key.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Return the root directory of this storage.
    pub fn root(&self) -> &Path {
        self.root.as_ref()
    }

    /// The path at which the manifest for the given key is stored.
    pub fn manifest_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Write the given snapshot, replacing any previous manifest
    /// stored under the same cache key.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| Error::FailedToCreateDir(self.root.clone(), err))?;
        let path = self.manifest_path(&snapshot.cache_key);
        let data = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|err| Error::SnapshotWriteError(path, err))
    }

    /// Load the snapshot stored under the given cache key.
    pub async fn load(&self, key: &CacheKey) -> Result<Snapshot> {
        let path = self.manifest_path(key);
        let data = match tokio::fs::read_to_string(&path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::UnknownSnapshot(key.clone()));
            }
            Err(err) => return Err(Error::SnapshotReadError(path, err)),
            Ok(data) => data,
        };
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        if snapshot.version != SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::UnsupportedSnapshotVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    /// Return true if a manifest is stored under the given cache key.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.manifest_path(key))
            .await
            .unwrap_or(false)
    }

    /// List the cache keys of all stored manifests.
    ///
    /// A storage directory that does not exist yet is simply empty.
    pub async fn list(&self) -> Result<Vec<CacheKey>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::StorageReadError(self.root.clone(), err)),
            Ok(read_dir) => read_dir,
        };
        let mut keys = Vec::new();
        while let Some(next) = read_dir
            .next_entry()
            .await
            .map_err(|err| Error::StorageReadError(self.root.clone(), err))?
        {
            let path = next.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                keys.push(CacheKey::from(stem.to_string_lossy().into_owned()));
            }
        }
        Ok(keys)
    }

    /// Remove the manifest stored under the given cache key.
    ///
    /// The layers it referenced are left in place, as other manifests
    /// may still share them.
    pub async fn delete(&self, key: &CacheKey) -> Result<()> {
        let path = self.manifest_path(key);
        match tokio::fs::remove_file(&path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::UnknownSnapshot(key.clone()))
            }
            Err(err) => Err(Error::SnapshotWriteError(path, err)),
            Ok(()) => Ok(()),
        }
    }
}
