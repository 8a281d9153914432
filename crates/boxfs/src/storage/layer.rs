// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::path::{Path, PathBuf};

use tokio::io::BufWriter;

use crate::archive::{ArchiveWriter, EntrySpec, SplitWriter};
use crate::encoding::{Digest, Hasher};
use crate::tracking::{EntryKind, LayerData};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./layer_test.rs"]
mod layer_test;

/// Prefix given to in-flight files so that they can be swept later.
const WORK_PREFIX: &str = "layer-";
/// Suffix given to in-flight files so that they can be swept later.
const WORK_SUFFIX: &str = ".tmp";

/// A stored layer, named by the hash of its entry stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Layer {
    pub hash: Digest,
    pub index_path: PathBuf,
    pub contents_path: PathBuf,
}

/// Stores layers in a directory, addressed by content.
///
/// A layer occupies two files, `<hash>.idx` and `<hash>.contents`.
/// Writes land in uniquely-named temp files which are renamed into
/// place once the hash is known, so concurrent writers of the same
/// content cannot corrupt each other: both compute the same name and
/// at most one rename wins.
#[derive(Debug, Clone)]
pub struct LayerStore {
    root: PathBuf,
}

impl LayerStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Return the root directory of this storage.
    pub fn root(&self) -> &Path {
        self.root.as_ref()
    }

    /// The path at which the given layer's index is stored.
    pub fn index_path(&self, hash: &Digest) -> PathBuf {
        self.root.join(format!("{hash}.idx"))
    }

    /// The path at which the given layer's contents are stored.
    pub fn contents_path(&self, hash: &Digest) -> PathBuf {
        self.root.join(format!("{hash}.contents"))
    }

    /// Return true if the given layer is present in this storage.
    pub async fn has_layer(&self, hash: &Digest) -> bool {
        tokio::fs::try_exists(self.index_path(hash))
            .await
            .unwrap_or(false)
    }

    /// Serialize the given entries into this store, returning the
    /// stored layer.
    ///
    /// The layer hash commits to each entry's path, kind and (for
    /// regular files) payload bytes, in input order. Writing the same
    /// data twice yields the same layer and leaves the first copy of
    /// the files untouched.
    pub async fn write_layer(&self, data: &LayerData) -> Result<Layer> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| Error::FailedToCreateDir(self.root.clone(), err))?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let working_index = self.root.join(format!("{WORK_PREFIX}{uuid}.idx{WORK_SUFFIX}"));
        let working_contents = self
            .root
            .join(format!("{WORK_PREFIX}{uuid}.contents{WORK_SUFFIX}"));

        let hash = match self
            .write_working_files(data, &working_index, &working_contents)
            .await
        {
            Ok(hash) => hash,
            Err(err) => {
                let _ = tokio::fs::remove_file(&working_index).await;
                let _ = tokio::fs::remove_file(&working_contents).await;
                return Err(err);
            }
        };

        let layer = Layer {
            hash,
            index_path: self.index_path(&hash),
            contents_path: self.contents_path(&hash),
        };

        if self.has_layer(&hash).await {
            // identical content is already stored, keep the original files
            tracing::debug!(%hash, "layer already exists, discarding temp files");
            let _ = tokio::fs::remove_file(&working_index).await;
            let _ = tokio::fs::remove_file(&working_contents).await;
            return Ok(layer);
        }

        if let Err(err) = tokio::fs::rename(&working_index, &layer.index_path).await {
            let _ = tokio::fs::remove_file(&working_index).await;
            let _ = tokio::fs::remove_file(&working_contents).await;
            return Err(Error::FailedToStoreLayer(layer.index_path.clone(), err));
        }
        if let Err(err) = tokio::fs::rename(&working_contents, &layer.contents_path).await {
            // do not leave a half-committed layer behind
            let _ = tokio::fs::remove_file(&layer.index_path).await;
            let _ = tokio::fs::remove_file(&working_contents).await;
            return Err(Error::FailedToStoreLayer(layer.contents_path.clone(), err));
        }

        tracing::debug!(%hash, entries = data.len(), "stored layer");
        Ok(layer)
    }

    async fn write_working_files(
        &self,
        data: &LayerData,
        working_index: &Path,
        working_contents: &Path,
    ) -> Result<Digest> {
        let index_file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(working_index)
            .await
            .map_err(|err| Error::FailedToOpenWorkingFile(working_index.to_owned(), err))?;
        let contents_file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(working_contents)
            .await
            .map_err(|err| Error::FailedToOpenWorkingFile(working_contents.to_owned(), err))?;

        let mut writer = SplitWriter::new(BufWriter::new(index_file), BufWriter::new(contents_file));
        writer.disable_padding();

        let mut hasher = Hasher::default();
        for entry in data.entries.iter() {
            hasher.update(entry.path.as_bytes());
            hasher.update(&[entry.kind.tag()]);

            let spec = EntrySpec::new(&entry.path)
                .kind(entry.kind)
                .mode(entry.mode)
                .owner(entry.uid, entry.gid)
                .mod_time(entry.mtime)
                .size(entry.size);
            match entry.kind {
                EntryKind::Regular if !entry.payload.is_empty() => {
                    let mut payload = hasher.wrap_reader(entry.payload.as_slice());
                    writer.write_entry(spec, Some(&mut payload)).await?;
                }
                EntryKind::Symlink => {
                    writer
                        .write_entry(spec.linkname(entry.link_target()?), None)
                        .await?;
                }
                _ => {
                    writer.write_entry(spec, None).await?;
                }
            }
        }
        writer.finish().await?;
        Ok(hasher.digest())
    }

    /// Remove in-flight temp files left behind by interrupted writes.
    ///
    /// Only safe to call when no other process is writing to this
    /// store. Returns the number of files removed.
    pub async fn clean_work_files(&self) -> Result<usize> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(Error::StorageReadError(self.root.clone(), err)),
            Ok(read_dir) => read_dir,
        };
        let mut removed = 0;
        while let Some(next) = read_dir
            .next_entry()
            .await
            .map_err(|err| Error::StorageReadError(self.root.clone(), err))?
        {
            let name = next.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(WORK_PREFIX) || !name.ends_with(WORK_SUFFIX) {
                continue;
            }
            tracing::debug!(file = %name, "removing stale work file");
            tokio::fs::remove_file(next.path())
                .await
                .map_err(|err| Error::StorageReadError(next.path(), err))?;
            removed += 1;
        }
        Ok(removed)
    }
}
