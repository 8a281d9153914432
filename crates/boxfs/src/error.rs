// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Encoding(#[from] boxfs_encoding::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Archive write error")]
    ArchiveWriteError(#[source] std::io::Error),

    #[error("Archive read error")]
    ArchiveReadError(#[source] std::io::Error),

    #[error("Failed to create storage directory: {0}")]
    FailedToCreateDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to open working file: {0}")]
    FailedToOpenWorkingFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to write layer data: {0}")]
    FailedToWriteLayer(PathBuf, #[source] std::io::Error),

    #[error("Failed to store layer: {0}")]
    FailedToStoreLayer(PathBuf, #[source] std::io::Error),

    #[error("Storage read error: {0}")]
    StorageReadError(PathBuf, #[source] std::io::Error),

    #[error("Snapshot read error: {0}")]
    SnapshotReadError(PathBuf, #[source] std::io::Error),

    #[error("Snapshot write error: {0}")]
    SnapshotWriteError(PathBuf, #[source] std::io::Error),

    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(crate::cache::CacheKey),

    #[error("Snapshot version is not supported: {0}")]
    #[diagnostic(help("the snapshot was likely written by a newer release"))]
    UnsupportedSnapshotVersion(u32),

    #[error("Symlink entry carries a non-utf8 target: {0}")]
    InvalidLinkTarget(String),

    #[error("Invalid entry kind: {0}")]
    InvalidEntryKind(String),
}
