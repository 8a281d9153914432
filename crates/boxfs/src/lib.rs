// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Content-addressed capture and storage of guest filesystem layers.
//!
//! A layer is an ordered list of filesystem entries serialized through an
//! [`archive::ArchiveWriter`] into an index/contents pair named by the
//! SHA-256 of the entry stream. Snapshot manifests tie an ordered stack of
//! layers to the cache key of the build step that produced them.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub mod archive;
pub mod cache;
pub mod storage;
pub mod tracking;

mod error;
pub use error::{Error, Result};

pub use boxfs_encoding as encoding;
