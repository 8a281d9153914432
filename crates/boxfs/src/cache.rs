// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Deterministic cache keys for chains of build operations.
//!
//! Every build step is named by mixing its parent step's key with an
//! operation key. Two builds that perform the same operations over the
//! same base therefore land on the same keys and can share snapshots.

use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};

use crate::encoding::Digest;

#[cfg(test)]
#[path = "./cache_test.rs"]
mod cache_test;

/// The number of hex characters in a cache key (128 bits of hash).
pub const CACHE_KEY_LEN: usize = 32;

/// A deterministic identifier for one step in a build chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Finish a hashing context into the truncated hex form used
/// for every key in the chain.
fn truncated_hex(ctx: Context) -> String {
    let digest = ctx.finish();
    let mut hex = HEXLOWER.encode(digest.as_ref());
    hex.truncate(CACHE_KEY_LEN);
    hex
}

/// Mix a parent key with an operation key to name the resulting step.
pub fn derive_key(parent: &CacheKey, op_key: &str) -> CacheKey {
    let mut ctx = Context::new(&SHA256);
    ctx.update(parent.as_str().as_bytes());
    ctx.update(&[0]);
    ctx.update(op_key.as_bytes());
    CacheKey(truncated_hex(ctx))
}

/// The key of a build chain's root: its base image and architecture.
pub fn base_key(image_ref: &str, architecture: &str) -> CacheKey {
    let mut ctx = Context::new(&SHA256);
    ctx.update(b"base:");
    ctx.update(image_ref.as_bytes());
    ctx.update(&[0]);
    ctx.update(architecture.as_bytes());
    CacheKey(truncated_hex(ctx))
}

/// The operation key of importing a snapshotted layer.
pub fn snapshot_op_key(layer: &Digest) -> String {
    format!("snapshot:{layer}")
}

/// The operation key of running a command.
pub fn run_op_key(command: &[String], env: &[String], workdir: &str) -> String {
    let mut ctx = Context::new(&SHA256);
    ctx.update(b"run:");
    for arg in command {
        ctx.update(arg.as_bytes());
        ctx.update(&[0]);
    }
    ctx.update(&[1]);
    for var in env {
        ctx.update(var.as_bytes());
        ctx.update(&[0]);
    }
    ctx.update(&[1]);
    ctx.update(workdir.as_bytes());
    truncated_hex(ctx)
}

/// The operation key of copying content into the filesystem.
///
/// Unlike [`run_op_key`], the fields here are joined by null bytes
/// alone, with no sentinel separators. The asymmetry is retained on
/// purpose: existing build chains hash this way, and changing it
/// would orphan every cached snapshot.
pub fn copy_op_key(src: &str, dst: &str, content_hash: &Digest) -> String {
    let mut ctx = Context::new(&SHA256);
    ctx.update(b"copy:");
    ctx.update(src.as_bytes());
    ctx.update(&[0]);
    ctx.update(dst.as_bytes());
    ctx.update(&[0]);
    ctx.update(content_hash.to_string().as_bytes());
    truncated_hex(ctx)
}
