// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Pluggable read-side providers for externally-sourced content.
//!
//! An inode carrying one of these delegates serves reads and lookups
//! from the provider until its first mutation, at which point the
//! filesystem copies the content up into its own block store and
//! drops the delegate. Providers only need to be cheap and correct
//! for reading; writability is optional.

use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

#[cfg(test)]
#[path = "./backing_test.rs"]
mod backing_test;

/// A file whose bytes come from somewhere outside the filesystem.
pub trait AbstractFile: Send + Sync {
    /// The current size and permission bits of the backing content.
    fn stat(&self) -> io::Result<(u64, u32)>;

    fn mod_time(&self) -> io::Result<SystemTime>;

    /// Read up to `size` bytes at `offset`. Short reads signal
    /// end-of-content.
    fn read_at(&self, offset: u64, size: u64) -> io::Result<Vec<u8>>;

    /// Optional: write through to the backing content.
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<u64>;

    /// Optional: resize the backing content.
    fn truncate(&self, size: u64) -> io::Result<()>;

    /// Ownership to give materialized inodes, when the provider
    /// knows better than the filesystem defaults.
    fn owner(&self) -> Option<(u32, u32)> {
        None
    }
}

/// One name listed by an [`AbstractDir`].
#[derive(Debug, Clone)]
pub struct AbstractDirEntry {
    pub name: String,
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
}

/// A directory whose children come from somewhere outside the
/// filesystem.
pub trait AbstractDir: Send + Sync {
    /// The permission bits of the directory itself.
    fn stat(&self) -> io::Result<u32>;

    fn mod_time(&self) -> io::Result<SystemTime>;

    fn read_dir(&self) -> io::Result<Vec<AbstractDirEntry>>;

    /// Resolve one child name to a provider for it.
    fn lookup(&self, name: &str) -> io::Result<AbstractNode>;

    /// Ownership to give materialized inodes, when the provider
    /// knows better than the filesystem defaults.
    fn owner(&self) -> Option<(u32, u32)> {
        None
    }
}

/// A symbolic link sourced from outside the filesystem.
pub trait AbstractSymlink: Send + Sync {
    /// The permission bits of the link itself.
    fn stat(&self) -> io::Result<u32>;

    fn mod_time(&self) -> io::Result<SystemTime>;

    fn target(&self) -> io::Result<String>;

    /// Ownership to give materialized inodes, when the provider
    /// knows better than the filesystem defaults.
    fn owner(&self) -> Option<(u32, u32)> {
        None
    }
}

/// The result of resolving a name through an [`AbstractDir`].
#[derive(Clone)]
pub enum AbstractNode {
    File(Arc<dyn AbstractFile>),
    Dir(Arc<dyn AbstractDir>),
    Symlink(Arc<dyn AbstractSymlink>),
}

/// Serves a fixed byte buffer as a read-only file.
pub struct BytesFile {
    data: Vec<u8>,
    mode: u32,
}

impl BytesFile {
    pub fn new(data: Vec<u8>, mode: u32) -> Self {
        Self { data, mode }
    }
}

impl AbstractFile for BytesFile {
    fn stat(&self) -> io::Result<(u64, u32)> {
        Ok((self.data.len() as u64, self.mode & 0o7777))
    }

    fn mod_time(&self) -> io::Result<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH)
    }

    fn read_at(&self, offset: u64, size: u64) -> io::Result<Vec<u8>> {
        if offset >= self.data.len() as u64 {
            return Ok(Vec::new());
        }
        let end = (self.data.len() as u64).min(offset.saturating_add(size));
        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn write_at(&self, _offset: u64, _data: &[u8]) -> io::Result<u64> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn truncate(&self, _size: u64) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// A file delegated to a path on the host.
pub struct HostFile {
    path: PathBuf,
}

impl HostFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl AbstractFile for HostFile {
    fn stat(&self) -> io::Result<(u64, u32)> {
        let meta = std::fs::metadata(&self.path)?;
        Ok((meta.len(), meta.mode() & 0o7777))
    }

    fn mod_time(&self) -> io::Result<SystemTime> {
        std::fs::metadata(&self.path)?.modified()
    }

    fn read_at(&self, offset: u64, size: u64) -> io::Result<Vec<u8>> {
        let file = std::fs::File::open(&self.path)?;
        let mut buf = vec![0; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let count = file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<u64> {
        let file = std::fs::OpenOptions::new().write(true).open(&self.path)?;
        file.write_all_at(data, offset)?;
        Ok(data.len() as u64)
    }

    fn truncate(&self, size: u64) -> io::Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(size)
    }

    fn owner(&self) -> Option<(u32, u32)> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some((meta.uid(), meta.gid()))
    }
}

/// A directory delegated to a path on the host.
pub struct HostDir {
    path: PathBuf,
}

impl HostDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl AbstractDir for HostDir {
    fn stat(&self) -> io::Result<u32> {
        Ok(std::fs::metadata(&self.path)?.mode() & 0o7777)
    }

    fn mod_time(&self) -> io::Result<SystemTime> {
        std::fs::metadata(&self.path)?.modified()
    }

    fn read_dir(&self) -> io::Result<Vec<AbstractDirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(AbstractDirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                mode: meta.mode() & 0o7777,
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    fn lookup(&self, name: &str) -> io::Result<AbstractNode> {
        let path = self.path.join(name);
        let meta = std::fs::symlink_metadata(&path)?;
        let node = if meta.file_type().is_symlink() {
            AbstractNode::Symlink(Arc::new(HostSymlink::new(path)))
        } else if meta.is_dir() {
            AbstractNode::Dir(Arc::new(HostDir::new(path)))
        } else {
            AbstractNode::File(Arc::new(HostFile::new(path)))
        };
        Ok(node)
    }

    fn owner(&self) -> Option<(u32, u32)> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some((meta.uid(), meta.gid()))
    }
}

/// A symlink delegated to a path on the host.
pub struct HostSymlink {
    path: PathBuf,
}

impl HostSymlink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl AbstractSymlink for HostSymlink {
    fn stat(&self) -> io::Result<u32> {
        Ok(std::fs::symlink_metadata(&self.path)?.mode() & 0o7777)
    }

    fn mod_time(&self) -> io::Result<SystemTime> {
        std::fs::symlink_metadata(&self.path)?.modified()
    }

    fn target(&self) -> io::Result<String> {
        let target = std::fs::read_link(&self.path)?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn owner(&self) -> Option<(u32, u32)> {
        let meta = std::fs::symlink_metadata(&self.path).ok()?;
        Some((meta.uid(), meta.gid()))
    }
}
