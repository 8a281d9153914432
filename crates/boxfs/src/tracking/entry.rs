// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::str::FromStr;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./entry_test.rs"]
mod entry_test;

/// The kinds of filesystem object that a layer entry can describe.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EntryKind {
    /// regular file / leaf
    Regular,
    /// directory / node
    Directory,
    /// symbolic link / leaf
    Symlink,
    /// removed entry, masking one from a lower layer
    Whiteout,
}

impl EntryKind {
    /// The single byte mixed into a layer hash for this kind.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Directory => 1,
            Self::Symlink => 2,
            Self::Whiteout => 3,
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular)
    }
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }
    pub fn is_whiteout(&self) -> bool {
        matches!(self, Self::Whiteout)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => f.write_str("file"),
            Self::Directory => f.write_str("dir"),
            Self::Symlink => f.write_str("symlink"),
            Self::Whiteout => f.write_str("whiteout"),
        }
    }
}

impl FromStr for EntryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Self::Regular),
            "dir" => Ok(Self::Directory),
            "symlink" => Ok(Self::Symlink),
            "whiteout" => Ok(Self::Whiteout),
            kind => Err(Error::InvalidEntryKind(kind.to_string())),
        }
    }
}

/// A single captured filesystem object within a layer.
///
/// The payload holds the file bytes of regular entries and the
/// target of symlink entries; it is empty for all other kinds.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// modification time, in whole seconds since the unix epoch
    pub mtime: i64,
    pub size: u64,
    pub payload: Vec<u8>,
}

impl Entry {
    pub fn regular(path: impl Into<String>, mode: u32, payload: Vec<u8>) -> Self {
        let size = payload.len() as u64;
        Self {
            path: path.into(),
            kind: EntryKind::Regular,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            size,
            payload,
        }
    }

    pub fn directory(path: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            size: 0,
            payload: Vec::new(),
        }
    }

    pub fn symlink(path: impl Into<String>, mode: u32, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Symlink,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            size: 0,
            payload: target.into().into_bytes(),
        }
    }

    pub fn whiteout(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Whiteout,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            size: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = mtime;
        self
    }

    /// The symlink target carried in this entry's payload.
    pub fn link_target(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| Error::InvalidLinkTarget(self.path.clone()))
    }
}

/// An ordered list of entries making up one filesystem layer.
///
/// Order is significant: the layer hash commits to it, so the same
/// set of entries in a different order names a different layer.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LayerData {
    pub entries: Vec<Entry>,
}

impl LayerData {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<Entry> for LayerData {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
