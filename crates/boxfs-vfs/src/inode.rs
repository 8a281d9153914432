// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::backing::{AbstractDir, AbstractFile};
use crate::block::{BlockStore, BLOCK_SIZE};
use crate::proto::FuseAttr;

/// The inode number of the filesystem root.
pub const ROOT_INO: u64 = 1;

/// File types that only `raw_mode` can represent faithfully.
const SPECIAL_TYPES: [u32; 4] = [libc::S_IFSOCK, libc::S_IFIFO, libc::S_IFCHR, libc::S_IFBLK];

/// Advance a timestamp, bumping by one nanosecond when the new value
/// would not move it forward. Keeps per-inode times monotonic across
/// wall-clock adjustments.
pub fn monotonic(slot: &mut SystemTime, to: SystemTime) {
    if to <= *slot {
        *slot += Duration::from_nanos(1);
    } else {
        *slot = to;
    }
}

/// Split a timestamp into the unsigned second/nanosecond pair used
/// on the wire. Times before the epoch clamp to zero.
pub fn time_parts(time: SystemTime) -> (u64, u32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => (duration.as_secs(), duration.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

/// One filesystem object and everything hanging off it.
pub struct Inode {
    pub ino: u64,
    pub parent: u64,
    /// the name of the inbound edge; kept in sync by namespace ops
    pub name: String,
    /// file type (regular/directory/symlink) plus the 12 low bits
    pub mode: u32,
    /// the mode exactly as given at creation, preserving special
    /// file types (socket/fifo/chr/blk) that `mode` flattens
    pub raw_mode: u32,
    pub rdev: u32,
    pub uid: u32,
    pub gid: u32,
    /// explicit link count; zero means unlinked-but-live
    pub nlink: u32,
    /// open file handles keeping this inode alive after unlink
    pub open_refs: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub blocks: BlockStore,
    pub link_target: Option<String>,
    /// child edges in insertion order; enumeration sorts by name
    pub children: IndexMap<String, u64>,
    /// names unlinked through this directory, so that an abstract
    /// backing cannot resurrect them
    pub deleted_edges: HashSet<String>,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub file_delegate: Option<Arc<dyn AbstractFile>>,
    pub dir_delegate: Option<Arc<dyn AbstractDir>>,
}

impl Inode {
    pub fn new(ino: u64, parent: u64, name: impl Into<String>, mode: u32, now: SystemTime) -> Self {
        let nlink = if mode & libc::S_IFMT == libc::S_IFDIR {
            2
        } else {
            1
        };
        Self {
            ino,
            parent,
            name: name.into(),
            mode,
            raw_mode: mode,
            rdev: 0,
            uid: 0,
            gid: 0,
            nlink,
            open_refs: 0,
            atime: now,
            mtime: now,
            ctime: now,
            blocks: BlockStore::default(),
            link_target: None,
            children: IndexMap::new(),
            deleted_edges: HashSet::new(),
            xattrs: BTreeMap::new(),
            file_delegate: None,
            dir_delegate: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFLNK
    }

    pub fn unlinked(&self) -> bool {
        self.nlink == 0
    }

    /// The wire file-type bits: special types survive in `raw_mode`
    /// even though the inode is managed as a regular file.
    pub fn file_type_bits(&self) -> u32 {
        let raw_type = self.raw_mode & libc::S_IFMT;
        if SPECIAL_TYPES.contains(&raw_type) {
            raw_type
        } else {
            self.mode & libc::S_IFMT
        }
    }

    /// Drop setuid, and setgid when group-execute is set, as POSIX
    /// requires of writes, truncations and ownership changes.
    pub fn clear_suid_sgid(&mut self) {
        self.mode &= !libc::S_ISUID;
        if self.mode & libc::S_IXGRP != 0 {
            self.mode &= !libc::S_ISGID;
        }
    }

    pub fn touch_atime(&mut self, now: SystemTime) {
        monotonic(&mut self.atime, now);
    }

    pub fn touch_mtime(&mut self, now: SystemTime) {
        monotonic(&mut self.mtime, now);
    }

    pub fn touch_ctime(&mut self, now: SystemTime) {
        monotonic(&mut self.ctime, now);
    }

    pub fn attr(&self) -> FuseAttr {
        let (atime, atimensec) = time_parts(self.atime);
        let (mtime, mtimensec) = time_parts(self.mtime);
        let (ctime, ctimensec) = time_parts(self.ctime);
        let size = if self.is_dir() {
            0
        } else if let Some(target) = &self.link_target {
            target.len() as u64
        } else {
            self.blocks.len()
        };
        FuseAttr {
            ino: self.ino,
            size,
            blocks: self.blocks.usage(),
            atime,
            mtime,
            ctime,
            atimensec,
            mtimensec,
            ctimensec,
            mode: self.file_type_bits() | (self.mode & 0o7777),
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: BLOCK_SIZE as u32,
            padding: 0,
        }
    }
}
