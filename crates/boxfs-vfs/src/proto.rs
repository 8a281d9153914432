// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! FUSE wire structures produced and consumed by the backend.
//!
//! Only the payload-level layouts live here; request framing belongs
//! to the transport. Struct layouts match the kernel ABI so replies
//! can be written out with a plain byte copy.

use zerocopy::{Immutable, IntoBytes};

use crate::{Errno, Result};

#[cfg(test)]
#[path = "./proto_test.rs"]
mod proto_test;

/// The largest write payload accepted from the kernel.
pub const MAX_WRITE_SIZE: u32 = 128 * 1024;

bitflags::bitflags! {
    /// Capability bits advertised in the INIT reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InitFlags: u32 {
        /// remote posix byte-range locking
        const POSIX_LOCKS = 1 << 1;
        /// kernel-side posix acl enforcement from our xattrs
        const POSIX_ACL = 1 << 20;
    }
}

/// Negotiated parameters returned from INIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOut {
    pub max_write: u32,
    pub flags: InitFlags,
}

/// Attributes of one inode, in kernel `fuse_attr` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoBytes, Immutable)]
pub struct FuseAttr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub atimensec: u32,
    pub mtimensec: u32,
    pub ctimensec: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub padding: u32,
}

/// One entry reply, in kernel `fuse_entry_out` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoBytes, Immutable)]
pub struct EntryOut {
    pub nodeid: u64,
    pub generation: u64,
    pub entry_valid: u64,
    pub attr_valid: u64,
    pub entry_valid_nsec: u32,
    pub attr_valid_nsec: u32,
    pub attr: FuseAttr,
}

impl EntryOut {
    pub fn new(attr: FuseAttr) -> Self {
        Self {
            nodeid: attr.ino,
            attr,
            ..Default::default()
        }
    }
}

/// Lock types carried by GETLK/SETLK requests and replies.
pub const LOCK_READ: u32 = libc::F_RDLCK as u32;
pub const LOCK_WRITE: u32 = libc::F_WRLCK as u32;
pub const LOCK_UNLOCK: u32 = libc::F_UNLCK as u32;

/// Request flag bit marking a lock op as open-file-description scoped.
pub const LOCK_FLAG_OFD: u32 = 1 << 1;

/// One byte-range lock, in kernel `fuse_file_lock` layout.
///
/// `end` is inclusive; a lock to end-of-file carries `u64::MAX`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, Immutable)]
pub struct FuseLock {
    pub start: u64,
    pub end: u64,
    pub typ: u32,
    pub pid: u32,
}

impl FuseLock {
    /// The "no conflict" reply to GETLK.
    pub fn unlocked() -> Self {
        Self {
            start: 0,
            end: 0,
            typ: LOCK_UNLOCK,
            pid: 0,
        }
    }
}

/// Synthetic filesystem statistics, in kernel `fuse_kstatfs` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, Immutable)]
pub struct StatfsOut {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
    pub padding: u32,
}

impl StatfsOut {
    /// The fixed statistics this filesystem always reports. The
    /// numbers are not tracked against real usage; they exist so
    /// that tools like `df` see a plausibly-sized disk.
    pub fn synthetic() -> Self {
        Self {
            blocks: 25 * 1024 * 1024,
            bfree: 24 * 1024 * 1024,
            bavail: 24 * 1024 * 1024,
            files: 0,
            ffree: 0,
            bsize: crate::BLOCK_SIZE as u32,
            namelen: MAX_NAME_LEN as u32,
            frsize: crate::BLOCK_SIZE as u32,
            padding: 0,
        }
    }
}

/// The longest accepted name component, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// The dirent `d_type` value for the given inode mode.
pub fn dtype_for_mode(mode: u32) -> u32 {
    ((mode & libc::S_IFMT) >> 12) as u32
}

/// Header of one serialized dirent, in kernel `fuse_dirent` layout.
/// The name bytes follow, padded with zeroes to an 8-byte boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, Immutable)]
struct DirentHeader {
    ino: u64,
    off: u64,
    namelen: u32,
    dtype: u32,
}

const DIRENT_ALIGN: usize = std::mem::size_of::<u64>();

fn aligned_len(len: usize) -> usize {
    len.next_multiple_of(DIRENT_ALIGN)
}

/// Packs dirent records into a READDIR reply of bounded size.
pub struct DirentBuf {
    max_size: usize,
    buf: Vec<u8>,
}

impl DirentBuf {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            buf: Vec::new(),
        }
    }

    /// Append one record. Returns true if the buffer is full and the
    /// record was not appended; the cookie of the following entry
    /// must be carried in `next_cookie`.
    #[must_use]
    pub fn push(&mut self, ino: u64, next_cookie: u64, dtype: u32, name: &str) -> bool {
        self.push_record(&[], ino, next_cookie, dtype, name)
    }

    /// Append one READDIRPLUS record: the full entry reply followed
    /// by the plain dirent. Returns true if the buffer is full.
    #[must_use]
    pub fn push_plus(
        &mut self,
        entry: &EntryOut,
        ino: u64,
        next_cookie: u64,
        dtype: u32,
        name: &str,
    ) -> bool {
        self.push_record(entry.as_bytes(), ino, next_cookie, dtype, name)
    }

    fn push_record(
        &mut self,
        prefix: &[u8],
        ino: u64,
        next_cookie: u64,
        dtype: u32,
        name: &str,
    ) -> bool {
        debug_assert!(self.buf.len() % DIRENT_ALIGN == 0);
        let header = DirentHeader {
            ino,
            off: next_cookie,
            namelen: name.len() as u32,
            dtype,
        };
        let record_len = prefix.len() + std::mem::size_of::<DirentHeader>() + name.len();
        let padded_len = aligned_len(record_len);
        if self.buf.len() + padded_len > self.max_size {
            return true;
        }
        self.buf.extend_from_slice(prefix);
        self.buf.extend_from_slice(header.as_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.resize(self.buf.len() + padded_len - record_len, 0);
        false
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the buffer, validating that a full-on-first-entry
    /// condition is reported as an error rather than mistaken for
    /// end-of-stream.
    pub fn into_reply(self, full: bool) -> Result<Vec<u8>> {
        if full && self.buf.is_empty() {
            return Err(Errno::EINVAL);
        }
        Ok(self.buf)
    }
}
