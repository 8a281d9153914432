// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! An in-memory guest filesystem answering FUSE requests.
//!
//! The [`Filesystem`] owns every inode, sparse file block, extended
//! attribute, advisory lock and directory stream behind one coarse
//! mutex; a transport (virtio-fs or otherwise) decodes requests,
//! calls the matching operation and encodes the typed reply or the
//! negated errno. Files and directories can be backed by pluggable
//! [`backing`] providers until first mutation, and the guest-visible
//! tree can be exported as [`boxfs`] layer data for snapshotting.

#[cfg(test)]
pub mod fixtures;

pub mod backing;
pub mod proto;

mod acl;
pub use acl::{Acl, AclEntry, ACL_XATTR_ACCESS, ACL_XATTR_DEFAULT};

mod block;
pub use block::{BlockStore, BLOCK_SIZE};

mod dir;
mod export;
mod inode;
mod locks;

mod error;
pub use error::{Errno, Result};

mod filesystem;
pub use filesystem::{Config, Filesystem, Request, SetAttrs};
