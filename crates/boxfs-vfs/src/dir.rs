// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Directory streams with stable, rewind-aware enumeration.
//!
//! A handle holds an ordered snapshot of the directory taken on the
//! first READDIR, so pagination stays consistent while the directory
//! changes underneath. Cookies are plain next-index values into that
//! snapshot; cookie zero re-reads the directory (rewinddir).

use std::collections::BTreeSet;

use crate::filesystem::{Filesystem, FsState};
use crate::inode::ROOT_INO;
use crate::proto::{dtype_for_mode, DirentBuf, EntryOut};
use crate::{Errno, Result};

#[cfg(test)]
#[path = "./dir_test.rs"]
mod dir_test;

/// One entry of a directory snapshot.
#[derive(Debug, Clone)]
pub(crate) struct DirEntrySnap {
    pub name: String,
    pub ino: u64,
    pub dtype: u32,
}

/// An open directory stream.
pub(crate) struct DirHandle {
    pub ino: u64,
    pub entries: Vec<DirEntrySnap>,
    /// set once the first READDIR has built a snapshot; from then on
    /// cookie zero means rewind-and-rebuild
    pub started: bool,
}

impl Filesystem {
    pub fn opendir(&self, ino: u64) -> Result<u64> {
        tracing::trace!(ino, "opendir");
        let mut state = self.state.lock();
        if !state.inode(ino)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let fh = state.alloc_handle();
        state.dir_handles.insert(
            fh,
            DirHandle {
                ino,
                entries: Vec::new(),
                started: false,
            },
        );
        state.inode_mut(ino)?.open_refs += 1;
        Ok(fh)
    }

    pub fn releasedir(&self, ino: u64, fh: u64) -> Result<()> {
        tracing::trace!(ino, fh, "releasedir");
        let mut state = self.state.lock();
        let Some(handle) = state.dir_handles.remove(&fh) else {
            return Ok(());
        };
        debug_assert_eq!(handle.ino, ino);
        if let Ok(inode) = state.inode_mut(handle.ino) {
            inode.open_refs = inode.open_refs.saturating_sub(1);
        }
        state.reap_if_unused(handle.ino);
        Ok(())
    }

    pub fn readdir(&self, ino: u64, fh: u64, offset: u64, max_bytes: u32) -> Result<Vec<u8>> {
        tracing::trace!(ino, fh, offset, max_bytes, "readdir");
        let mut state = self.state.lock();
        state.readdir(ino, fh, offset, max_bytes, false)
    }

    pub fn readdirplus(&self, ino: u64, fh: u64, offset: u64, max_bytes: u32) -> Result<Vec<u8>> {
        tracing::trace!(ino, fh, offset, max_bytes, "readdirplus");
        let mut state = self.state.lock();
        state.readdir(ino, fh, offset, max_bytes, true)
    }
}

impl FsState {
    /// The names currently visible in a directory: cached edges plus
    /// whatever the abstract backing lists, minus deleted names.
    pub(crate) fn visible_child_names(&self, dir: u64) -> Result<BTreeSet<String>> {
        let inode = self.inode(dir)?;
        let mut names: BTreeSet<String> = inode.children.keys().cloned().collect();
        if let Some(delegate) = inode.dir_delegate.clone() {
            for entry in delegate.read_dir().map_err(|_| Errno::EIO)? {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                if inode.deleted_edges.contains(&entry.name) {
                    continue;
                }
                names.insert(entry.name);
            }
        }
        names.remove(".");
        names.remove("..");
        Ok(names)
    }

    /// Build the ordered snapshot served by one directory stream.
    ///
    /// Names are materialized in sorted order so that inode numbers
    /// assigned to abstract entries never depend on how the caller
    /// paginates.
    fn build_dir_snapshot(&mut self, dir: u64) -> Result<Vec<DirEntrySnap>> {
        let inode = self.inode(dir)?;
        let self_ino = inode.ino;
        let parent_ino = if self_ino == ROOT_INO {
            ROOT_INO
        } else {
            inode.parent
        };
        let names = self.visible_child_names(dir)?;
        let mut entries = vec![
            DirEntrySnap {
                name: ".".to_string(),
                ino: self_ino,
                dtype: libc::DT_DIR as u32,
            },
            DirEntrySnap {
                name: "..".to_string(),
                ino: parent_ino,
                dtype: libc::DT_DIR as u32,
            },
        ];
        for name in names {
            match self.lookup_child(dir, &name) {
                Ok(child) => {
                    let node = self.inode(child)?;
                    entries.push(DirEntrySnap {
                        name,
                        ino: child,
                        dtype: dtype_for_mode(node.file_type_bits()),
                    });
                }
                Err(err) => {
                    // the backing listed a name it can no longer resolve
                    tracing::warn!(dir, %name, %err, "skipping unresolvable dirent");
                }
            }
        }
        Ok(entries)
    }

    pub(crate) fn readdir(
        &mut self,
        ino: u64,
        fh: u64,
        offset: u64,
        max_bytes: u32,
        plus: bool,
    ) -> Result<Vec<u8>> {
        let (handle_ino, started) = {
            let handle = self.dir_handles.get(&fh).ok_or(Errno::EBADF)?;
            (handle.ino, handle.started)
        };
        if handle_ino != ino {
            return Err(Errno::EBADF);
        }
        if !started || offset == 0 {
            let entries = self.build_dir_snapshot(ino)?;
            let handle = self.dir_handles.get_mut(&fh).ok_or(Errno::EBADF)?;
            handle.entries = entries;
            handle.started = true;
        }
        let handle = self.dir_handles.get(&fh).ok_or(Errno::EBADF)?;
        let mut buf = DirentBuf::new(max_bytes as usize);
        let mut full = false;
        for (index, entry) in handle.entries.iter().enumerate().skip(offset as usize) {
            let next_cookie = (index + 1) as u64;
            full = if plus {
                let Ok(node) = self.inode(entry.ino) else {
                    // reaped since the snapshot was taken
                    continue;
                };
                buf.push_plus(&EntryOut::new(node.attr()), entry.ino, next_cookie, entry.dtype, &entry.name)
            } else {
                buf.push(entry.ino, next_cookie, entry.dtype, &entry.name)
            };
            if full {
                break;
            }
        }
        buf.into_reply(full)
    }
}
