// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Capture of the guest-visible tree as layer data.

use boxfs::tracking::{Entry, LayerData};

use crate::filesystem::{Filesystem, FsState};
use crate::inode::{time_parts, ROOT_INO};
use crate::proto::MAX_WRITE_SIZE;
use crate::{Errno, Result};

#[cfg(test)]
#[path = "./export_test.rs"]
mod export_test;

impl Filesystem {
    /// Walk the whole tree depth-first in sorted name order and
    /// return it as ordered layer entries. Abstract backings are
    /// materialized as they are visited; names unlinked out of a
    /// backing become whiteout entries so lower layers cannot
    /// resurrect them.
    pub fn export(&self) -> Result<LayerData> {
        tracing::debug!("exporting filesystem tree");
        let mut state = self.state.lock();
        let mut entries = Vec::new();
        state.export_dir(ROOT_INO, "", &mut entries)?;
        Ok(LayerData::new(entries))
    }
}

impl FsState {
    fn export_dir(&mut self, dir: u64, prefix: &str, out: &mut Vec<Entry>) -> Result<()> {
        let deleted: Vec<String> = {
            let mut names: Vec<String> =
                self.inode(dir)?.deleted_edges.iter().cloned().collect();
            names.sort();
            names
        };
        let mut names: Vec<String> = self
            .visible_child_names(dir)?
            .into_iter()
            .chain(deleted.iter().cloned())
            .collect();
        names.sort();
        names.dedup();

        for name in names {
            let path = format!("{prefix}/{name}");
            if deleted.binary_search(&name).is_ok() {
                out.push(Entry::whiteout(path));
                continue;
            }
            let child = self.lookup_child(dir, &name)?;
            let node = self.inode(child)?;
            let perm = node.mode & 0o7777;
            let uid = node.uid;
            let gid = node.gid;
            let mtime = time_parts(node.mtime).0 as i64;
            if node.is_dir() {
                out.push(
                    Entry::directory(path.clone(), perm)
                        .with_owner(uid, gid)
                        .with_mtime(mtime),
                );
                self.export_dir(child, &path, out)?;
            } else if let Some(target) = node.link_target.clone() {
                out.push(
                    Entry::symlink(path, perm, target)
                        .with_owner(uid, gid)
                        .with_mtime(mtime),
                );
            } else {
                // special file types survive through the entry mode
                let type_bits = node.file_type_bits();
                let mode = if type_bits == libc::S_IFREG {
                    perm
                } else {
                    type_bits | perm
                };
                let payload = self.read_file_contents(child)?;
                out.push(
                    Entry::regular(path, mode, payload)
                        .with_owner(uid, gid)
                        .with_mtime(mtime),
                );
            }
        }
        Ok(())
    }

    /// Full contents of one file, from the delegate when it is still
    /// authoritative, otherwise from the block store.
    fn read_file_contents(&self, ino: u64) -> Result<Vec<u8>> {
        let inode = self.inode(ino)?;
        let size = inode.blocks.len();
        let Some(delegate) = inode.file_delegate.clone() else {
            return Ok(inode.blocks.read(0, size));
        };
        let mut data = Vec::with_capacity(size as usize);
        let mut offset = 0;
        while offset < size {
            let want = (size - offset).min(MAX_WRITE_SIZE as u64);
            let chunk = delegate.read_at(offset, want).map_err(|_| Errno::EIO)?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len() as u64;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}
