// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! The filesystem backend: inode store, namespace and file I/O.
//!
//! One mutex covers all state; every operation takes it for its full
//! duration and the paired condvar wakes blocked lock waiters on any
//! change to the lock tables or handle set.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};

use crate::acl::{Acl, ACL_XATTR_ACCESS, ACL_XATTR_DEFAULT};
use crate::backing::{AbstractDir, AbstractFile, AbstractNode};
use crate::block::BlockStore;
use crate::dir::DirHandle;
use crate::inode::{monotonic, Inode, ROOT_INO};
use crate::locks::{validate_lock_type, LockKey, LockManager};
use crate::proto::{
    FuseAttr, FuseLock, InitFlags, InitOut, StatfsOut, LOCK_FLAG_OFD, LOCK_UNLOCK, LOCK_WRITE,
    MAX_NAME_LEN, MAX_WRITE_SIZE,
};
use crate::{Errno, Result};

#[cfg(test)]
#[path = "./filesystem_test.rs"]
mod filesystem_test;

/// The only rename flag honored by this filesystem.
const RENAME_NOREPLACE: u32 = 1;

/// How many symlink indirections a path walk will chase.
const MAX_SYMLINK_RESTARTS: u32 = 40;

/// Static parameters of a filesystem instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// permission bits of the root directory
    pub root_mode: u32,
    /// owner given to the root and to materialized inodes whose
    /// provider does not report one
    pub uid: u32,
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_mode: 0o755,
            uid: 0,
            gid: 0,
        }
    }
}

/// The caller identity attached to a FUSE request.
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

/// The attribute changes carried by one SETATTR request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttrs {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

pub(crate) struct FileHandle {
    pub ino: u64,
    /// last lock-owner cookie seen on this handle; RELEASE drops the
    /// posix locks of this owner even when FLUSH named another
    pub lock_owner: Option<u64>,
}

pub(crate) struct FsState {
    pub(crate) config: Config,
    pub(crate) inodes: HashMap<u64, Inode>,
    next_ino: u64,
    pub(crate) handles: HashMap<u64, FileHandle>,
    pub(crate) dir_handles: HashMap<u64, DirHandle>,
    next_handle: u64,
    pub(crate) locks: LockManager,
}

/// An in-memory filesystem serving one guest.
pub struct Filesystem {
    pub(crate) state: Mutex<FsState>,
    pub(crate) lock_waiters: Condvar,
}

fn now() -> SystemTime {
    SystemTime::now()
}

/// A name argument must be a single real component for ops that
/// create or remove entries.
fn require_name(name: &str) -> Result<&str> {
    let name = name.trim_start_matches('/');
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Errno::EINVAL);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Errno::ENAMETOOLONG);
    }
    Ok(name)
}

fn lock_key(ino: u64, fh: u64, owner: u64, flags: u32) -> LockKey {
    if flags & LOCK_FLAG_OFD != 0 {
        LockKey::Ofd { ino, fh }
    } else {
        LockKey::Posix { ino, owner }
    }
}

impl Filesystem {
    pub fn new(config: Config) -> Self {
        let time = now();
        let mut root = Inode::new(
            ROOT_INO,
            ROOT_INO,
            "",
            libc::S_IFDIR | (config.root_mode & 0o7777),
            time,
        );
        root.uid = config.uid;
        root.gid = config.gid;
        let mut inodes = HashMap::new();
        inodes.insert(ROOT_INO, root);
        Self {
            state: Mutex::new(FsState {
                config,
                inodes,
                next_ino: ROOT_INO + 1,
                handles: HashMap::new(),
                dir_handles: HashMap::new(),
                next_handle: 1,
                locks: LockManager::default(),
            }),
            lock_waiters: Condvar::new(),
        }
    }

    /// Negotiated parameters advertised to the kernel.
    pub fn init(&self) -> InitOut {
        InitOut {
            max_write: MAX_WRITE_SIZE,
            flags: InitFlags::POSIX_ACL | InitFlags::POSIX_LOCKS,
        }
    }

    pub fn statfs(&self, _ino: u64) -> StatfsOut {
        StatfsOut::synthetic()
    }

    pub fn lookup(&self, parent: u64, name: &str) -> Result<FuseAttr> {
        tracing::trace!(parent, name, "lookup");
        let mut state = self.state.lock();
        let name = name.trim_start_matches('/');
        if !state.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let ino = match name {
            "" | "." => parent,
            ".." => state.inode(parent)?.parent,
            name if name.len() > MAX_NAME_LEN => return Err(Errno::ENAMETOOLONG),
            name => state.lookup_child(parent, name)?,
        };
        Ok(state.inode(ino)?.attr())
    }

    pub fn getattr(&self, ino: u64) -> Result<FuseAttr> {
        tracing::trace!(ino, "getattr");
        let state = self.state.lock();
        Ok(state.inode(ino)?.attr())
    }

    pub fn setattr(&self, req: &Request, ino: u64, set: SetAttrs) -> Result<FuseAttr> {
        tracing::trace!(ino, ?set, "setattr");
        let mut state = self.state.lock();
        state.setattr(req, ino, set)
    }

    pub fn readlink(&self, ino: u64) -> Result<Vec<u8>> {
        tracing::trace!(ino, "readlink");
        let state = self.state.lock();
        let inode = state.inode(ino)?;
        if !inode.is_symlink() {
            return Err(Errno::EINVAL);
        }
        match &inode.link_target {
            Some(target) => Ok(target.clone().into_bytes()),
            None => Err(Errno::EINVAL),
        }
    }

    pub fn mknod(
        &self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
        rdev: u32,
    ) -> Result<FuseAttr> {
        tracing::trace!(parent, name, mode, "mknod");
        let mut state = self.state.lock();
        state.mknod(req, parent, name, mode, umask, rdev)
    }

    pub fn mkdir(
        &self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
    ) -> Result<FuseAttr> {
        tracing::trace!(parent, name, mode, "mkdir");
        let mut state = self.state.lock();
        state.mkdir(req, parent, name, mode, umask)
    }

    pub fn symlink(&self, req: &Request, parent: u64, name: &str, target: &str) -> Result<FuseAttr> {
        tracing::trace!(parent, name, target, "symlink");
        let mut state = self.state.lock();
        state.symlink(req, parent, name, target)
    }

    pub fn link(&self, ino: u64, newparent: u64, newname: &str) -> Result<FuseAttr> {
        tracing::trace!(ino, newparent, newname, "link");
        let mut state = self.state.lock();
        state.link(ino, newparent, newname)
    }

    pub fn unlink(&self, parent: u64, name: &str) -> Result<()> {
        tracing::trace!(parent, name, "unlink");
        let mut state = self.state.lock();
        state.unlink(parent, name)
    }

    pub fn rmdir(&self, parent: u64, name: &str) -> Result<()> {
        tracing::trace!(parent, name, "rmdir");
        let mut state = self.state.lock();
        state.rmdir(parent, name)
    }

    pub fn rename(
        &self,
        oldparent: u64,
        oldname: &str,
        newparent: u64,
        newname: &str,
        flags: u32,
    ) -> Result<()> {
        tracing::trace!(oldparent, oldname, newparent, newname, flags, "rename");
        let mut state = self.state.lock();
        state.rename(oldparent, oldname, newparent, newname, flags)
    }

    pub fn create(
        &self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
        flags: i32,
    ) -> Result<(u64, u64, FuseAttr)> {
        tracing::trace!(parent, name, mode, flags, "create");
        let mut state = self.state.lock();
        state.create(req, parent, name, mode, umask, flags)
    }

    pub fn open(&self, ino: u64, flags: i32) -> Result<u64> {
        tracing::trace!(ino, flags, "open");
        let mut state = self.state.lock();
        if state.inode(ino)?.is_dir() {
            return Err(Errno::EISDIR);
        }
        Ok(state.open_handle(ino))
    }

    pub fn read(&self, ino: u64, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>> {
        tracing::trace!(ino, fh, offset, size, "read");
        let mut state = self.state.lock();
        state.read(ino, fh, offset, size)
    }

    pub fn write(&self, ino: u64, fh: u64, offset: u64, data: &[u8]) -> Result<u32> {
        tracing::trace!(ino, fh, offset, len = data.len(), "write");
        let mut state = self.state.lock();
        state.write(ino, fh, offset, data)
    }

    pub fn lseek(&self, ino: u64, fh: u64, offset: i64, whence: i32) -> Result<u64> {
        tracing::trace!(ino, fh, offset, whence, "lseek");
        let state = self.state.lock();
        state.check_handle(ino, fh)?;
        if offset < 0 {
            return Err(Errno::ENXIO);
        }
        let offset = offset as u64;
        let inode = state.inode(ino)?;
        match whence {
            libc::SEEK_DATA => inode.blocks.seek_data(offset).ok_or(Errno::ENXIO),
            libc::SEEK_HOLE => Ok(inode.blocks.seek_hole(offset)),
            _ => Err(Errno::EINVAL),
        }
    }

    pub fn fallocate(&self, ino: u64, fh: u64, offset: u64, len: u64, mode: i32) -> Result<()> {
        tracing::trace!(ino, fh, offset, len, mode, "fallocate");
        let mut state = self.state.lock();
        state.fallocate(ino, fh, offset, len, mode)
    }

    pub fn release(&self, ino: u64, fh: u64) -> Result<()> {
        tracing::trace!(ino, fh, "release");
        let mut state = self.state.lock();
        state.release(ino, fh);
        drop(state);
        self.lock_waiters.notify_all();
        Ok(())
    }

    pub fn flush(&self, ino: u64, fh: u64, lock_owner: u64) -> Result<()> {
        tracing::trace!(ino, fh, lock_owner, "flush");
        let mut state = self.state.lock();
        state.locks.flush_owner(ino, lock_owner);
        drop(state);
        self.lock_waiters.notify_all();
        Ok(())
    }

    /// All state is in memory; nothing to sync.
    pub fn fsync(&self, _ino: u64, _fh: u64, _datasync: bool) -> Result<()> {
        Ok(())
    }

    /// Inode lifetimes are governed by links and open handles, not
    /// kernel lookup counts.
    pub fn forget(&self, _ino: u64, _nlookup: u64) {}

    pub fn getlk(
        &self,
        ino: u64,
        fh: u64,
        owner: u64,
        lock: FuseLock,
        flags: u32,
    ) -> Result<FuseLock> {
        tracing::trace!(ino, fh, owner, ?lock, flags, "getlk");
        let mut state = self.state.lock();
        state.check_handle(ino, fh)?;
        if lock.typ > LOCK_WRITE {
            return Err(Errno::EINVAL);
        }
        let key = lock_key(ino, fh, owner, flags);
        if flags & LOCK_FLAG_OFD == 0 {
            state.record_lock_owner(fh, owner);
        }
        Ok(state
            .locks
            .find_conflict(&key, &lock)
            .unwrap_or_else(FuseLock::unlocked))
    }

    pub fn setlk(
        &self,
        ino: u64,
        fh: u64,
        owner: u64,
        lock: FuseLock,
        flags: u32,
        block: bool,
    ) -> Result<()> {
        tracing::trace!(ino, fh, owner, ?lock, flags, block, "setlk");
        let mut state = self.state.lock();
        state.check_handle(ino, fh)?;
        if !validate_lock_type(lock.typ) {
            return Err(Errno::EINVAL);
        }
        let key = lock_key(ino, fh, owner, flags);
        if flags & LOCK_FLAG_OFD == 0 {
            state.record_lock_owner(fh, owner);
        }
        if lock.typ == LOCK_UNLOCK {
            state.locks.unlock(&key, lock.start, lock.end);
            drop(state);
            self.lock_waiters.notify_all();
            return Ok(());
        }
        loop {
            if state.locks.find_conflict(&key, &lock).is_none() {
                state.locks.grant(key, &lock);
                drop(state);
                self.lock_waiters.notify_all();
                return Ok(());
            }
            if !block {
                return Err(Errno::EAGAIN);
            }
            self.lock_waiters.wait(&mut state);
            // the wait is abandoned once the requesting handle closes
            if !state.handles.contains_key(&fh) {
                return Err(Errno::EINTR);
            }
        }
    }

    pub fn getxattr(&self, ino: u64, name: &str) -> Result<Vec<u8>> {
        tracing::trace!(ino, name, "getxattr");
        let state = self.state.lock();
        state
            .inode(ino)?
            .xattrs
            .get(name)
            .cloned()
            .ok_or(Errno::ENODATA)
    }

    pub fn listxattr(&self, ino: u64) -> Result<Vec<u8>> {
        tracing::trace!(ino, "listxattr");
        let state = self.state.lock();
        let mut out = Vec::new();
        for name in state.inode(ino)?.xattrs.keys() {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
        }
        Ok(out)
    }

    pub fn setxattr(&self, ino: u64, name: &str, value: &[u8], flags: i32) -> Result<()> {
        tracing::trace!(ino, name, len = value.len(), flags, "setxattr");
        let mut state = self.state.lock();
        state.setxattr(ino, name, value, flags)
    }

    pub fn removexattr(&self, ino: u64, name: &str) -> Result<()> {
        tracing::trace!(ino, name, "removexattr");
        let mut state = self.state.lock();
        let time = now();
        let inode = state.inode_mut(ino)?;
        if inode.xattrs.remove(name).is_none() {
            return Err(Errno::ENODATA);
        }
        inode.touch_ctime(time);
        Ok(())
    }

    /// Mount an abstract file at the given absolute path, creating
    /// intermediate directories and following any symlinks found
    /// along the way.
    pub fn add_abstract_file(&self, path: &str, file: Arc<dyn AbstractFile>) -> Result<u64> {
        tracing::debug!(path, "mounting abstract file");
        let mut state = self.state.lock();
        state.add_abstract(path, AbstractNode::File(file))
    }

    /// Mount an abstract directory at the given absolute path.
    pub fn add_abstract_dir(&self, path: &str, dir: Arc<dyn AbstractDir>) -> Result<u64> {
        tracing::debug!(path, "mounting abstract dir");
        let mut state = self.state.lock();
        state.add_abstract(path, AbstractNode::Dir(dir))
    }
}

impl FsState {
    pub(crate) fn inode(&self, ino: u64) -> Result<&Inode> {
        self.inodes.get(&ino).ok_or(Errno::ENOENT)
    }

    pub(crate) fn inode_mut(&mut self, ino: u64) -> Result<&mut Inode> {
        self.inodes.get_mut(&ino).ok_or(Errno::ENOENT)
    }

    fn alloc_ino(&mut self) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    pub(crate) fn alloc_handle(&mut self) -> u64 {
        let fh = self.next_handle;
        self.next_handle += 1;
        fh
    }

    pub(crate) fn check_handle(&self, ino: u64, fh: u64) -> Result<()> {
        match self.handles.get(&fh) {
            Some(handle) if handle.ino == ino => Ok(()),
            _ => Err(Errno::EBADF),
        }
    }

    fn record_lock_owner(&mut self, fh: u64, owner: u64) {
        if let Some(handle) = self.handles.get_mut(&fh) {
            handle.lock_owner = Some(owner);
        }
    }

    fn open_handle(&mut self, ino: u64) -> u64 {
        let fh = self.alloc_handle();
        self.handles.insert(
            fh,
            FileHandle {
                ino,
                lock_owner: None,
            },
        );
        if let Some(inode) = self.inodes.get_mut(&ino) {
            inode.open_refs += 1;
        }
        fh
    }

    fn release(&mut self, ino: u64, fh: u64) {
        let Some(handle) = self.handles.remove(&fh) else {
            return;
        };
        debug_assert_eq!(handle.ino, ino);
        self.locks.release_handle(handle.ino, fh, handle.lock_owner);
        if let Some(inode) = self.inodes.get_mut(&handle.ino) {
            inode.open_refs = inode.open_refs.saturating_sub(1);
        }
        self.reap_if_unused(handle.ino);
    }

    pub(crate) fn reap_if_unused(&mut self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(inode) = self.inodes.get(&ino) else {
            return;
        };
        if inode.unlinked() && inode.open_refs == 0 {
            tracing::trace!(ino, "reaping unlinked inode");
            self.inodes.remove(&ino);
        }
    }

    /// Resolve one child name, falling back to the directory's
    /// abstract backing for names never seen before. An unlinked name
    /// stays gone: the deleted-edge marker blocks re-materialization.
    pub(crate) fn lookup_child(&mut self, parent: u64, name: &str) -> Result<u64> {
        let parent_node = self.inode(parent)?;
        if !parent_node.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if let Some(&child) = parent_node.children.get(name) {
            return Ok(child);
        }
        if parent_node.deleted_edges.contains(name) {
            return Err(Errno::ENOENT);
        }
        let Some(delegate) = parent_node.dir_delegate.clone() else {
            return Err(Errno::ENOENT);
        };
        let node = match delegate.lookup(name) {
            Ok(node) => node,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(Errno::ENOENT),
            Err(err) => {
                tracing::warn!(parent, name, ?err, "abstract lookup failed");
                return Err(Errno::EIO);
            }
        };
        self.materialize(parent, name, node)
    }

    /// Give an abstract node an inode and cache the edge to it.
    fn materialize(&mut self, parent: u64, name: &str, node: AbstractNode) -> Result<u64> {
        let time = now();
        let ino = self.alloc_ino();
        let (default_uid, default_gid) = (self.config.uid, self.config.gid);
        let mut inode = match node {
            AbstractNode::File(file) => {
                let (size, perm) = file.stat().map_err(|_| Errno::EIO)?;
                let mut inode = Inode::new(
                    ino,
                    parent,
                    name,
                    libc::S_IFREG | (perm & 0o7777),
                    time,
                );
                inode.blocks.set_len(size);
                if let Ok(mtime) = file.mod_time() {
                    inode.mtime = mtime;
                }
                let owner = file.owner();
                inode.file_delegate = Some(file);
                apply_owner(&mut inode, owner, default_uid, default_gid);
                inode
            }
            AbstractNode::Dir(dir) => {
                let perm = dir.stat().map_err(|_| Errno::EIO)?;
                let mut inode =
                    Inode::new(ino, parent, name, libc::S_IFDIR | (perm & 0o7777), time);
                if let Ok(mtime) = dir.mod_time() {
                    inode.mtime = mtime;
                }
                let owner = dir.owner();
                inode.dir_delegate = Some(dir);
                apply_owner(&mut inode, owner, default_uid, default_gid);
                inode
            }
            AbstractNode::Symlink(symlink) => {
                let perm = symlink.stat().unwrap_or(0o777);
                let mut inode =
                    Inode::new(ino, parent, name, libc::S_IFLNK | (perm & 0o7777), time);
                inode.link_target = Some(symlink.target().map_err(|_| Errno::EIO)?);
                if let Ok(mtime) = symlink.mod_time() {
                    inode.mtime = mtime;
                }
                apply_owner(&mut inode, symlink.owner(), default_uid, default_gid);
                inode
            }
        };
        inode.raw_mode = inode.mode;
        self.inodes.insert(ino, inode);
        self.inode_mut(parent)?.children.insert(name.to_string(), ino);
        tracing::trace!(parent, name, ino, "materialized abstract node");
        Ok(ino)
    }

    /// Stream an abstract file's content into the block store and
    /// drop the delegate. Called before any mutation of the content.
    pub(crate) fn copy_up(&mut self, ino: u64) -> Result<()> {
        let Some(delegate) = self.inode(ino)?.file_delegate.clone() else {
            return Ok(());
        };
        let (size, _) = delegate.stat().map_err(|_| Errno::EIO)?;
        let mut blocks = BlockStore::default();
        let mut offset = 0;
        while offset < size {
            let want = (size - offset).min(MAX_WRITE_SIZE as u64);
            let chunk = delegate.read_at(offset, want).map_err(|_| Errno::EIO)?;
            if chunk.is_empty() {
                break;
            }
            blocks.write(offset, &chunk);
            offset += chunk.len() as u64;
        }
        if size > blocks.len() {
            blocks.set_len(size);
        }
        let inode = self.inode_mut(ino)?;
        inode.blocks = blocks;
        inode.file_delegate = None;
        tracing::debug!(ino, size, "copied up abstract file");
        Ok(())
    }

    fn read(&mut self, ino: u64, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>> {
        self.check_handle(ino, fh)?;
        let time = now();
        let inode = self.inode(ino)?;
        let data = match inode.file_delegate.clone() {
            Some(delegate) => {
                let len = inode.blocks.len();
                if offset >= len {
                    Vec::new()
                } else {
                    let want = (len - offset).min(size as u64);
                    delegate.read_at(offset, want).map_err(|_| Errno::EIO)?
                }
            }
            None => inode.blocks.read(offset, size as u64),
        };
        self.inode_mut(ino)?.touch_atime(time);
        Ok(data)
    }

    fn write(&mut self, ino: u64, fh: u64, offset: u64, data: &[u8]) -> Result<u32> {
        self.check_handle(ino, fh)?;
        self.copy_up(ino)?;
        let time = now();
        let inode = self.inode_mut(ino)?;
        inode.blocks.write(offset, data);
        inode.clear_suid_sgid();
        inode.touch_mtime(time);
        inode.touch_ctime(time);
        Ok(data.len() as u32)
    }

    fn fallocate(&mut self, ino: u64, fh: u64, offset: u64, len: u64, mode: i32) -> Result<()> {
        self.check_handle(ino, fh)?;
        let allowed = libc::FALLOC_FL_KEEP_SIZE | libc::FALLOC_FL_PUNCH_HOLE;
        if mode & !allowed != 0 {
            return Err(Errno::EOPNOTSUPP);
        }
        if mode & libc::FALLOC_FL_PUNCH_HOLE != 0 && mode & libc::FALLOC_FL_KEEP_SIZE == 0 {
            return Err(Errno::EINVAL);
        }
        if len == 0 {
            return Err(Errno::EINVAL);
        }
        if self.inode(ino)?.file_delegate.is_some() {
            return Err(Errno::EOPNOTSUPP);
        }
        let time = now();
        let inode = self.inode_mut(ino)?;
        let old_size = inode.blocks.len();
        if mode & libc::FALLOC_FL_PUNCH_HOLE != 0 {
            inode.blocks.punch(offset, len);
        } else {
            inode.blocks.allocate(offset, len);
            if mode & libc::FALLOC_FL_KEEP_SIZE == 0 && offset + len > old_size {
                inode.blocks.set_len(offset + len);
            }
        }
        if inode.blocks.len() != old_size {
            inode.touch_mtime(time);
        }
        inode.touch_ctime(time);
        Ok(())
    }

    fn setattr(&mut self, req: &Request, ino: u64, set: SetAttrs) -> Result<FuseAttr> {
        let time = now();
        let parent_default = {
            let parent = self.inode(ino)?.parent;
            self.parent_default_acl(parent)
        };
        if set.size.is_some() {
            self.copy_up(ino)?;
        }
        let inode = self.inode_mut(ino)?;
        let mut changed = false;
        if let Some(size) = set.size {
            let old_size = inode.blocks.len();
            inode.blocks.truncate(size);
            inode.clear_suid_sgid();
            if size != old_size {
                inode.touch_mtime(time);
            }
            changed = true;
        }
        if let Some(mode) = set.mode {
            let mut perm = mode & 0o7777;
            if req.uid != 0 && perm & libc::S_ISGID != 0 && inode.gid != req.gid {
                perm &= !libc::S_ISGID;
            }
            if let Some(acl) = &parent_default {
                perm = (perm & !0o070) | (acl.group_perm() << 3);
            }
            inode.mode = (inode.mode & !0o7777) | perm;
            changed = true;
        }
        if set.uid.is_some() || set.gid.is_some() {
            if let Some(uid) = set.uid {
                inode.uid = uid;
            }
            if let Some(gid) = set.gid {
                inode.gid = gid;
            }
            inode.clear_suid_sgid();
            changed = true;
        }
        if let Some(atime) = set.atime {
            monotonic(&mut inode.atime, atime);
            changed = true;
        }
        if let Some(mtime) = set.mtime {
            monotonic(&mut inode.mtime, mtime);
            changed = true;
        }
        if changed {
            inode.touch_ctime(time);
        }
        Ok(inode.attr())
    }

    fn setxattr(&mut self, ino: u64, name: &str, value: &[u8], flags: i32) -> Result<()> {
        let time = now();
        let exists = self.inode(ino)?.xattrs.contains_key(name);
        if flags & libc::XATTR_CREATE != 0 && exists {
            return Err(Errno::EEXIST);
        }
        if flags & libc::XATTR_REPLACE != 0 && !exists {
            return Err(Errno::ENODATA);
        }
        if name == ACL_XATTR_ACCESS {
            let acl = Acl::parse(value)?;
            let inode = self.inode_mut(ino)?;
            inode.mode = (inode.mode & !0o777) | acl.mode_bits();
            if acl.is_minimal() {
                // mode bits alone carry a minimal acl
                inode.xattrs.remove(ACL_XATTR_ACCESS);
            } else {
                inode.xattrs.insert(name.to_string(), value.to_vec());
            }
            inode.touch_ctime(time);
            return Ok(());
        }
        if name == ACL_XATTR_DEFAULT {
            Acl::parse(value)?;
        }
        let inode = self.inode_mut(ino)?;
        inode.xattrs.insert(name.to_string(), value.to_vec());
        inode.touch_ctime(time);
        Ok(())
    }

    /// The parsed default ACL of a directory, if it carries one.
    fn parent_default_acl(&self, parent: u64) -> Option<Acl> {
        self.inodes
            .get(&parent)
            .and_then(|p| p.xattrs.get(ACL_XATTR_DEFAULT))
            .and_then(|blob| Acl::parse(blob).ok())
    }

    /// The permission bits and inherited access ACL for a new
    /// non-directory child of `parent`.
    fn creation_perm(
        &self,
        parent: u64,
        mode: u32,
        umask: u32,
    ) -> (u32, Option<Vec<u8>>) {
        let mut perm = mode & 0o7777 & !umask;
        let mut inherited = None;
        if let Some(acl) = self.parent_default_acl(parent) {
            perm = (perm & !0o070) | (acl.group_perm() << 3);
            let mut access = acl;
            if mode & 0o111 == 0 {
                access.strip_exec();
            }
            if !access.is_minimal() {
                inherited = Some(access.encode());
            }
        }
        (perm, inherited)
    }

    fn creation_gid(&self, parent: u64, req_gid: u32) -> u32 {
        match self.inodes.get(&parent) {
            Some(p) if p.mode & libc::S_ISGID != 0 => p.gid,
            _ => req_gid,
        }
    }

    fn link_edge(&mut self, parent: u64, name: &str, child: u64, time: SystemTime) -> Result<()> {
        let parent_node = self.inode_mut(parent)?;
        parent_node.children.insert(name.to_string(), child);
        parent_node.deleted_edges.remove(name);
        parent_node.touch_mtime(time);
        parent_node.touch_ctime(time);
        Ok(())
    }

    fn unlink_edge(&mut self, parent: u64, name: &str, time: SystemTime) -> Result<()> {
        let parent_node = self.inode_mut(parent)?;
        parent_node.children.shift_remove(name);
        if parent_node.dir_delegate.is_some() {
            parent_node.deleted_edges.insert(name.to_string());
        }
        parent_node.touch_mtime(time);
        parent_node.touch_ctime(time);
        Ok(())
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
        flags: i32,
    ) -> Result<(u64, u64, FuseAttr)> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        match self.lookup_child(parent, name) {
            Ok(existing) => {
                if flags & libc::O_EXCL != 0 {
                    return Err(Errno::EEXIST);
                }
                let inode = self.inode(existing)?;
                if inode.is_dir() {
                    return Err(Errno::EISDIR);
                }
                let attr = inode.attr();
                let fh = self.open_handle(existing);
                return Ok((existing, fh, attr));
            }
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        let type_bits = mode & libc::S_IFMT;
        if type_bits != 0 && type_bits != libc::S_IFREG {
            return Err(Errno::EINVAL);
        }
        let (perm, inherited) = self.creation_perm(parent, mode, umask);
        let time = now();
        let ino = self.alloc_ino();
        let mut inode = Inode::new(ino, parent, name, libc::S_IFREG | perm, time);
        inode.raw_mode = mode;
        inode.uid = req.uid;
        inode.gid = self.creation_gid(parent, req.gid);
        if let Some(blob) = inherited {
            inode.xattrs.insert(ACL_XATTR_ACCESS.to_string(), blob);
        }
        self.inodes.insert(ino, inode);
        self.link_edge(parent, name, ino, time)?;
        let fh = self.open_handle(ino);
        let attr = self.inode(ino)?.attr();
        Ok((ino, fh, attr))
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
        rdev: u32,
    ) -> Result<FuseAttr> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        match self.lookup_child(parent, name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        match mode & libc::S_IFMT {
            0 | libc::S_IFREG | libc::S_IFCHR | libc::S_IFBLK | libc::S_IFIFO | libc::S_IFSOCK => {}
            libc::S_IFDIR => return Err(Errno::EPERM),
            _ => return Err(Errno::EINVAL),
        }
        let (perm, inherited) = self.creation_perm(parent, mode, umask);
        let time = now();
        let ino = self.alloc_ino();
        let mut inode = Inode::new(ino, parent, name, libc::S_IFREG | perm, time);
        inode.raw_mode = mode;
        inode.rdev = rdev;
        inode.uid = req.uid;
        inode.gid = self.creation_gid(parent, req.gid);
        if let Some(blob) = inherited {
            inode.xattrs.insert(ACL_XATTR_ACCESS.to_string(), blob);
        }
        self.inodes.insert(ino, inode);
        self.link_edge(parent, name, ino, time)?;
        Ok(self.inode(ino)?.attr())
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &str,
        mode: u32,
        umask: u32,
    ) -> Result<FuseAttr> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        match self.lookup_child(parent, name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        let default_blob = self
            .inode(parent)?
            .xattrs
            .get(ACL_XATTR_DEFAULT)
            .cloned();
        let requested = mode & 0o7777;
        let perm = match default_blob.as_deref().and_then(|b| Acl::parse(b).ok()) {
            None => requested & !umask,
            Some(acl) => {
                // the acl supplies the permission bits, but execute is
                // never wider than what mkdir itself asked for
                let base = acl.mode_bits();
                (requested & 0o7000) | (base & !0o111) | (base & requested & 0o111)
            }
        };
        let time = now();
        let ino = self.alloc_ino();
        let mut inode = Inode::new(ino, parent, name, libc::S_IFDIR | perm, time);
        inode.uid = req.uid;
        inode.gid = self.creation_gid(parent, req.gid);
        if let Some(blob) = default_blob {
            inode
                .xattrs
                .insert(ACL_XATTR_ACCESS.to_string(), blob.clone());
            inode.xattrs.insert(ACL_XATTR_DEFAULT.to_string(), blob);
        }
        self.inodes.insert(ino, inode);
        self.link_edge(parent, name, ino, time)?;
        Ok(self.inode(ino)?.attr())
    }

    fn symlink(&mut self, req: &Request, parent: u64, name: &str, target: &str) -> Result<FuseAttr> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        match self.lookup_child(parent, name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        let time = now();
        let ino = self.alloc_ino();
        let mut inode = Inode::new(ino, parent, name, libc::S_IFLNK | 0o777, time);
        inode.link_target = Some(target.to_string());
        inode.uid = req.uid;
        inode.gid = self.creation_gid(parent, req.gid);
        self.inodes.insert(ino, inode);
        self.link_edge(parent, name, ino, time)?;
        Ok(self.inode(ino)?.attr())
    }

    fn link(&mut self, ino: u64, newparent: u64, newname: &str) -> Result<FuseAttr> {
        let name = require_name(newname)?;
        if !self.inode(newparent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if self.inode(ino)?.is_dir() {
            return Err(Errno::EPERM);
        }
        match self.lookup_child(newparent, name) {
            Ok(_) => return Err(Errno::EEXIST),
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        let time = now();
        {
            let inode = self.inode_mut(ino)?;
            inode.nlink += 1;
            inode.touch_ctime(time);
        }
        self.link_edge(newparent, name, ino, time)?;
        Ok(self.inode(ino)?.attr())
    }

    fn unlink(&mut self, parent: u64, name: &str) -> Result<()> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let child = self.lookup_child(parent, name)?;
        if self.inode(child)?.is_dir() {
            return Err(Errno::EISDIR);
        }
        let time = now();
        self.unlink_edge(parent, name, time)?;
        let inode = self.inode_mut(child)?;
        inode.nlink = inode.nlink.saturating_sub(1);
        inode.touch_ctime(time);
        self.reap_if_unused(child);
        Ok(())
    }

    /// A directory is empty when it has no live edges and its
    /// backing (if any) lists nothing that is not deleted.
    fn dir_is_empty(&self, ino: u64) -> Result<bool> {
        let inode = self.inode(ino)?;
        if !inode.children.is_empty() {
            return Ok(false);
        }
        if let Some(delegate) = inode.dir_delegate.clone() {
            let entries = delegate.read_dir().map_err(|_| Errno::EIO)?;
            for entry in entries {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                if !inode.deleted_edges.contains(&entry.name) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn rmdir(&mut self, parent: u64, name: &str) -> Result<()> {
        let name = require_name(name)?;
        if !self.inode(parent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let child = self.lookup_child(parent, name)?;
        if !self.inode(child)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if !self.dir_is_empty(child)? {
            return Err(Errno::ENOTEMPTY);
        }
        let time = now();
        self.unlink_edge(parent, name, time)?;
        let inode = self.inode_mut(child)?;
        inode.nlink = 0;
        inode.touch_ctime(time);
        self.reap_if_unused(child);
        Ok(())
    }

    fn rename(
        &mut self,
        oldparent: u64,
        oldname: &str,
        newparent: u64,
        newname: &str,
        flags: u32,
    ) -> Result<()> {
        if flags & !RENAME_NOREPLACE != 0 {
            return Err(Errno::EINVAL);
        }
        let oldname = require_name(oldname)?;
        let newname = require_name(newname)?;
        if !self.inode(oldparent)?.is_dir() || !self.inode(newparent)?.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        let child = self.lookup_child(oldparent, oldname)?;
        if oldparent == newparent && oldname == newname {
            return Ok(());
        }
        let time = now();
        match self.lookup_child(newparent, newname) {
            Ok(target) => {
                if flags & RENAME_NOREPLACE != 0 {
                    return Err(Errno::EEXIST);
                }
                let child_is_dir = self.inode(child)?.is_dir();
                let target_is_dir = self.inode(target)?.is_dir();
                if target_is_dir && !child_is_dir {
                    return Err(Errno::EISDIR);
                }
                if !target_is_dir && child_is_dir {
                    return Err(Errno::ENOTDIR);
                }
                if target_is_dir && !self.dir_is_empty(target)? {
                    return Err(Errno::ENOTEMPTY);
                }
                self.unlink_edge(newparent, newname, time)?;
                let target_node = self.inode_mut(target)?;
                if target_is_dir {
                    target_node.nlink = 0;
                } else {
                    target_node.nlink = target_node.nlink.saturating_sub(1);
                }
                target_node.touch_ctime(time);
                self.reap_if_unused(target);
            }
            Err(err) if err == Errno::ENOENT => {}
            Err(err) => return Err(err),
        }
        self.unlink_edge(oldparent, oldname, time)?;
        self.link_edge(newparent, newname, child, time)?;
        let inode = self.inode_mut(child)?;
        inode.parent = newparent;
        inode.name = newname.to_string();
        inode.touch_ctime(time);
        Ok(())
    }

    /// Walk an absolute path for mounting, creating intermediate
    /// directories and restarting at any symlink found on the way.
    fn walk_for_insert(&mut self, path: &str) -> Result<(u64, String)> {
        let mut comps: VecDeque<String> = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(String::from)
            .collect();
        if comps.is_empty() {
            return Err(Errno::EINVAL);
        }
        let mut current = ROOT_INO;
        let mut restarts = 0;
        while let Some(comp) = comps.pop_front() {
            if comp == ".." {
                current = self.inode(current)?.parent;
                continue;
            }
            if comp.len() > MAX_NAME_LEN {
                return Err(Errno::ENAMETOOLONG);
            }
            let is_last = comps.is_empty();
            match self.lookup_child(current, &comp) {
                Ok(next) => {
                    if let Some(target) = self.inode(next)?.link_target.clone() {
                        restarts += 1;
                        if restarts > MAX_SYMLINK_RESTARTS {
                            return Err(Errno::ELOOP);
                        }
                        if target.starts_with('/') {
                            current = ROOT_INO;
                        }
                        let mut rewound: VecDeque<String> = target
                            .split('/')
                            .filter(|c| !c.is_empty() && *c != ".")
                            .map(String::from)
                            .collect();
                        rewound.append(&mut comps);
                        comps = rewound;
                        continue;
                    }
                    if is_last {
                        return Ok((current, comp));
                    }
                    if !self.inode(next)?.is_dir() {
                        return Err(Errno::ENOTDIR);
                    }
                    current = next;
                }
                Err(err) if err == Errno::ENOENT => {
                    if is_last {
                        return Ok((current, comp));
                    }
                    current = self.make_intermediate_dir(current, &comp)?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(Errno::EINVAL)
    }

    fn make_intermediate_dir(&mut self, parent: u64, name: &str) -> Result<u64> {
        let time = now();
        let ino = self.alloc_ino();
        let mut inode = Inode::new(ino, parent, name, libc::S_IFDIR | 0o755, time);
        inode.uid = self.config.uid;
        inode.gid = self.config.gid;
        self.inodes.insert(ino, inode);
        self.link_edge(parent, name, ino, time)?;
        Ok(ino)
    }

    fn add_abstract(&mut self, path: &str, node: AbstractNode) -> Result<u64> {
        let (parent, leaf) = self.walk_for_insert(path)?;
        if self.inode(parent)?.children.contains_key(&leaf) {
            return Err(Errno::EEXIST);
        }
        self.inode_mut(parent)?.deleted_edges.remove(&leaf);
        self.materialize(parent, &leaf, node)
    }
}

fn apply_owner(inode: &mut Inode, owner: Option<(u32, u32)>, default_uid: u32, default_gid: u32) {
    let (uid, gid) = owner.unwrap_or((default_uid, default_gid));
    inode.uid = uid;
    inode.gid = gid;
}
