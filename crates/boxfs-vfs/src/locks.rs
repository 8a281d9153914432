// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Byte-range advisory locks, POSIX and open-file-description.
//!
//! Ranges live in per-key lists; a key is either `(inode, owner)`
//! for POSIX locks or `(inode, file handle)` for OFD locks. Conflict
//! checks always consult both kinds, since they contend for the same
//! byte ranges.

use std::collections::HashMap;

use crate::proto::{FuseLock, LOCK_UNLOCK, LOCK_WRITE};

#[cfg(test)]
#[path = "./locks_test.rs"]
mod locks_test;

/// Identifies the holder of a set of lock ranges on one inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Posix { ino: u64, owner: u64 },
    Ofd { ino: u64, fh: u64 },
}

impl LockKey {
    fn ino(&self) -> u64 {
        match self {
            Self::Posix { ino, .. } => *ino,
            Self::Ofd { ino, .. } => *ino,
        }
    }

    fn is_ofd(&self) -> bool {
        matches!(self, Self::Ofd { .. })
    }
}

/// One held byte-range lock. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRange {
    pub start: u64,
    pub end: u64,
    pub typ: u32,
    pub pid: u32,
}

impl LockRange {
    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start <= end && start <= self.end
    }

    fn conflicts_with(&self, typ: u32, start: u64, end: u64) -> bool {
        self.overlaps(start, end) && (self.typ == LOCK_WRITE || typ == LOCK_WRITE)
    }
}

/// All advisory locks held in the filesystem.
#[derive(Debug, Default)]
pub struct LockManager {
    tables: HashMap<LockKey, Vec<LockRange>>,
}

impl LockManager {
    /// Find the first lock held under a different key that would
    /// block the given request.
    pub fn find_conflict(&self, key: &LockKey, probe: &FuseLock) -> Option<FuseLock> {
        for (held_key, ranges) in self.tables.iter() {
            if held_key.ino() != key.ino() || held_key == key {
                continue;
            }
            for range in ranges {
                if range.conflicts_with(probe.typ, probe.start, probe.end) {
                    return Some(FuseLock {
                        start: range.start,
                        end: range.end,
                        typ: range.typ,
                        // OFD locks belong to no single process
                        pid: if held_key.is_ofd() || key.is_ofd() {
                            0
                        } else {
                            range.pid
                        },
                    });
                }
            }
        }
        None
    }

    /// Grant the given lock, coalescing it with any overlapping
    /// ranges already held under the same key. The caller must have
    /// established that no conflicting lock exists.
    pub fn grant(&mut self, key: LockKey, lock: &FuseLock) {
        let ranges = self.tables.entry(key).or_default();
        let mut start = lock.start;
        let mut end = lock.end;
        ranges.retain(|held| {
            if held.overlaps(lock.start, lock.end) {
                start = start.min(held.start);
                end = end.max(held.end);
                false
            } else {
                true
            }
        });
        ranges.push(LockRange {
            start,
            end,
            typ: lock.typ,
            pid: lock.pid,
        });
    }

    /// Drop the requested range from the key's holdings, splitting
    /// any partially-covered range at the boundaries.
    pub fn unlock(&mut self, key: &LockKey, start: u64, end: u64) {
        let Some(ranges) = self.tables.get_mut(key) else {
            return;
        };
        let mut pieces = Vec::new();
        ranges.retain(|held| {
            if !held.overlaps(start, end) {
                return true;
            }
            if held.start < start {
                pieces.push(LockRange {
                    start: held.start,
                    end: start - 1,
                    ..*held
                });
            }
            if held.end > end {
                pieces.push(LockRange {
                    start: end + 1,
                    end: held.end,
                    ..*held
                });
            }
            false
        });
        ranges.extend(pieces);
        if ranges.is_empty() {
            self.tables.remove(key);
        }
    }

    /// Drop everything a closing file handle holds: its OFD locks,
    /// and (when an owner cookie was seen on the handle) the POSIX
    /// locks of that owner.
    pub fn release_handle(&mut self, ino: u64, fh: u64, owner: Option<u64>) {
        self.tables.remove(&LockKey::Ofd { ino, fh });
        if let Some(owner) = owner {
            self.tables.remove(&LockKey::Posix { ino, owner });
        }
    }

    /// Drop all POSIX locks held by the flushing owner.
    pub fn flush_owner(&mut self, ino: u64, owner: u64) {
        self.tables.remove(&LockKey::Posix { ino, owner });
    }

    /// Ranges currently held under a key, for inspection.
    pub fn held(&self, key: &LockKey) -> &[LockRange] {
        self.tables.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A valid SETLK request type is one of read, write or unlock.
pub fn validate_lock_type(typ: u32) -> bool {
    typ <= LOCK_UNLOCK
}
