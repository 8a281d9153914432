// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{LockKey, LockManager};
use crate::proto::{FuseLock, LOCK_READ, LOCK_UNLOCK, LOCK_WRITE};

fn wr(start: u64, end: u64) -> FuseLock {
    FuseLock { start, end, typ: LOCK_WRITE, pid: 42 }
}

fn rd(start: u64, end: u64) -> FuseLock {
    FuseLock { start, end, typ: LOCK_READ, pid: 42 }
}

const ALICE: LockKey = LockKey::Posix { ino: 5, owner: 0xAA };
const BOB: LockKey = LockKey::Posix { ino: 5, owner: 0xBB };
const OFD: LockKey = LockKey::Ofd { ino: 5, fh: 7 };

#[rstest]
fn test_write_locks_conflict_across_owners() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &wr(0, 99));
    assert!(locks.find_conflict(&BOB, &wr(50, 150)).is_some());
    assert!(locks.find_conflict(&BOB, &rd(0, 0)).is_some());
    assert!(locks.find_conflict(&BOB, &wr(100, 200)).is_none(), "ranges are inclusive");
}

#[rstest]
fn test_read_locks_share() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &rd(0, 99));
    assert!(locks.find_conflict(&BOB, &rd(0, 99)).is_none());
    assert!(locks.find_conflict(&BOB, &wr(0, 0)).is_some());
}

#[rstest]
fn test_same_key_never_conflicts() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &wr(0, 99));
    assert!(locks.find_conflict(&ALICE, &wr(0, 99)).is_none());
}

#[rstest]
fn test_posix_and_ofd_tables_contend() {
    let mut locks = LockManager::default();
    locks.grant(OFD, &wr(0, 9));
    let conflict = locks.find_conflict(&ALICE, &wr(5, 5)).unwrap();
    assert_eq!(conflict.pid, 0, "ofd conflicts report no pid");
    assert_eq!((conflict.start, conflict.end), (0, 9));
}

#[rstest]
fn test_grant_merges_overlapping_ranges() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &rd(0, 49));
    locks.grant(ALICE, &wr(25, 99));
    let held = locks.held(&ALICE);
    assert_eq!(held.len(), 1);
    assert_eq!((held[0].start, held[0].end, held[0].typ), (0, 99, LOCK_WRITE));
}

#[rstest]
fn test_grant_keeps_disjoint_ranges_apart() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &rd(0, 9));
    locks.grant(ALICE, &rd(100, 109));
    assert_eq!(locks.held(&ALICE).len(), 2);
}

#[rstest]
fn test_unlock_splits_at_boundaries() {
    let mut locks = LockManager::default();
    locks.grant(ALICE, &wr(0, 99));
    locks.unlock(&ALICE, 40, 59);
    let mut held = locks.held(&ALICE).to_vec();
    held.sort_by_key(|r| r.start);
    assert_eq!(held.len(), 2);
    assert_eq!((held[0].start, held[0].end), (0, 39));
    assert_eq!((held[1].start, held[1].end), (60, 99));
    assert!(locks.find_conflict(&BOB, &wr(45, 45)).is_none());
}

#[rstest]
fn test_release_handle_drops_both_kinds() {
    let mut locks = LockManager::default();
    locks.grant(OFD, &wr(0, 9));
    locks.grant(ALICE, &wr(10, 19));
    locks.release_handle(5, 7, Some(0xAA));
    assert!(locks.find_conflict(&BOB, &wr(0, 100)).is_none());
}

#[rstest]
fn test_flush_owner_leaves_ofd_locks() {
    let mut locks = LockManager::default();
    locks.grant(OFD, &wr(0, 9));
    locks.grant(ALICE, &wr(10, 19));
    locks.flush_owner(5, 0xAA);
    assert!(locks.find_conflict(&BOB, &wr(10, 19)).is_none());
    assert!(locks.find_conflict(&BOB, &wr(0, 9)).is_some(), "ofd locks survive flush");
}

#[rstest]
fn test_validate_lock_type() {
    assert!(super::validate_lock_type(LOCK_READ));
    assert!(super::validate_lock_type(LOCK_WRITE));
    assert!(super::validate_lock_type(LOCK_UNLOCK));
    assert!(!super::validate_lock_type(3));
}
