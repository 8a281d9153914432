// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::sync::Arc;

use rstest::rstest;

use crate::fixtures::*;
use crate::inode::ROOT_INO;
use crate::{Errno, Filesystem, Request};

/// Decode the dirent records in one READDIR reply.
fn parse_dirents(bytes: &[u8]) -> Vec<(u64, u64, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let ino = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        let off = u64::from_le_bytes(bytes[pos + 8..pos + 16].try_into().unwrap());
        let namelen = u32::from_le_bytes(bytes[pos + 16..pos + 20].try_into().unwrap()) as usize;
        let name = String::from_utf8(bytes[pos + 24..pos + 24 + namelen].to_vec()).unwrap();
        out.push((ino, off, name));
        pos += (24 + namelen).next_multiple_of(8);
    }
    out
}

fn names(entries: &[(u64, u64, String)]) -> Vec<&str> {
    entries.iter().map(|(_, _, name)| name.as_str()).collect()
}

#[rstest]
fn test_opendir_on_file_is_enotdir(fs: Filesystem, root_req: Request) {
    let (ino, _fh, _attr) = fs.create(&root_req, ROOT_INO, "f", 0o644, 0, 0).unwrap();
    assert_eq!(fs.opendir(ino), Err(Errno::ENOTDIR));
}

#[rstest]
fn test_readdir_bad_handle(fs: Filesystem) {
    assert_eq!(fs.readdir(ROOT_INO, 99, 0, 4096), Err(Errno::EBADF));
}

#[rstest]
fn test_readdir_lists_sorted_with_dot_entries(fs: Filesystem, root_req: Request) {
    fs.create(&root_req, ROOT_INO, "zebra", 0o644, 0, 0).unwrap();
    fs.create(&root_req, ROOT_INO, "apple", 0o644, 0, 0).unwrap();
    fs.mkdir(&root_req, ROOT_INO, "mango", 0o755, 0).unwrap();

    let fh = fs.opendir(ROOT_INO).unwrap();
    let entries = parse_dirents(&fs.readdir(ROOT_INO, fh, 0, 4096).unwrap());
    assert_eq!(names(&entries), [".", "..", "apple", "mango", "zebra"]);
    // cookies are successive next-indices
    let cookies: Vec<u64> = entries.iter().map(|(_, off, _)| *off).collect();
    assert_eq!(cookies, [1, 2, 3, 4, 5]);
    // root's ".." points back at root
    assert_eq!(entries[1].0, ROOT_INO);
}

#[rstest]
fn test_readdir_pagination(fs: Filesystem, root_req: Request) {
    for name in ["a", "b", "c", "d", "e"] {
        fs.create(&root_req, ROOT_INO, name, 0o644, 0, 0).unwrap();
    }
    let fh = fs.opendir(ROOT_INO).unwrap();
    // room for roughly two records per reply
    let mut cookie = 0;
    let mut seen = Vec::new();
    loop {
        let batch = parse_dirents(&fs.readdir(ROOT_INO, fh, cookie, 80).unwrap());
        let Some(last) = batch.last() else { break };
        cookie = last.1;
        seen.extend(batch.into_iter().map(|(_, _, name)| name));
    }
    assert_eq!(seen, [".", "..", "a", "b", "c", "d", "e"]);
}

#[rstest]
fn test_readdir_past_end_is_eof(fs: Filesystem) {
    let fh = fs.opendir(ROOT_INO).unwrap();
    let all = parse_dirents(&fs.readdir(ROOT_INO, fh, 0, 4096).unwrap());
    let reply = fs.readdir(ROOT_INO, fh, all.len() as u64, 4096).unwrap();
    assert!(reply.is_empty());
}

#[rstest]
fn test_readdir_first_dirent_too_big(fs: Filesystem) {
    let fh = fs.opendir(ROOT_INO).unwrap();
    assert_eq!(fs.readdir(ROOT_INO, fh, 0, 8), Err(Errno::EINVAL));
}

// POSIX generic/471: a rewound stream observes entries created after
// the stream was opened and fully consumed.
#[rstest]
fn test_rewinddir_sees_new_entries(fs: Filesystem, root_req: Request) {
    fs.create(&root_req, ROOT_INO, "old", 0o644, 0, 0).unwrap();
    let fh = fs.opendir(ROOT_INO).unwrap();
    let first = parse_dirents(&fs.readdir(ROOT_INO, fh, 0, 4096).unwrap());
    assert_eq!(names(&first), [".", "..", "old"]);

    fs.create(&root_req, ROOT_INO, "new", 0o644, 0, 0).unwrap();
    let rewound = parse_dirents(&fs.readdir(ROOT_INO, fh, 0, 4096).unwrap());
    assert_eq!(names(&rewound), [".", "..", "new", "old"]);
}

#[rstest]
fn test_snapshot_stable_while_paginating(fs: Filesystem, root_req: Request) {
    fs.create(&root_req, ROOT_INO, "a", 0o644, 0, 0).unwrap();
    fs.create(&root_req, ROOT_INO, "b", 0o644, 0, 0).unwrap();
    let fh = fs.opendir(ROOT_INO).unwrap();
    let first = parse_dirents(&fs.readdir(ROOT_INO, fh, 0, 80).unwrap());
    let cookie = first.last().unwrap().1;

    // a name added mid-stream stays invisible until rewind
    fs.create(&root_req, ROOT_INO, "aa", 0o644, 0, 0).unwrap();
    let mut rest = Vec::new();
    let mut cookie = cookie;
    loop {
        let batch = parse_dirents(&fs.readdir(ROOT_INO, fh, cookie, 80).unwrap());
        let Some(last) = batch.last() else { break };
        cookie = last.1;
        rest.extend(batch.into_iter().map(|(_, _, n)| n));
    }
    assert!(!rest.contains(&"aa".to_string()));
}

#[rstest]
fn test_abstract_names_materialize_in_sorted_order(fs: Filesystem) {
    fs.add_abstract_dir(
        "/data",
        Arc::new(MapDir::new([
            ("charlie", b"3" as &[u8]),
            ("alpha", b"1"),
            ("bravo", b"2"),
        ])),
    )
    .unwrap();
    let dir = fs.lookup(ROOT_INO, "data").unwrap().ino;
    let fh = fs.opendir(dir).unwrap();
    let entries = parse_dirents(&fs.readdir(dir, fh, 0, 4096).unwrap());
    assert_eq!(names(&entries), [".", "..", "alpha", "bravo", "charlie"]);
    // sorted pre-materialization makes inode assignment deterministic
    let inos: Vec<u64> = entries[2..].iter().map(|(ino, _, _)| *ino).collect();
    assert!(inos.windows(2).all(|w| w[0] < w[1]));
}

#[rstest]
fn test_readdir_hides_deleted_abstract_names(fs: Filesystem) {
    fs.add_abstract_dir("/data", Arc::new(MapDir::new([("a", b"" as &[u8]), ("b", b"")])))
        .unwrap();
    let dir = fs.lookup(ROOT_INO, "data").unwrap().ino;
    fs.unlink(dir, "a").unwrap();
    let fh = fs.opendir(dir).unwrap();
    let entries = parse_dirents(&fs.readdir(dir, fh, 0, 4096).unwrap());
    assert_eq!(names(&entries), [".", "..", "b"]);
}

#[rstest]
fn test_readdirplus_carries_attributes(fs: Filesystem, root_req: Request) {
    fs.create(&root_req, ROOT_INO, "f", 0o644, 0, 0).unwrap();
    let fh = fs.opendir(ROOT_INO).unwrap();
    let reply = fs.readdirplus(ROOT_INO, fh, 0, 65536).unwrap();
    assert!(!reply.is_empty());
    // the first record leads with the entry_out for "."
    let nodeid = u64::from_le_bytes(reply[..8].try_into().unwrap());
    assert_eq!(nodeid, ROOT_INO);
}
