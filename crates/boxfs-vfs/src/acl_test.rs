// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{
    apply_acl_to_mode, Acl, AclEntry, ACL_GROUP_OBJ, ACL_MASK, ACL_OTHER, ACL_USER, ACL_USER_OBJ,
};
use crate::Errno;

fn extended_acl() -> Acl {
    Acl {
        entries: vec![
            AclEntry { tag: ACL_USER_OBJ, perm: 7, id: u32::MAX },
            AclEntry { tag: ACL_USER, perm: 6, id: 1000 },
            AclEntry { tag: ACL_GROUP_OBJ, perm: 5, id: u32::MAX },
            AclEntry { tag: ACL_MASK, perm: 4, id: u32::MAX },
            AclEntry { tag: ACL_OTHER, perm: 0, id: u32::MAX },
        ],
    }
}

#[rstest]
fn test_acl_wire_round_trip() {
    let acl = extended_acl();
    let parsed = Acl::parse(&acl.encode()).unwrap();
    assert_eq!(parsed, acl);
}

#[rstest]
fn test_acl_parse_rejects_bad_version() {
    let mut blob = extended_acl().encode();
    blob[0] = 9;
    assert_eq!(Acl::parse(&blob), Err(Errno::EINVAL));
}

#[rstest]
#[case(&[1, 0, 0])] // shorter than the version field
#[case(&[2, 0, 0, 0, 1, 0, 7, 0])] // torn entry
fn test_acl_parse_rejects_truncation(#[case] blob: &[u8]) {
    assert_eq!(Acl::parse(blob), Err(Errno::EINVAL));
}

#[rstest]
fn test_minimal_detection() {
    assert!(Acl::from_mode(0o754).is_minimal());
    assert!(!extended_acl().is_minimal());
}

#[rstest]
fn test_mode_bits_prefer_the_mask() {
    // group bits come from the mask when present
    assert_eq!(extended_acl().mode_bits(), 0o740);
    assert_eq!(Acl::from_mode(0o754).mode_bits(), 0o754);
}

#[rstest]
fn test_group_perm_is_max_of_mask_and_group() {
    assert_eq!(extended_acl().group_perm(), 5);
    let mut acl = extended_acl();
    acl.entries.retain(|e| e.tag != ACL_MASK);
    assert_eq!(acl.group_perm(), 5);
}

#[rstest]
fn test_apply_preserves_special_bits() {
    let mode = libc::S_IFREG | 0o4000 | 0o600;
    let applied = apply_acl_to_mode(mode, &Acl::from_mode(0o755));
    assert_eq!(applied, libc::S_IFREG | 0o4000 | 0o755);
}

#[rstest]
fn test_strip_exec() {
    let mut acl = extended_acl();
    acl.strip_exec();
    assert!(acl.entries.iter().all(|e| e.perm & 1 == 0));
    assert_eq!(acl.find(ACL_USER_OBJ).unwrap().perm, 6);
}
