// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{base_key, copy_op_key, derive_key, run_op_key, snapshot_op_key, CacheKey, CACHE_KEY_LEN};
use crate::encoding::Hasher;

fn assert_key_shape(key: &str) {
    assert_eq!(key.len(), CACHE_KEY_LEN);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[rstest]
fn test_base_key_is_deterministic() {
    let one = base_key("alpine:3.20", "x86_64");
    let two = base_key("alpine:3.20", "x86_64");
    assert_eq!(one, two);
    assert_key_shape(one.as_str());
}

#[rstest]
fn test_base_key_distinguishes_arch() {
    assert_ne!(base_key("alpine:3.20", "x86_64"), base_key("alpine:3.20", "aarch64"));
}

#[rstest]
fn test_derive_key_is_stable_and_injective_in_practice() {
    let parent = base_key("debian:12", "x86_64");
    let one = derive_key(&parent, "snapshot:aaaa");
    assert_eq!(one, derive_key(&parent, "snapshot:aaaa"));
    assert_ne!(one, derive_key(&parent, "snapshot:bbbb"));
    assert_ne!(one, derive_key(&base_key("debian:11", "x86_64"), "snapshot:aaaa"));
    assert_key_shape(one.as_str());
}

#[rstest]
fn test_snapshot_op_key_names_the_layer() {
    let mut hasher = Hasher::default();
    hasher.update(b"layer");
    let digest = hasher.digest();
    assert_eq!(snapshot_op_key(&digest), format!("snapshot:{digest}"));
}

#[rstest]
fn test_run_op_key_separates_command_from_env() {
    // without the sentinel, a trailing argument and a leading
    // environment variable would hash identically
    let a = run_op_key(
        &["sh".to_string(), "FOO=1".to_string()],
        &[],
        "/",
    );
    let b = run_op_key(&["sh".to_string()], &["FOO=1".to_string()], "/");
    assert_ne!(a, b);
    assert_key_shape(&a);
}

#[rstest]
fn test_run_op_key_covers_workdir() {
    let cmd = vec!["make".to_string()];
    assert_ne!(run_op_key(&cmd, &[], "/src"), run_op_key(&cmd, &[], "/build"));
}

#[rstest]
fn test_copy_op_key_is_directional() {
    let mut hasher = Hasher::default();
    hasher.update(b"content");
    let digest = hasher.digest();
    let forward = copy_op_key("/host/a", "/guest/b", &digest);
    let backward = copy_op_key("/guest/b", "/host/a", &digest);
    assert_ne!(forward, backward);
    assert_key_shape(&forward);
}

#[rstest]
fn test_cache_key_display_round_trip() {
    let key = base_key("img", "arm");
    let text = key.to_string();
    assert_eq!(CacheKey::from(text.as_str()), key);
}
