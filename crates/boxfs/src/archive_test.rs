// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{ArchiveWriter, EntrySpec, SplitWriter, INDEX_HEADER};
use crate::tracking::EntryKind;

#[rstest]
#[tokio::test]
async fn test_split_writer_contents_are_raw_payloads() {
    let mut index = Vec::new();
    let mut contents = Vec::new();
    let mut writer = SplitWriter::new(&mut index, &mut contents);
    writer.disable_padding();

    writer
        .write_entry(
            EntrySpec::new("/a").kind(EntryKind::Directory).mode(0o755),
            None,
        )
        .await
        .unwrap();
    let mut payload = &b"hello"[..];
    writer
        .write_entry(
            EntrySpec::new("/a/b")
                .kind(EntryKind::Regular)
                .mode(0o644)
                .size(5),
            Some(&mut payload),
        )
        .await
        .unwrap();
    let mut payload = &b" world"[..];
    writer
        .write_entry(
            EntrySpec::new("/a/c")
                .kind(EntryKind::Regular)
                .mode(0o644)
                .size(6),
            Some(&mut payload),
        )
        .await
        .unwrap();
    writer.finish().await.unwrap();

    assert_eq!(contents, b"hello world");
    assert!(index.starts_with(INDEX_HEADER));
}

#[rstest]
#[tokio::test]
async fn test_split_writer_pads_between_payloads_by_default() {
    let mut index = Vec::new();
    let mut contents = Vec::new();
    let mut writer = SplitWriter::new(&mut index, &mut contents);

    let mut payload = &b"xx"[..];
    writer
        .write_entry(
            EntrySpec::new("/one").kind(EntryKind::Regular).size(2),
            Some(&mut payload),
        )
        .await
        .unwrap();
    let mut payload = &b"yy"[..];
    writer
        .write_entry(
            EntrySpec::new("/two").kind(EntryKind::Regular).size(2),
            Some(&mut payload),
        )
        .await
        .unwrap();
    writer.finish().await.unwrap();

    assert_eq!(&contents[..2], b"xx");
    assert_eq!(contents.len(), 4096 + 2, "second payload starts on an aligned boundary");
    assert_eq!(&contents[4096..], b"yy");
}

#[rstest]
#[tokio::test]
async fn test_split_writer_symlinks_have_no_payload() {
    let mut index = Vec::new();
    let mut contents = Vec::new();
    let mut writer = SplitWriter::new(&mut index, &mut contents);
    writer.disable_padding();

    writer
        .write_entry(
            EntrySpec::new("/bin/sh")
                .kind(EntryKind::Symlink)
                .mode(0o777)
                .linkname("/bin/busybox"),
            None,
        )
        .await
        .unwrap();
    writer.finish().await.unwrap();

    assert!(contents.is_empty());
    let needle = b"/bin/busybox";
    assert!(
        index.windows(needle.len()).any(|w| w == needle),
        "index must record the link target"
    );
}
