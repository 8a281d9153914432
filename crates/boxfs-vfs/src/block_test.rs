// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{BlockStore, BLOCK_SIZE};

#[rstest]
fn test_read_write_round_trip() {
    let mut store = BlockStore::default();
    store.write(100, b"hello world");
    assert_eq!(store.read(100, 11), b"hello world");
    assert_eq!(store.len(), 111);
}

#[rstest]
fn test_holes_read_as_zeroes() {
    let mut store = BlockStore::default();
    store.write(2 * BLOCK_SIZE, b"X");
    let data = store.read(0, 2 * BLOCK_SIZE + 1);
    assert_eq!(data.len() as u64, 2 * BLOCK_SIZE + 1);
    assert!(data[..2 * BLOCK_SIZE as usize].iter().all(|&b| b == 0));
    assert_eq!(data[2 * BLOCK_SIZE as usize], b'X');
}

#[rstest]
fn test_reads_clamp_to_size() {
    let mut store = BlockStore::default();
    store.write(0, b"abc");
    assert_eq!(store.read(0, 100), b"abc");
    assert_eq!(store.read(2, 100), b"c");
    assert!(store.read(3, 100).is_empty());
    assert!(store.read(50, 1).is_empty());
}

#[rstest]
fn test_write_spanning_blocks() {
    let mut store = BlockStore::default();
    let data = vec![7u8; (BLOCK_SIZE + 100) as usize];
    store.write(BLOCK_SIZE - 50, &data);
    assert_eq!(store.read(BLOCK_SIZE - 50, data.len() as u64), data);
    assert_eq!(store.allocated_blocks(), 3);
}

#[rstest]
fn test_usage_counts_sectors() {
    let mut store = BlockStore::default();
    store.write(2 * BLOCK_SIZE, b"X");
    // one allocated 4 KiB block is eight 512-byte sectors
    assert_eq!(store.usage(), 8);
    assert_eq!(store.len(), 2 * BLOCK_SIZE + 1);
}

#[rstest]
fn test_truncate_grow_is_sparse() {
    let mut store = BlockStore::default();
    store.write(0, b"abc");
    store.truncate(10 * BLOCK_SIZE);
    assert_eq!(store.len(), 10 * BLOCK_SIZE);
    assert_eq!(store.allocated_blocks(), 1);
    assert!(store.read(5 * BLOCK_SIZE, 10).iter().all(|&b| b == 0));
}

#[rstest]
fn test_truncate_shrink_zeroes_tail_of_kept_block() {
    let mut store = BlockStore::default();
    store.write(0, &vec![9u8; BLOCK_SIZE as usize * 2]);
    store.truncate(10);
    assert_eq!(store.allocated_blocks(), 1);
    assert_eq!(store.len(), 10);
    // growing back must expose zeroes, not the old bytes
    store.truncate(BLOCK_SIZE);
    assert_eq!(store.read(0, 10), vec![9u8; 10]);
    assert!(store.read(10, BLOCK_SIZE - 10).iter().all(|&b| b == 0));
}

#[rstest]
fn test_truncate_to_zero_drops_everything() {
    let mut store = BlockStore::default();
    store.write(0, b"data");
    store.truncate(0);
    assert_eq!(store.allocated_blocks(), 0);
    assert!(store.is_empty());
}

#[rstest]
fn test_punch_drops_covered_blocks_and_zeroes_edges() {
    let mut store = BlockStore::default();
    store.write(0, &vec![1u8; 3 * BLOCK_SIZE as usize]);
    store.punch(100, 2 * BLOCK_SIZE);
    // block 0: zeroed from 100; block 1 fully covered: gone; block 2 partially zeroed
    assert_eq!(store.allocated_blocks(), 2);
    assert_eq!(store.read(0, 100), vec![1u8; 100]);
    assert!(store.read(100, 2 * BLOCK_SIZE).iter().all(|&b| b == 0));
    assert_eq!(store.read(100 + 2 * BLOCK_SIZE, 10), vec![1u8; 10]);
    assert_eq!(store.len(), 3 * BLOCK_SIZE, "punching never changes the size");
}

#[rstest]
fn test_seek_data_and_hole_on_sparse_file() {
    let mut store = BlockStore::default();
    store.write(2 * BLOCK_SIZE, b"X");
    assert_eq!(store.len(), 2 * BLOCK_SIZE + 1);

    assert_eq!(store.seek_data(0), Some(2 * BLOCK_SIZE));
    assert_eq!(store.seek_data(2 * BLOCK_SIZE), Some(2 * BLOCK_SIZE));
    // inside the allocated block, data continues at the given offset
    assert_eq!(store.seek_data(2 * BLOCK_SIZE + 1), None, "past eof");

    assert_eq!(store.seek_hole(0), 0);
    assert_eq!(store.seek_hole(BLOCK_SIZE + 5), BLOCK_SIZE + 5);
    // the final run reaches end-of-file
    assert_eq!(store.seek_hole(2 * BLOCK_SIZE), 2 * BLOCK_SIZE + 1);
}

#[rstest]
fn test_seek_data_no_blocks() {
    let mut store = BlockStore::default();
    store.set_len(100);
    assert_eq!(store.seek_data(0), None);
    assert_eq!(store.seek_hole(0), 0);
}

#[rstest]
fn test_seek_hole_at_or_past_size() {
    let mut store = BlockStore::default();
    store.write(0, b"abc");
    assert_eq!(store.seek_hole(3), 3);
    assert_eq!(store.seek_hole(100), 100);
}

#[rstest]
fn test_seek_data_mid_hole_lands_on_block_start() {
    let mut store = BlockStore::default();
    store.write(0, b"a");
    store.write(3 * BLOCK_SIZE, b"b");
    assert_eq!(store.seek_data(10), Some(3 * BLOCK_SIZE));
}

#[rstest]
fn test_allocate_preserves_data_and_size() {
    let mut store = BlockStore::default();
    store.write(0, b"keep");
    store.allocate(0, 2 * BLOCK_SIZE);
    assert_eq!(store.read(0, 4), b"keep");
    assert_eq!(store.allocated_blocks(), 2);
    assert_eq!(store.len(), 4);
}
