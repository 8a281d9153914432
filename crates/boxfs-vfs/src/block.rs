// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::collections::BTreeMap;

#[cfg(test)]
#[path = "./block_test.rs"]
mod block_test;

/// The allocation granularity of file contents, in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Sectors reported per allocated block (`st_blocks` is in 512s).
const SECTORS_PER_BLOCK: u64 = BLOCK_SIZE / 512;

/// Sparse storage for one file's contents.
///
/// Blocks are allocated whole on first write; an absent block is a
/// hole and reads as zeroes. The recorded size is independent of the
/// allocated range, so a file can end in (or consist entirely of) a
/// hole.
#[derive(Debug, Clone, Default)]
pub struct BlockStore {
    size: u64,
    blocks: BTreeMap<u64, Vec<u8>>,
}

impl BlockStore {
    /// The current file size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Grow the recorded size without allocating anything.
    pub fn set_len(&mut self, size: u64) {
        self.size = size;
    }

    /// The `st_blocks` value for this file.
    pub fn usage(&self) -> u64 {
        self.blocks.len() as u64 * SECTORS_PER_BLOCK
    }

    pub fn allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Read up to `len` bytes from `offset`, clamped to the file size.
    /// Holes read as zeroes.
    pub fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        if len == 0 || offset >= self.size {
            return Vec::new();
        }
        let end = self.size.min(offset.saturating_add(len));
        let mut buf = vec![0; (end - offset) as usize];
        for (&index, block) in self.blocks.range(offset / BLOCK_SIZE..=(end - 1) / BLOCK_SIZE) {
            let block_start = index * BLOCK_SIZE;
            let copy_start = block_start.max(offset);
            let copy_end = (block_start + BLOCK_SIZE).min(end);
            if copy_start >= copy_end {
                continue;
            }
            buf[(copy_start - offset) as usize..(copy_end - offset) as usize].copy_from_slice(
                &block[(copy_start - block_start) as usize..(copy_end - block_start) as usize],
            );
        }
        buf
    }

    /// Write `data` at `offset`, allocating any missing blocks and
    /// growing the size if the write extends past it.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let end = offset + data.len() as u64;
        for index in offset / BLOCK_SIZE..=(end - 1) / BLOCK_SIZE {
            let block = self
                .blocks
                .entry(index)
                .or_insert_with(|| vec![0; BLOCK_SIZE as usize]);
            let block_start = index * BLOCK_SIZE;
            let copy_start = block_start.max(offset);
            let copy_end = (block_start + BLOCK_SIZE).min(end);
            block[(copy_start - block_start) as usize..(copy_end - block_start) as usize]
                .copy_from_slice(&data[(copy_start - offset) as usize..(copy_end - offset) as usize]);
        }
        self.size = self.size.max(end);
    }

    /// Change the file size. Shrinking drops blocks past the new end
    /// and zeroes the dropped portion of the final block; growing
    /// leaves a sparse tail.
    pub fn truncate(&mut self, new_size: u64) {
        if new_size >= self.size {
            self.size = new_size;
            return;
        }
        if new_size == 0 {
            self.blocks.clear();
        } else {
            let last_index = (new_size - 1) / BLOCK_SIZE;
            self.blocks.retain(|&index, _| index <= last_index);
            let cut = (new_size % BLOCK_SIZE) as usize;
            if cut != 0 {
                if let Some(block) = self.blocks.get_mut(&last_index) {
                    block[cut..].fill(0);
                }
            }
        }
        self.size = new_size;
    }

    /// Deallocate every block fully inside `[offset, offset+len)` and
    /// zero the partially-covered edges. The size never changes.
    pub fn punch(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let end = offset.saturating_add(len);
        let first = offset / BLOCK_SIZE;
        let last = (end - 1) / BLOCK_SIZE;
        let mut drop = Vec::new();
        for (&index, block) in self.blocks.range_mut(first..=last) {
            let block_start = index * BLOCK_SIZE;
            let block_end = block_start + BLOCK_SIZE;
            if offset <= block_start && end >= block_end {
                drop.push(index);
                continue;
            }
            let zero_start = block_start.max(offset);
            let zero_end = block_end.min(end);
            block[(zero_start - block_start) as usize..(zero_end - block_start) as usize].fill(0);
        }
        for index in drop {
            self.blocks.remove(&index);
        }
    }

    /// Allocate zero-filled blocks covering `[offset, offset+len)`
    /// without touching existing data or the recorded size.
    pub fn allocate(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let end = offset + len;
        for index in offset / BLOCK_SIZE..=(end - 1) / BLOCK_SIZE {
            self.blocks
                .entry(index)
                .or_insert_with(|| vec![0; BLOCK_SIZE as usize]);
        }
    }

    /// The offset of the next data byte at or after `offset`, or
    /// `None` when only holes (or end-of-file) remain.
    pub fn seek_data(&self, offset: u64) -> Option<u64> {
        if offset >= self.size || self.blocks.is_empty() {
            return None;
        }
        let start = offset / BLOCK_SIZE;
        if self.blocks.contains_key(&start) {
            return Some(offset);
        }
        let (&index, _) = self.blocks.range(start + 1..).next()?;
        let pos = index * BLOCK_SIZE;
        (pos < self.size).then_some(pos)
    }

    /// The offset of the next hole at or after `offset`. A run of
    /// allocated blocks reaching end-of-file yields the file size;
    /// offsets at or past the size are returned unchanged.
    pub fn seek_hole(&self, offset: u64) -> u64 {
        if offset >= self.size {
            return offset;
        }
        let start = offset / BLOCK_SIZE;
        if !self.blocks.contains_key(&start) {
            return offset;
        }
        let mut next = start + 1;
        while self.blocks.contains_key(&next) {
            next += 1;
        }
        (next * BLOCK_SIZE).min(self.size)
    }
}
