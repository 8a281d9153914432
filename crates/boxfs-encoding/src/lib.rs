// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Content hashing and binary stream helpers for the BoxFS storage format.

mod binary;
mod error;
mod hash;

pub use binary::{
    expect_magic, read_i64, read_str, read_u64, write_i64, write_magic, write_str, write_u64,
};
pub use error::{Error, Result};
pub use hash::{parse_digest, Digest, Hasher, TeeReader, DIGEST_SIZE, EMPTY_DIGEST};
