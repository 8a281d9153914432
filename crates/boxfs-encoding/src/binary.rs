// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Little-endian primitives for the archive index format.
//!
//! Integers travel as fixed eight-byte little-endian words and
//! strings as a four-byte length prefix followed by utf-8 bytes, so
//! a decoder always knows how much to pull from the stream before it
//! touches the data. A format announces itself with leading magic
//! bytes rather than any framing of the records that follow.

use std::io::{Read, Write};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./binary_test.rs"]
mod binary_test;

/// Length prefixes beyond this are treated as stream corruption
/// instead of an allocation request.
const MAX_STRING_LEN: u32 = 1 << 20;

/// Write the magic bytes that open a stream in this format.
pub fn write_magic(mut writer: impl Write, magic: &[u8]) -> Result<()> {
    writer.write_all(magic).map_err(Error::Write)
}

/// Check that a stream opens with the expected magic bytes.
pub fn expect_magic(mut reader: impl Read, magic: &[u8]) -> Result<()> {
    let mut found = vec![0; magic.len()];
    reader.read_exact(&mut found).map_err(Error::Read)?;
    if found != magic {
        return Err(Error::BadMagic {
            expected: magic.to_vec(),
            found,
        });
    }
    Ok(())
}

/// Write one unsigned word.
pub fn write_u64(mut writer: impl Write, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes()).map_err(Error::Write)
}

/// Read one unsigned word.
pub fn read_u64(mut reader: impl Read) -> Result<u64> {
    let mut word = [0; 8];
    reader.read_exact(&mut word).map_err(Error::Read)?;
    Ok(u64::from_le_bytes(word))
}

/// Write one signed word.
pub fn write_i64(mut writer: impl Write, value: i64) -> Result<()> {
    writer.write_all(&value.to_le_bytes()).map_err(Error::Write)
}

/// Read one signed word.
pub fn read_i64(mut reader: impl Read) -> Result<i64> {
    let mut word = [0; 8];
    reader.read_exact(&mut word).map_err(Error::Read)?;
    Ok(i64::from_le_bytes(word))
}

/// Write a string as a length prefix plus its utf-8 bytes.
pub fn write_str(mut writer: impl Write, value: &str) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| Error::StringTooLong(value.len() as u64))?;
    if len > MAX_STRING_LEN {
        return Err(Error::StringTooLong(len as u64));
    }
    writer.write_all(&len.to_le_bytes()).map_err(Error::Write)?;
    writer.write_all(value.as_bytes()).map_err(Error::Write)
}

/// Read a length-prefixed string.
pub fn read_str(mut reader: impl Read) -> Result<String> {
    let mut prefix = [0; 4];
    reader.read_exact(&mut prefix).map_err(Error::Read)?;
    let len = u32::from_le_bytes(prefix);
    if len > MAX_STRING_LEN {
        return Err(Error::StringTooLong(len as u64));
    }
    let mut bytes = vec![0; len as usize];
    reader.read_exact(&mut bytes).map_err(Error::Read)?;
    String::from_utf8(bytes).map_err(|err| Error::NotUtf8(err.utf8_error()))
}
