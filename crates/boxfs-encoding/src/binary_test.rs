// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::rstest;

use super::{expect_magic, read_i64, read_str, read_u64, write_i64, write_magic, write_str, write_u64};
use crate::Error;

#[rstest]
#[case("")]
#[case("a plain name")]
#[case("with/some/path/separators")]
#[case("ünïcödé")]
#[case("nul\u{0} is fine here")]
fn test_str_round_trip(#[case] src: &str) {
    let mut buf = Vec::new();
    write_str(&mut buf, src).unwrap();
    assert_eq!(read_str(buf.as_slice()).unwrap(), src);
}

#[rstest]
fn test_str_wire_shape() {
    let mut buf = Vec::new();
    write_str(&mut buf, "hi").unwrap();
    // little-endian length prefix, then the raw bytes
    assert_eq!(buf, [2, 0, 0, 0, b'h', b'i']);
}

#[rstest]
fn test_str_truncated_stream() {
    let mut buf = Vec::new();
    write_str(&mut buf, "cut short").unwrap();
    buf.truncate(buf.len() - 2);
    assert!(matches!(read_str(buf.as_slice()), Err(Error::Read(_))));
}

#[rstest]
fn test_str_rejects_corrupt_length_prefix() {
    // a prefix this large is corruption, not an allocation request
    let buf = u32::MAX.to_le_bytes();
    assert!(matches!(
        read_str(buf.as_slice()),
        Err(Error::StringTooLong(_))
    ));
}

#[rstest]
fn test_str_rejects_non_utf8() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&2u32.to_le_bytes());
    buf.extend_from_slice(&[0xff, 0xfe]);
    assert!(matches!(read_str(buf.as_slice()), Err(Error::NotUtf8(_))));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(u64::MAX)]
fn test_u64_round_trip(#[case] value: u64) {
    let mut buf = Vec::new();
    write_u64(&mut buf, value).unwrap();
    assert_eq!(read_u64(buf.as_slice()).unwrap(), value);
}

#[rstest]
#[case(i64::MIN)]
#[case(-1)]
#[case(i64::MAX)]
fn test_i64_round_trip(#[case] value: i64) {
    let mut buf = Vec::new();
    write_i64(&mut buf, value).unwrap();
    assert_eq!(read_i64(buf.as_slice()).unwrap(), value);
}

#[rstest]
fn test_magic_round_trip() {
    let mut buf = Vec::new();
    write_magic(&mut buf, b"BOXIDX").unwrap();
    expect_magic(buf.as_slice(), b"BOXIDX").unwrap();
}

#[rstest]
fn test_magic_mismatch() {
    let mut buf = Vec::new();
    write_magic(&mut buf, b"BOXIDX").unwrap();
    assert!(matches!(
        expect_magic(buf.as_slice(), b"OTHERS"),
        Err(Error::BadMagic { .. })
    ));
}
