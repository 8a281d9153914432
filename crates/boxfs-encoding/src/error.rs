// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

/// A specialized result for encoding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ways the binary stream and digest helpers can fail.
#[derive(thiserror::Error, Debug, miette::Diagnostic)]
pub enum Error {
    /// The stream ended or errored while a value was being decoded.
    #[error("failed to read encoded data")]
    Read(#[source] std::io::Error),

    /// The sink rejected bytes while a value was being encoded.
    #[error("failed to write encoded data")]
    Write(#[source] std::io::Error),

    /// A stream did not open with the magic bytes of its format,
    /// so nothing after them can be trusted either.
    #[error("bad magic bytes: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// The magic bytes the format requires
        expected: Vec<u8>,
        /// What the stream actually began with
        found: Vec<u8>,
    },

    /// A length prefix asked for more than the decoder will
    /// allocate, or a string was too long to be encoded at all.
    #[error("string of {0} bytes is over the length limit")]
    StringTooLong(u64),

    /// Decoded string bytes were not utf-8.
    #[error("decoded string is not valid utf-8")]
    NotUtf8(#[source] std::str::Utf8Error),

    /// A digest string held something other than lowercase hex.
    #[error("digest is not lowercase hex")]
    MalformedDigest(#[source] data_encoding::DecodeError),

    /// A digest was built from the wrong number of bytes.
    #[error("digest needs {} bytes, got {0}", crate::DIGEST_SIZE)]
    WrongDigestLength(usize),
}
