// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use std::convert::TryInto;
use std::fmt::Display;
use std::io::{Read, Write};
use std::pin::Pin;
use std::task::Poll;

use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256, SHA256_OUTPUT_LEN};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./hash_test.rs"]
mod hash_test;

/// The number of bytes that make up a BoxFS digest
pub const DIGEST_SIZE: usize = SHA256_OUTPUT_LEN;

/// The bytes of an empty digest, the result of hashing no data at all.
pub const EMPTY_DIGEST: [u8; DIGEST_SIZE] = [
    227, 176, 196, 66, 152, 252, 28, 20, 154, 251, 244, 200, 153, 111, 185, 36, 39, 174, 65, 228,
    100, 155, 147, 76, 164, 149, 153, 27, 120, 82, 184, 85,
];

/// The Hasher calculates a [`Digest`] from the bytes written to it.
///
/// A write-through target can optionally be specified at creation
/// time using the [`Hasher::with_target`] constructor. In this form,
/// the hasher forwards all bytes to the given target while still
/// being able to provide the final digest of everything written.
///
/// Readers can be tee'd through an existing hasher with
/// [`Hasher::wrap_reader`], mixing bytes into the digest as they
/// are consumed by the caller.
pub struct Hasher<T> {
    ctx: Context,
    target: T,
}

impl<T> Hasher<T> {
    /// The target of the hasher will receive a copy
    /// of all bytes that are written to it
    pub fn with_target(writer: T) -> Self {
        Self {
            ctx: Context::new(&SHA256),
            target: writer,
        }
    }

    /// Wrap a reader so that all bytes it produces are also
    /// mixed into this hasher as they are consumed.
    pub fn wrap_reader<R>(&mut self, reader: R) -> TeeReader<'_, R> {
        TeeReader {
            ctx: &mut self.ctx,
            reader,
        }
    }

    /// Finalize the hasher and return the digest
    pub fn digest(self) -> Digest {
        let ring_digest = self.ctx.finish();
        let bytes = ring_digest
            .as_ref()
            .try_into()
            .expect("sha256 digest should be the exact desired length");
        Digest(bytes)
    }
}

impl Default for Hasher<std::io::Sink> {
    fn default() -> Self {
        Self {
            ctx: Context::new(&SHA256),
            target: std::io::sink(),
        }
    }
}

impl<T> std::ops::Deref for Hasher<T> {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl<T> std::ops::DerefMut for Hasher<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

impl<T> Write for Hasher<T>
where
    T: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.ctx.update(buf);
        self.target.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.target.flush()
    }
}

/// Mixes all bytes read through it into a borrowed hashing context.
///
/// Created by [`Hasher::wrap_reader`].
pub struct TeeReader<'h, R> {
    ctx: &'h mut Context,
    reader: R,
}

impl<R> Read for TeeReader<'_, R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = self.reader.read(buf)?;
        self.ctx.update(&buf[..count]);
        Ok(count)
    }
}

impl<R> AsyncRead for TeeReader<'_, R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.reader).poll_read(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Ready(Ok(())) => {
                this.ctx.update(&buf.filled()[before..]);
                Poll::Ready(Ok(()))
            }
        }
    }
}

/// Digest is the result of a hashing operation over binary data.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Ord, PartialOrd)]
pub struct Digest([u8; DIGEST_SIZE]);

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_string().as_ref())
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(HEXLOWER.encode(self.as_bytes()).as_ref())
    }
}

impl Digest {
    /// Yields a view of the underlying bytes for this digest
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Extract the raw bytes of this digest
    pub fn into_bytes(self) -> [u8; DIGEST_SIZE] {
        self.0
    }

    /// Create a digest from the provided bytes.
    ///
    /// The exact [`DIGEST_SIZE`] number of bytes must be given.
    pub fn from_bytes(digest_bytes: &[u8]) -> Result<Self> {
        match digest_bytes.try_into() {
            Err(_err) => Err(Error::WrongDigestLength(digest_bytes.len())),
            Ok(bytes) => Ok(Self(bytes)),
        }
    }

    /// Parse the given string as an encoded digest
    pub fn parse(digest_str: &str) -> Result<Digest> {
        parse_digest(digest_str)
    }

    /// Reads the given reader to completion, returning
    /// the digest of its contents.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut ctx = Context::new(&SHA256);
        let mut buf = vec![0; 4096];
        loop {
            let count = reader.read(buf.as_mut_slice()).map_err(Error::Read)?;
            if count == 0 {
                break;
            }
            ctx.update(&buf.as_slice()[..count]);
        }
        let ring_digest = ctx.finish();
        let bytes = ring_digest
            .as_ref()
            .try_into()
            .expect("sha256 digest should be the exact desired length");
        Ok(Digest(bytes))
    }
}

impl std::str::FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Digest::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Parse a string-digest.
pub fn parse_digest(digest_str: impl AsRef<str>) -> Result<Digest> {
    let digest_bytes = HEXLOWER
        .decode(digest_str.as_ref().as_bytes())
        .map_err(Error::MalformedDigest)?;
    Digest::from_bytes(digest_bytes.as_slice())
}
