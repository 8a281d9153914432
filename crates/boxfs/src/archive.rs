// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Serialization of layer entries into an index/contents pair.
//!
//! The index describes every entry in the layer while the contents
//! blob holds nothing but concatenated file payloads. Keeping the two
//! apart lets a consumer map the metadata without touching file data,
//! and lets the layer store hash payloads as they stream through.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::encoding;
use crate::tracking::EntryKind;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./archive_test.rs"]
mod archive_test;

/// Identifies the start of a serialized archive index.
pub const INDEX_HEADER: &[u8] = b"BOXLAYERIDX01";

/// Payload alignment applied between entries unless padding is disabled.
const PAYLOAD_ALIGNMENT: u64 = 4096;

/// Describes one entry to be written into an archive.
///
/// Built up through chained setters before being handed to
/// [`ArchiveWriter::write_entry`]:
///
/// ```
/// use boxfs::archive::EntrySpec;
/// use boxfs::tracking::EntryKind;
///
/// let spec = EntrySpec::new("/etc/hosts")
///     .kind(EntryKind::Regular)
///     .mode(0o644)
///     .owner(0, 0)
///     .size(12);
/// assert_eq!(spec.name(), "/etc/hosts");
/// ```
#[derive(Debug, Clone)]
pub struct EntrySpec {
    name: String,
    kind: EntryKind,
    mode: u32,
    uid: u32,
    gid: u32,
    mtime: i64,
    size: u64,
    linkname: String,
}

impl EntrySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Regular,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            size: 0,
            linkname: String::new(),
        }
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn mod_time(mut self, mtime: i64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn linkname(mut self, target: impl Into<String>) -> Self {
        self.linkname = target.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_kind(&self) -> EntryKind {
        self.kind
    }
}

/// Receives layer entries and serializes them to some backing medium.
#[async_trait]
pub trait ArchiveWriter: Send {
    /// Stop aligning payloads, minimizing the size of the archive.
    fn disable_padding(&mut self);

    /// Serialize one entry, streaming the payload if one is given.
    ///
    /// Returns the number of payload bytes consumed.
    async fn write_entry(
        &mut self,
        spec: EntrySpec,
        payload: Option<&mut (dyn AsyncRead + Unpin + Send)>,
    ) -> Result<u64>;

    /// Flush any buffered state to the underlying sinks.
    async fn finish(&mut self) -> Result<()>;
}

/// Writes the index and contents halves of an archive to two sinks.
pub struct SplitWriter<I, C> {
    index: I,
    contents: C,
    padding: bool,
    offset: u64,
    header_written: bool,
}

impl<I, C> SplitWriter<I, C>
where
    I: AsyncWrite + Unpin + Send,
    C: AsyncWrite + Unpin + Send,
{
    pub fn new(index: I, contents: C) -> Self {
        Self {
            index,
            contents,
            padding: true,
            offset: 0,
            header_written: false,
        }
    }

    /// The number of content bytes written so far, including padding.
    pub fn content_len(&self) -> u64 {
        self.offset
    }

    async fn pad_contents(&mut self) -> std::io::Result<()> {
        let over = self.offset % PAYLOAD_ALIGNMENT;
        if over == 0 {
            return Ok(());
        }
        let fill = (PAYLOAD_ALIGNMENT - over) as usize;
        self.contents.write_all(&vec![0; fill]).await?;
        self.offset += fill as u64;
        Ok(())
    }
}

#[async_trait]
impl<I, C> ArchiveWriter for SplitWriter<I, C>
where
    I: AsyncWrite + Unpin + Send,
    C: AsyncWrite + Unpin + Send,
{
    fn disable_padding(&mut self) {
        self.padding = false;
    }

    async fn write_entry(
        &mut self,
        spec: EntrySpec,
        payload: Option<&mut (dyn AsyncRead + Unpin + Send)>,
    ) -> Result<u64> {
        let mut record = Vec::with_capacity(spec.name.len() + 64);
        if !self.header_written {
            encoding::write_magic(&mut record, INDEX_HEADER)?;
            self.header_written = true;
        }
        if self.padding {
            self.pad_contents()
                .await
                .map_err(Error::ArchiveWriteError)?;
        }
        encoding::write_str(&mut record, &spec.name)?;
        encoding::write_u64(&mut record, spec.kind.tag() as u64)?;
        encoding::write_u64(&mut record, spec.mode as u64)?;
        encoding::write_u64(&mut record, spec.uid as u64)?;
        encoding::write_u64(&mut record, spec.gid as u64)?;
        encoding::write_i64(&mut record, spec.mtime)?;
        encoding::write_u64(&mut record, spec.size)?;
        encoding::write_u64(&mut record, self.offset)?;
        encoding::write_str(&mut record, &spec.linkname)?;
        self.index
            .write_all(&record)
            .await
            .map_err(Error::ArchiveWriteError)?;

        let mut copied = 0;
        if let Some(reader) = payload {
            copied = tokio::io::copy(reader, &mut self.contents)
                .await
                .map_err(Error::ArchiveWriteError)?;
            self.offset += copied;
        }
        Ok(copied)
    }

    async fn finish(&mut self) -> Result<()> {
        self.index
            .flush()
            .await
            .map_err(Error::ArchiveWriteError)?;
        self.contents
            .flush()
            .await
            .map_err(Error::ArchiveWriteError)?;
        Ok(())
    }
}
