// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

use rstest::fixture;

// the logging and temp-dir harness lives with the storage crate
pub use boxfs::fixtures::{init_logging, tmpdir};

/// A filesystem with default configuration and a root-owned caller.
#[fixture]
pub fn fs() -> crate::Filesystem {
    init_logging();
    crate::Filesystem::new(crate::Config::default())
}

/// The request most tests issue operations as.
#[fixture]
pub fn root_req() -> crate::Request {
    crate::Request {
        uid: 0,
        gid: 0,
        pid: 1,
    }
}

/// An abstract directory serving a fixed set of regular files.
pub struct MapDir {
    pub files: std::collections::BTreeMap<String, Vec<u8>>,
}

impl MapDir {
    pub fn new<const N: usize>(files: [(&str, &[u8]); N]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
        }
    }
}

impl crate::backing::AbstractDir for MapDir {
    fn stat(&self) -> std::io::Result<u32> {
        Ok(0o755)
    }

    fn mod_time(&self) -> std::io::Result<std::time::SystemTime> {
        Ok(std::time::SystemTime::UNIX_EPOCH)
    }

    fn read_dir(&self) -> std::io::Result<Vec<crate::backing::AbstractDirEntry>> {
        Ok(self
            .files
            .iter()
            .map(|(name, data)| crate::backing::AbstractDirEntry {
                name: name.clone(),
                is_dir: false,
                mode: 0o644,
                size: data.len() as u64,
            })
            .collect())
    }

    fn lookup(&self, name: &str) -> std::io::Result<crate::backing::AbstractNode> {
        match self.files.get(name) {
            Some(data) => Ok(crate::backing::AbstractNode::File(std::sync::Arc::new(
                crate::backing::BytesFile::new(data.clone(), 0o644),
            ))),
            None => Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        }
    }
}
