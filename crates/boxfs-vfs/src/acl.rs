// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Parsing and application of POSIX access control lists.
//!
//! ACLs arrive and leave as `system.posix_acl_*` xattr blobs in the
//! kernel's wire format: a little-endian u32 version followed by
//! 8-byte entries of `{u16 tag, u16 perm, u32 id}`.

use crate::{Errno, Result};

#[cfg(test)]
#[path = "./acl_test.rs"]
mod acl_test;

/// Xattr name carrying the access ACL of an inode.
pub const ACL_XATTR_ACCESS: &str = "system.posix_acl_access";
/// Xattr name carrying the default ACL of a directory.
pub const ACL_XATTR_DEFAULT: &str = "system.posix_acl_default";

const ACL_VERSION: u32 = 2;
const ACL_ENTRY_SIZE: usize = 8;

/// Entry tags, mirroring the kernel definitions.
pub const ACL_USER_OBJ: u16 = 0x01;
pub const ACL_USER: u16 = 0x02;
pub const ACL_GROUP_OBJ: u16 = 0x04;
pub const ACL_GROUP: u16 = 0x08;
pub const ACL_MASK: u16 = 0x10;
pub const ACL_OTHER: u16 = 0x20;

/// The id value carried by entries whose tag does not use one.
const ACL_UNDEFINED_ID: u32 = u32::MAX;

/// One parsed ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclEntry {
    pub tag: u16,
    pub perm: u16,
    pub id: u32,
}

/// A parsed POSIX ACL blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    pub entries: Vec<AclEntry>,
}

impl Acl {
    /// Parse the kernel wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 || (data.len() - 4) % ACL_ENTRY_SIZE != 0 {
            return Err(Errno::EINVAL);
        }
        let version = u32::from_le_bytes(data[..4].try_into().expect("sliced to width"));
        if version != ACL_VERSION {
            return Err(Errno::EINVAL);
        }
        let entries = data[4..]
            .chunks_exact(ACL_ENTRY_SIZE)
            .map(|chunk| AclEntry {
                tag: u16::from_le_bytes(chunk[..2].try_into().expect("sliced to width")),
                perm: u16::from_le_bytes(chunk[2..4].try_into().expect("sliced to width")),
                id: u32::from_le_bytes(chunk[4..8].try_into().expect("sliced to width")),
            })
            .collect();
        Ok(Self { entries })
    }

    /// Serialize back into the kernel wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * ACL_ENTRY_SIZE);
        out.extend_from_slice(&ACL_VERSION.to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&entry.perm.to_le_bytes());
            out.extend_from_slice(&entry.id.to_le_bytes());
        }
        out
    }

    /// Build the three-entry ACL equivalent to plain mode bits.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            entries: vec![
                AclEntry {
                    tag: ACL_USER_OBJ,
                    perm: ((mode >> 6) & 0o7) as u16,
                    id: ACL_UNDEFINED_ID,
                },
                AclEntry {
                    tag: ACL_GROUP_OBJ,
                    perm: ((mode >> 3) & 0o7) as u16,
                    id: ACL_UNDEFINED_ID,
                },
                AclEntry {
                    tag: ACL_OTHER,
                    perm: (mode & 0o7) as u16,
                    id: ACL_UNDEFINED_ID,
                },
            ],
        }
    }

    pub fn find(&self, tag: u16) -> Option<&AclEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// An ACL is minimal when mode bits alone can represent it:
    /// only the owner, owning-group and other entries are present.
    pub fn is_minimal(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.tag, ACL_USER_OBJ | ACL_GROUP_OBJ | ACL_OTHER))
    }

    /// The nine permission bits this ACL implies for the mode field.
    /// The group bits come from the mask when one is present.
    pub fn mode_bits(&self) -> u32 {
        let user = self.find(ACL_USER_OBJ).map(|e| e.perm & 0o7).unwrap_or(0);
        let group = self
            .find(ACL_MASK)
            .or_else(|| self.find(ACL_GROUP_OBJ))
            .map(|e| e.perm & 0o7)
            .unwrap_or(0);
        let other = self.find(ACL_OTHER).map(|e| e.perm & 0o7).unwrap_or(0);
        ((user as u32) << 6) | ((group as u32) << 3) | other as u32
    }

    /// The effective group permission granted through this ACL when
    /// it is inherited: the wider of the mask and the owning group.
    pub fn group_perm(&self) -> u32 {
        let mask = self.find(ACL_MASK).map(|e| e.perm & 0o7).unwrap_or(0);
        let group = self.find(ACL_GROUP_OBJ).map(|e| e.perm & 0o7).unwrap_or(0);
        mask.max(group) as u32
    }

    /// Remove the execute bit from every entry.
    pub fn strip_exec(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.perm &= !1;
        }
    }
}

/// Replace the nine permission bits of `mode` with the ones the ACL
/// implies, preserving the file type and suid/sgid/sticky bits.
pub fn apply_acl_to_mode(mode: u32, acl: &Acl) -> u32 {
    (mode & !0o777) | acl.mode_bits()
}
