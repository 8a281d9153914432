// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Definitions for the filesystem data that layers capture.

mod entry;
pub use entry::{Entry, EntryKind, LayerData};
