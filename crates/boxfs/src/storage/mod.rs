// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Uses a local directory on disk to store layers and snapshot manifests.

mod layer;
mod snapshot;

pub use layer::{Layer, LayerStore};
pub use snapshot::{Snapshot, SnapshotStore, SNAPSHOT_SCHEMA_VERSION};
