// Copyright (c) Contributors to the BoxFS project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/boxfs/boxfs

//! Test harness helpers, shared with the other workspace crates
//! through the `test-fixtures` feature.

use rstest::fixture;

/// Send tracing output to the test harness capture, honoring
/// `RUST_LOG` when one is set and defaulting to everything.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn tmpdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("boxfs-test-")
        .tempdir()
        .expect("failed to create dir for test")
}
