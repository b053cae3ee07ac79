// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use cxl_track::test_helpers::create_tracker;

use crate::engine::Engine;

/// Create an [Engine] for a test that logs to a file named after the test.
#[must_use]
pub fn start_test(full_filepath: &str) -> Engine {
    Engine::new(&create_tracker(full_filepath))
}
