// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulated time.
//!
//! The [SimTime](crate::time::simtime::SimTime) owns all of the
//! [Clocks](crate::time::clock::Clock) and advances time to the next tick at
//! which a task is waiting.

pub mod clock;
pub mod simtime;
