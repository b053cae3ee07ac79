// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a host issuing memory traffic to CXL-attached memory.
//!
//! The platform is:
//!
//! ```text
//!  requester ---> bridge (cpu_side) ... bridge (mem_side) <---> memory
//! ```
//!
//! The requester offers each request to the bridge and backs off while the
//! bridge is busy. The memory is either a fixed latency device or a DRAM
//! row-buffer model.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `CXL_BRIDGE_` environment variables, then command-line flags.

pub mod config;
