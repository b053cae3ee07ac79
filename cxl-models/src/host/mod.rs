// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Host side traffic.

pub mod requester;
pub mod traffic;
