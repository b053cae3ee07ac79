// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Models of a CXL.mem bridge and the components either side of it.
//!
//! The [bridge](crate::bridge::CxlBridge) sits between a host fabric that
//! issues [MemoryRequest](crate::transaction::MemoryRequest)s and a
//! CXL-attached device that speaks the M2S/S2M messages of
//! [protocol](crate::protocol). Host traffic is driven by a
//! [Requester](crate::host::requester::Requester) and the device is usually a
//! [Memory](crate::memory::Memory).

pub mod bridge;
pub mod host;
pub mod memory;
pub mod protocol;
pub mod test_helpers;
pub mod transaction;
