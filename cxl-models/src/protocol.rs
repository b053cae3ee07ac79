// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! CXL.mem device-side messages.
//!
//! Requests travel master-to-subordinate (M2S) and completions travel
//! subordinate-to-master (S2M). Only the subset of opcodes used by a memory
//! expander is modelled.

use std::fmt;

use cxl_engine::traits::{SimObject, TotalBytes};
use cxl_track::Unique;
use cxl_track::id::Id;

use crate::transaction::TransactionId;

/// Largest payload carried by one CXL.mem transfer.
pub const MAX_TRANSFER_BYTES: usize = 64;

/// Size of an M2S/S2M header flit slot.
pub const FLIT_HEADER_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum M2sOpcode {
    MemRd,
    MemWr,
    MemWrPtl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum S2mOpcode {
    /// Data response to a `MemRd`.
    MemData,
    /// Completion for a write.
    Cmp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Ok,
    Poison,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRequest {
    pub transaction_id: TransactionId,
    pub opcode: M2sOpcode,
    pub address: u64,
    pub size: usize,
    pub payload: Option<Vec<u8>>,
    /// Only meaningful for `MemWrPtl`. Bit `i` enables byte `i`.
    pub byte_enable: u64,
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} tag {} @{:#x} ({} bytes)",
            self.opcode, self.transaction_id, self.address, self.size
        )
    }
}

impl Unique for DeviceRequest {
    fn id(&self) -> Id {
        Id(self.transaction_id)
    }
}

impl TotalBytes for DeviceRequest {
    fn total_bytes(&self) -> usize {
        FLIT_HEADER_BYTES + self.payload.as_ref().map_or(0, Vec::len)
    }
}

impl SimObject for DeviceRequest {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceResponse {
    pub transaction_id: TransactionId,
    pub opcode: S2mOpcode,
    pub payload: Option<Vec<u8>>,
    pub status: DeviceStatus,
}

impl DeviceResponse {
    /// Build the successful completion for `request`.
    #[must_use]
    pub fn complete(request: &DeviceRequest, data: Option<Vec<u8>>) -> Self {
        let opcode = match request.opcode {
            M2sOpcode::MemRd => S2mOpcode::MemData,
            M2sOpcode::MemWr | M2sOpcode::MemWrPtl => S2mOpcode::Cmp,
        };
        Self {
            transaction_id: request.transaction_id,
            opcode,
            payload: data,
            status: DeviceStatus::Ok,
        }
    }

    #[must_use]
    pub fn poisoned(request: &DeviceRequest) -> Self {
        Self {
            status: DeviceStatus::Poison,
            payload: None,
            ..Self::complete(request, None)
        }
    }
}

impl fmt::Display for DeviceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} tag {} {:?}",
            self.opcode, self.transaction_id, self.status
        )
    }
}

impl Unique for DeviceResponse {
    fn id(&self) -> Id {
        Id(self.transaction_id)
    }
}

impl TotalBytes for DeviceResponse {
    fn total_bytes(&self) -> usize {
        FLIT_HEADER_BYTES + self.payload.as_ref().map_or(0, Vec::len)
    }
}

impl SimObject for DeviceResponse {}
