// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Host side memory transactions.

use std::fmt;

use cxl_engine::time::clock::ClockTick;
use cxl_engine::traits::{SimObject, TotalBytes};
use cxl_track::Unique;
use cxl_track::id::Id;

pub type TransactionId = u64;
pub type PortId = u32;

/// Number of bytes in a request header on the host fabric.
pub const HEADER_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    /// Write only the bytes whose bit is set in `byte_mask`.
    PartialWrite {
        byte_mask: u64,
    },
    /// Snoop-style invalidation. Legal on the host fabric but CXL.mem cannot
    /// carry it.
    Invalidate,
}

impl Operation {
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Write | Operation::PartialWrite { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "Read"),
            Operation::Write => write!(f, "Write"),
            Operation::PartialWrite { byte_mask } => write!(f, "PartialWrite({byte_mask:#x})"),
            Operation::Invalidate => write!(f, "Invalidate"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryRequest {
    pub transaction_id: TransactionId,
    pub address: u64,
    pub size: usize,
    pub operation: Operation,
    pub payload: Option<Vec<u8>>,
    pub issuing_port: PortId,
    pub issue_time: ClockTick,
}

impl MemoryRequest {
    #[must_use]
    pub fn read(transaction_id: TransactionId, address: u64, size: usize) -> Self {
        Self {
            transaction_id,
            address,
            size,
            operation: Operation::Read,
            payload: None,
            issuing_port: 0,
            issue_time: ClockTick::new(),
        }
    }

    #[must_use]
    pub fn write(transaction_id: TransactionId, address: u64, payload: Vec<u8>) -> Self {
        Self {
            transaction_id,
            address,
            size: payload.len(),
            operation: Operation::Write,
            payload: Some(payload),
            issuing_port: 0,
            issue_time: ClockTick::new(),
        }
    }

    #[must_use]
    pub fn partial_write(
        transaction_id: TransactionId,
        address: u64,
        payload: Vec<u8>,
        byte_mask: u64,
    ) -> Self {
        Self {
            operation: Operation::PartialWrite { byte_mask },
            ..Self::write(transaction_id, address, payload)
        }
    }

    #[must_use]
    pub fn with_port(mut self, issuing_port: PortId) -> Self {
        self.issuing_port = issuing_port;
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}

impl fmt::Display for MemoryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} @{:#x} ({} bytes)",
            self.operation, self.transaction_id, self.address, self.size
        )
    }
}

impl Unique for MemoryRequest {
    fn id(&self) -> Id {
        Id(self.transaction_id)
    }
}

impl TotalBytes for MemoryRequest {
    fn total_bytes(&self) -> usize {
        HEADER_BYTES + self.payload.as_ref().map_or(0, Vec::len)
    }
}

impl SimObject for MemoryRequest {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// No device response arrived before the deadline.
    Timeout,
    /// The device returned poisoned data.
    DevicePoison,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Error(ErrorKind),
}

impl ResponseStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryResponse {
    pub transaction_id: TransactionId,
    pub payload: Option<Vec<u8>>,
    pub completion_time: ClockTick,
    pub status: ResponseStatus,
}

impl MemoryResponse {
    /// The response sent upstream when a transaction passes its deadline.
    #[must_use]
    pub fn timeout(transaction_id: TransactionId, completion_time: ClockTick) -> Self {
        Self {
            transaction_id,
            payload: None,
            completion_time,
            status: ResponseStatus::Error(ErrorKind::Timeout),
        }
    }
}

impl fmt::Display for MemoryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response #{} {:?}", self.transaction_id, self.status)
    }
}

impl Unique for MemoryResponse {
    fn id(&self) -> Id {
        Id(self.transaction_id)
    }
}

impl TotalBytes for MemoryResponse {
    fn total_bytes(&self) -> usize {
        HEADER_BYTES + self.payload.as_ref().map_or(0, Vec::len)
    }
}

impl SimObject for MemoryResponse {}
