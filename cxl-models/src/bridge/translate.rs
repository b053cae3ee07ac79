// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Translation between host transactions and CXL.mem messages.
//!
//! Both directions are pure functions. Anything that cannot be expressed as a
//! single CXL.mem transfer fails translation so that it can be rejected before
//! the bridge takes ownership of it.

use cxl_engine::time::clock::ClockTick;
use thiserror::Error;

use crate::protocol::{DeviceRequest, DeviceResponse, DeviceStatus, M2sOpcode, MAX_TRANSFER_BYTES};
use crate::transaction::{ErrorKind, MemoryRequest, MemoryResponse, Operation, ResponseStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("{0} cannot be carried by CXL.mem")]
    UnsupportedOperation(Operation),

    #[error("zero sized access")]
    ZeroSize,

    #[error("{size} bytes exceeds the {max} byte transfer limit", max = MAX_TRANSFER_BYTES)]
    TooLarge { size: usize },

    #[error("write payload of {actual} bytes does not match access size {size}")]
    PayloadMismatch { size: usize, actual: usize },

    #[error("read request carries a payload")]
    ReadWithPayload,

    #[error("byte mask {mask:#x} is not valid for a {size} byte write")]
    BadByteMask { mask: u64, size: usize },
}

fn check_write_payload(request: &MemoryRequest) -> Result<Vec<u8>, TranslateError> {
    match &request.payload {
        Some(payload) if payload.len() == request.size => Ok(payload.clone()),
        payload => Err(TranslateError::PayloadMismatch {
            size: request.size,
            actual: payload.as_ref().map_or(0, Vec::len),
        }),
    }
}

fn check_byte_mask(mask: u64, size: usize) -> Result<(), TranslateError> {
    let out_of_bounds = size < 64 && (mask >> size) != 0;
    if mask == 0 || out_of_bounds {
        return Err(TranslateError::BadByteMask { mask, size });
    }
    Ok(())
}

/// Build the M2S message for a host request.
pub fn to_device_request(request: &MemoryRequest) -> Result<DeviceRequest, TranslateError> {
    if request.size == 0 {
        return Err(TranslateError::ZeroSize);
    }
    if request.size > MAX_TRANSFER_BYTES {
        return Err(TranslateError::TooLarge { size: request.size });
    }

    let (opcode, payload, byte_enable) = match request.operation {
        Operation::Read => {
            if request.payload.is_some() {
                return Err(TranslateError::ReadWithPayload);
            }
            (M2sOpcode::MemRd, None, 0)
        }
        Operation::Write => (M2sOpcode::MemWr, Some(check_write_payload(request)?), 0),
        Operation::PartialWrite { byte_mask } => {
            let payload = check_write_payload(request)?;
            check_byte_mask(byte_mask, request.size)?;
            (M2sOpcode::MemWrPtl, Some(payload), byte_mask)
        }
        Operation::Invalidate => {
            return Err(TranslateError::UnsupportedOperation(request.operation));
        }
    };

    Ok(DeviceRequest {
        transaction_id: request.transaction_id,
        opcode,
        address: request.address,
        size: request.size,
        payload,
        byte_enable,
    })
}

/// Build the host response for an S2M message.
#[must_use]
pub fn to_host_response(response: &DeviceResponse, completion_time: ClockTick) -> MemoryResponse {
    let status = match response.status {
        DeviceStatus::Ok => ResponseStatus::Ok,
        DeviceStatus::Poison => ResponseStatus::Error(ErrorKind::DevicePoison),
    };
    MemoryResponse {
        transaction_id: response.transaction_id,
        payload: response.payload.clone(),
        completion_time,
        status,
    }
}
