// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Untimed access to device memory.
//!
//! Used to load and inspect memory contents outside of simulated time.

use thiserror::Error;

use crate::bridge::range::AddressRange;

/// Implemented by devices that hold real data.
pub trait FunctionalAccess {
    fn functional_read(&self, address: u64, size: usize) -> Vec<u8>;
    fn functional_write(&self, address: u64, data: &[u8]);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FunctionalError {
    #[error("{size} bytes at {address:#x} is not within {range}")]
    OutOfRange {
        address: u64,
        size: usize,
        range: AddressRange,
    },

    #[error("no device attached for functional access")]
    NoTarget,
}
