// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Device access timing.

use serde::{Deserialize, Serialize};

use crate::protocol::DeviceRequest;

/// Decides how long a device takes to service each request.
pub trait MemoryTiming {
    /// Ticks from receiving `request` to its response being ready.
    fn access_latency(&mut self, request: &DeviceRequest) -> u64;

    /// Ticks before the device can accept another request.
    fn occupancy(&self, _request: &DeviceRequest) -> u64 {
        0
    }
}

/// The same latency for every access plus an optional transfer time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedLatency {
    pub latency_ticks: u64,
    pub bytes_per_tick: Option<u64>,
}

impl FixedLatency {
    #[must_use]
    pub fn new(latency_ticks: u64) -> Self {
        Self {
            latency_ticks,
            bytes_per_tick: None,
        }
    }

    /// A device that responds in the same tick.
    #[must_use]
    pub fn instant() -> Self {
        Self::new(0)
    }

    fn transfer_ticks(&self, request: &DeviceRequest) -> u64 {
        match self.bytes_per_tick {
            Some(bytes_per_tick) if bytes_per_tick > 0 => {
                (request.size as u64).div_ceil(bytes_per_tick)
            }
            _ => 0,
        }
    }
}

impl MemoryTiming for FixedLatency {
    fn access_latency(&mut self, request: &DeviceRequest) -> u64 {
        self.latency_ticks + self.transfer_ticks(request)
    }

    fn occupancy(&self, request: &DeviceRequest) -> u64 {
        self.transfer_ticks(request)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DramConfig {
    pub t_cas: u64,
    pub t_ras: u64,
    pub t_pre: u64,
    pub row_bytes: u64,
    pub banks: u64,
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            t_cas: 14,
            t_ras: 14,
            t_pre: 14,
            row_bytes: 2048,
            banks: 8,
        }
    }
}

/// Row-buffer timing with one open row per bank.
///
/// - row hit: `t_cas`
/// - closed bank: `t_ras + t_cas`
/// - row conflict: `t_pre + t_ras + t_cas`
pub struct DramTiming {
    config: DramConfig,
    open_rows: Vec<Option<u64>>,
}

impl DramTiming {
    /// A zero `row_bytes` or `banks` is treated as one.
    #[must_use]
    pub fn new(config: DramConfig) -> Self {
        let config = DramConfig {
            row_bytes: config.row_bytes.max(1),
            banks: config.banks.max(1),
            ..config
        };
        Self {
            config,
            open_rows: vec![None; config.banks as usize],
        }
    }

    /// Rows are interleaved across banks.
    fn bank_and_row(&self, address: u64) -> (usize, u64) {
        let row_index = address / self.config.row_bytes;
        let bank = (row_index % self.config.banks) as usize;
        (bank, row_index / self.config.banks)
    }
}

impl MemoryTiming for DramTiming {
    fn access_latency(&mut self, request: &DeviceRequest) -> u64 {
        let (bank, row) = self.bank_and_row(request.address);
        let DramConfig {
            t_cas, t_ras, t_pre, ..
        } = self.config;
        let open_row = self.open_rows[bank].replace(row);
        match open_row {
            Some(open_row) if open_row == row => t_cas,
            Some(_) => t_pre + t_ras + t_cas,
            None => t_ras + t_cas,
        }
    }
}
