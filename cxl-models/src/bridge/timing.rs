// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Latency applied to transactions as they cross the bridge.

use crate::bridge::config::ConfigError;
use crate::transaction::MemoryRequest;

/// Fixed properties of the link, immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkParameters {
    base_latency: u64,
    bytes_per_tick: Option<u64>,
    max_outstanding: usize,
}

impl LinkParameters {
    pub fn new(
        base_latency: u64,
        bytes_per_tick: Option<u64>,
        max_outstanding: usize,
    ) -> Result<Self, ConfigError> {
        if base_latency == 0 {
            return Err(ConfigError::ZeroBaseLatency);
        }
        if bytes_per_tick == Some(0) {
            return Err(ConfigError::ZeroLinkBandwidth);
        }
        if max_outstanding == 0 {
            return Err(ConfigError::ZeroMaxOutstanding);
        }
        Ok(Self {
            base_latency,
            bytes_per_tick,
            max_outstanding,
        })
    }

    #[must_use]
    pub fn base_latency(&self) -> u64 {
        self.base_latency
    }

    #[must_use]
    pub fn bytes_per_tick(&self) -> Option<u64> {
        self.bytes_per_tick
    }

    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LatencyModel {
    link: LinkParameters,
    response_latency: u64,
}

impl LatencyModel {
    #[must_use]
    pub fn new(link: LinkParameters, response_latency: u64) -> Self {
        Self {
            link,
            response_latency,
        }
    }

    #[must_use]
    pub fn link(&self) -> &LinkParameters {
        &self.link
    }

    /// Ticks between admission and dispatch to the device.
    #[must_use]
    pub fn delay_for(&self, request: &MemoryRequest) -> u64 {
        self.delay_for_size(request.size)
    }

    fn delay_for_size(&self, size: usize) -> u64 {
        let transfer = match self.link.bytes_per_tick {
            Some(bytes_per_tick) => (size as u64).div_ceil(bytes_per_tick),
            None => 0,
        };
        self.link.base_latency + transfer
    }

    /// Ticks between a device completion and delivery to the host.
    #[must_use]
    pub fn response_latency(&self) -> u64 {
        self.response_latency
    }

    /// Time spent in the bridge by a `size` byte request, excluding the
    /// device itself.
    #[must_use]
    pub fn worst_case_path_ticks(&self, size: usize) -> u64 {
        self.delay_for_size(size) + self.response_latency
    }
}
