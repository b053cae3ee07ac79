// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Bridge configuration.
//!
//! Defaults model a bridge running on a 1 GHz clock so that one tick is one
//! nanosecond.

use cxl_engine::types::SimError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::range::AddressRange;
use crate::bridge::timing::{LatencyModel, LinkParameters};
use crate::protocol::MAX_TRANSFER_BYTES;

pub const DEFAULT_RANGE_BASE: u64 = 0x1_0000_0000;
pub const DEFAULT_RANGE_SIZE: u64 = 0x1_0000_0000;
pub const DEFAULT_BASE_LATENCY_TICKS: u64 = 50;
pub const DEFAULT_RESPONSE_LATENCY_TICKS: u64 = 12;
pub const DEFAULT_MAX_OUTSTANDING: usize = 128;
pub const DEFAULT_TIMEOUT_TICKS: u64 = 100_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("address range must not be empty")]
    EmptyRange,

    #[error("address range {base:#x} + {size:#x} overflows the address space")]
    RangeOverflow { base: u64, size: u64 },

    #[error("base latency must be at least one tick")]
    ZeroBaseLatency,

    #[error("max_outstanding must be at least one")]
    ZeroMaxOutstanding,

    #[error("link bandwidth must be at least one byte per tick")]
    ZeroLinkBandwidth,

    #[error("timeout must be at least one tick")]
    ZeroTimeout,

    #[error("timeout of {timeout} ticks does not exceed the worst case path latency of {path} ticks")]
    TimeoutTooShort { timeout: u64, path: u64 },
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError(e.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Deliver responses in the order they complete.
    #[default]
    Relaxed,
    /// Deliver responses in admission order.
    Strict,
}

/// Protocol processing presets for the kind of device behind the bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
    #[default]
    Default,
    Asic,
    Fpga,
}

impl DevicePreset {
    /// Protocol processing latency in ticks.
    #[must_use]
    pub fn response_latency_ticks(&self) -> u64 {
        match self {
            DevicePreset::Default => DEFAULT_RESPONSE_LATENCY_TICKS,
            DevicePreset::Asic => 15,
            DevicePreset::Fpga => 60,
        }
    }

    /// Depth of the request queue.
    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        match self {
            DevicePreset::Default => DEFAULT_MAX_OUTSTANDING,
            DevicePreset::Asic => 48,
            DevicePreset::Fpga => 36,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub range_base: u64,
    pub range_size: u64,
    pub base_latency_ticks: u64,
    pub response_latency_ticks: u64,
    /// Bandwidth of the link. `None` means the size of a request does not
    /// affect its latency.
    pub link_bytes_per_tick: Option<u64>,
    pub max_outstanding: usize,
    pub timeout_ticks: u64,
    pub ordering: OrderingPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            range_base: DEFAULT_RANGE_BASE,
            range_size: DEFAULT_RANGE_SIZE,
            base_latency_ticks: DEFAULT_BASE_LATENCY_TICKS,
            response_latency_ticks: DEFAULT_RESPONSE_LATENCY_TICKS,
            link_bytes_per_tick: None,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            ordering: OrderingPolicy::Relaxed,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn for_device(preset: DevicePreset) -> Self {
        Self {
            response_latency_ticks: preset.response_latency_ticks(),
            max_outstanding: preset.max_outstanding(),
            ..Self::default()
        }
    }

    pub fn address_range(&self) -> Result<AddressRange, ConfigError> {
        AddressRange::new(self.range_base, self.range_size)
    }

    pub fn link_parameters(&self) -> Result<LinkParameters, ConfigError> {
        LinkParameters::new(
            self.base_latency_ticks,
            self.link_bytes_per_tick,
            self.max_outstanding,
        )
    }

    pub fn latency_model(&self) -> Result<LatencyModel, ConfigError> {
        Ok(LatencyModel::new(
            self.link_parameters()?,
            self.response_latency_ticks,
        ))
    }

    /// Check every parameter, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.address_range()?;
        let latency = self.latency_model()?;

        if self.timeout_ticks == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let path = latency.worst_case_path_ticks(MAX_TRANSFER_BYTES);
        if self.timeout_ticks <= path {
            return Err(ConfigError::TimeoutTooShort {
                timeout: self.timeout_ticks,
                path,
            });
        }
        Ok(())
    }
}
