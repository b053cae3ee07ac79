// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulator configuration.
//!
//! A TOML file mirrors [SimConfig]:
//!
//! ```toml
//! [bridge]
//! max_outstanding = 32
//! ordering = "strict"
//!
//! [device]
//! kind = "dram"
//!
//! [device.dram]
//! t_cas = 16
//!
//! [traffic]
//! num_requests = 10000
//! write_percent = 50
//! ```
//!
//! Environment variables use `__` to separate nested keys, for example
//! `CXL_BRIDGE_BRIDGE__TIMEOUT_TICKS=5000`.

use cxl_engine::types::SimError;
use cxl_models::bridge::config::{BridgeConfig, DevicePreset};
use cxl_models::memory::timing::{DramConfig, FixedLatency};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "CXL_BRIDGE_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Fixed,
    Dram,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub fixed: FixedLatency,
    pub dram: DramConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::default(),
            fixed: FixedLatency::new(40),
            dram: DramConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub num_requests: usize,
    pub seed: u64,
    pub access_bytes: usize,
    /// Size of the window within the bridge range that is accessed.
    pub window_bytes: u64,
    pub write_percent: u32,
    /// Ticks between requests. Zero issues them back to back.
    pub issue_interval: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            num_requests: 1000,
            seed: 1,
            access_bytes: 64,
            window_bytes: 1 << 20,
            write_percent: 30,
            issue_interval: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub bridge: BridgeConfig,
    pub device: DeviceConfig,
    pub traffic: TrafficConfig,
}

impl SimConfig {
    /// Defaults with the bridge set up for the `preset` device.
    #[must_use]
    pub fn for_device(preset: DevicePreset) -> Self {
        Self {
            bridge: BridgeConfig::for_device(preset),
            ..Self::default()
        }
    }

    /// Layer the optional TOML file and the environment over `defaults`.
    #[must_use]
    pub fn figment(defaults: &SimConfig, config_file: Option<&str>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(defaults: &SimConfig, config_file: Option<&str>) -> Result<Self, SimError> {
        Self::extract(Self::figment(defaults, config_file))
    }

    pub fn extract(figment: Figment) -> Result<Self, SimError> {
        figment
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use cxl_models::bridge::config::OrderingPolicy;

    use super::*;

    fn from_toml(toml: &str) -> Result<SimConfig, SimError> {
        SimConfig::extract(
            Figment::from(Serialized::defaults(SimConfig::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_survive_an_empty_file() {
        assert_eq!(from_toml("").unwrap(), SimConfig::default());
    }

    #[test]
    fn file_overrides_some_fields() {
        let config = from_toml(
            r#"
            [bridge]
            max_outstanding = 16
            ordering = "strict"
            link_bytes_per_tick = 32

            [device]
            kind = "dram"

            [device.dram]
            t_cas = 20

            [traffic]
            num_requests = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.bridge.max_outstanding, 16);
        assert_eq!(config.bridge.ordering, OrderingPolicy::Strict);
        assert_eq!(config.bridge.link_bytes_per_tick, Some(32));
        assert_eq!(config.bridge.base_latency_ticks, 50);
        assert_eq!(config.device.kind, DeviceKind::Dram);
        assert_eq!(config.device.dram.t_cas, 20);
        assert_eq!(config.device.dram.banks, 8);
        assert_eq!(config.traffic.num_requests, 5);
        assert_eq!(config.traffic.seed, 1);
    }

    #[test]
    fn bad_values_are_reported() {
        let result = from_toml(
            r#"
            [bridge]
            ordering = "sideways"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn presets_change_the_defaults() {
        let config = from_toml("").unwrap();
        let fpga = SimConfig::for_device(DevicePreset::Fpga);
        assert_eq!(fpga.bridge.response_latency_ticks, 60);
        assert_eq!(fpga.bridge.max_outstanding, 36);
        assert_eq!(fpga.device, config.device);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let figment = SimConfig::figment(&SimConfig::default(), Some("no-such-file.toml"));
        assert!(SimConfig::extract(figment).is_err());
    }
}
