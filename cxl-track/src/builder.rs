// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Library functions to build trackers as defined by the user.

use std::fs;
use std::io::{self, BufWriter};
use std::rc::Rc;

use crate::tracker::{DevNullTracker, EntityManager, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// Configuration options for the text tracker.
pub struct TrackerConfig<'a> {
    /// Enable this tracker. A disabled tracker discards all events.
    pub enable: bool,

    /// Set the level at which this tracker should be enabled.
    pub level: log::Level,

    /// A regular expression to match which entities should have this level
    /// applied. All other entities only emit errors.
    pub filter_regex: &'a str,

    /// Write to this file rather than `stdout`.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

fn build_entity_manager(config: &TrackerConfig) -> Result<EntityManager, TrackConfigError> {
    let default_level = if config.filter_regex.is_empty() {
        config.level
    } else {
        log::Level::Error
    };

    let mut entity_manager = EntityManager::new(default_level);
    if !config.filter_regex.is_empty() {
        entity_manager.add_entity_level_filter(config.filter_regex, config.level)?;
    }
    Ok(entity_manager)
}

/// Set up the tracker according to the command-line arguments.
pub fn setup_trackers(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    if !config.enable {
        return Ok(Rc::new(DevNullTracker {}));
    }

    let entity_manager = build_entity_manager(config)?;
    let writer: Writer = match config.file {
        Some(filename) => {
            let file = fs::File::create(filename).map_err(|e| {
                TrackConfigError(format!("Failed to create log file {filename}: {e}"))
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };
    Ok(Rc::new(TextTracker::new(entity_manager, writer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_limits_default_level() {
        let config = TrackerConfig {
            level: log::Level::Debug,
            filter_regex: ".*bridge",
            ..Default::default()
        };
        let manager = build_entity_manager(&config).unwrap();
        manager.add_entity(crate::Id(5), "top::bridge");
        manager.add_entity(crate::Id(6), "top::memory");
        assert!(manager.is_log_enabled_at_level(crate::Id(5), log::Level::Debug));
        assert!(!manager.is_log_enabled_at_level(crate::Id(6), log::Level::Warn));
    }

    #[test]
    fn disabled_tracker_drops_everything() {
        let config = TrackerConfig {
            enable: false,
            ..Default::default()
        };
        let tracker = setup_trackers(&config).unwrap();
        assert!(!tracker.is_entity_enabled(crate::Id(1), log::Level::Error));
    }
}
