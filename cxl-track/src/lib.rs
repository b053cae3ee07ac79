// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This crate provides combined _track_ capabilities for the CXL bridge
//! simulation.
//!
//! _Track_ means the combination of _log_ and _trace_ where:
//!
//!   - _log_ are text-based human-readable messages emitted at various levels
//!     of verbosity (from `Trace` through to `Error`).
//!   - _trace_ provides a standard set of modelling events that can be emitted.
//!     For example, object creation/destruction or objects entering/exiting
//!     simulation [`Entities`](crate::entity::Entity).
//!
//! Every event is emitted by an [`Entity`](crate::entity::Entity) and is only
//! passed to the [`Tracker`] if that entity is enabled at the level of the
//! event.

// Enable warnings for missing documentation
#![warn(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

pub use log;

pub mod builder;
pub mod entity;
pub mod id;
pub mod test_helpers;

/// Include the trackers.
pub mod tracker;

pub use id::{Id, Unique};
pub use tracker::{Track, Tracker};

/// A type alias for objects that receive _log_ / _trace_ events.
pub type Writer = Box<dyn std::io::Write>;
type SharedWriter = Rc<RefCell<Writer>>;

/// Id value which indicates where there is no valid id
pub const NO_ID: Id = Id(0);

/// The root id from which all other ids are derived
pub const ROOT: Id = Id(1);

/// Track an object entering an entity.
#[macro_export]
macro_rules! enter {
    ($entity:expr ; $enter_id:expr) => {
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.enter($entity.id, $enter_id);
        }
    };
}

/// Track an object leaving an entity.
#[macro_export]
macro_rules! exit {
    ($entity:expr ; $exit_id:expr) => {
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.exit($entity.id, $exit_id);
        }
    };
}

/// Create a unique id for tracking.
///
/// The user must specify an entity with a [`Tracker`] to create the id.
///
/// **Note:** this macro should be used when the object being assigned the
///           [`Id`] will have its creation tracked with [`create`].
#[macro_export]
macro_rules! create_id {
    ($entity:expr) => {{ $entity.tracker.unique_id() }};
}

/// Add an entity creation event
#[macro_export]
macro_rules! create {
    ($entity:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            let parent_id = match &$entity.parent {
                Some(parent) => parent.id,
                None => $crate::NO_ID,
            };
            $entity
                .tracker
                .create(parent_id, $entity.id, 0, 0, $entity.full_name().as_str());
        }
    }};
    ($entity:expr ; $created:expr, $num_bytes:expr, $req_type:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.create(
                $entity.id,
                $crate::Unique::id(&$created),
                $num_bytes,
                $req_type,
                format!("{}", $created).as_str(),
            );
        }
    }};
}

/// Add an entity destroy event
#[macro_export]
macro_rules! destroy {
    ($entity:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            match &$entity.parent {
                Some(parent) => $entity.tracker.destroy(parent.id, $entity.id),
                None => $entity.tracker.destroy($crate::NO_ID, $entity.id),
            };
        }
    }};
    ($entity:expr ; $destroyed:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.destroy($entity.id, $destroyed);
        }
    }};
}

/// Connect two entities
#[macro_export]
macro_rules! connect {
    ($from_entity:expr ; $to_entity:expr) => {{
        if $from_entity
            .tracker
            .is_entity_enabled($from_entity.id, $crate::log::Level::Trace)
        {
            $from_entity
                .tracker
                .connect($from_entity.id, $to_entity.id);
        }
    }};
}

/// Record a value change for an entity.
#[macro_export]
macro_rules! value {
    ($entity:expr ; $value:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.value($entity.id, $value as f64);
        }
    }};
}

/// Update the current time.
#[macro_export]
macro_rules! set_time {
    ($entity:expr ; $time_ns:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, $crate::log::Level::Trace)
        {
            $entity.tracker.time($entity.id, $time_ns);
        }
    }};
}

/// Base macro for log messages of all level.
///
/// The message is only formatted if the entity is enabled at the given level.
#[macro_export]
macro_rules! log_base {
    ($entity:expr ; $lvl:expr, $($arg:tt)+) => (
        if $entity.tracker.is_entity_enabled($entity.id, $lvl) {
            $entity.tracker.log($entity.id, $lvl, format_args!($($arg)+));
        }
    );
}

/// Log a message at level `log::Level::Trace`
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Trace, $($arg)+);
    );
}

/// Log a message at level `log::Level::Debug`
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Debug, $($arg)+);
    );
}

/// Log a message at level `log::Level::Info`
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Info, $($arg)+);
    );
}

/// Log a message at level `log::Level::Warn`
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Warn, $($arg)+);
    );
}

/// Log a message at level `log::Level::Error`
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; $crate::log::Level::Error, $($arg)+);
    );
}
